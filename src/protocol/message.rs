//! Message envelope and the `(sender, action)` shape tables.
//!
//! A [`Message`] is a sender plus a [`Payload`]; the action is always derived
//! from the payload. [`Shape::select`] is the single source of truth for
//! which payload shape an action has for a given sender, and both the codec
//! and [`Message::new`] consult it, so a message that exists always agrees
//! with its tables.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

use crate::catalogue::{Key, VimInstance, VirtualNetworkFunctionRecord, VnfcInstance};
use crate::error::{Error, Result};

use super::manager::{
    ExceptionDetail, VnfmAllocateResources, VnfmError, VnfmGeneric, VnfmGrant, VnfmHeal,
    VnfmInstantiate, VnfmScaled, VnfmScaling, VnfmStartStop,
};
use super::orchestrator::{
    OrError, OrGeneric, OrGrant, OrHeal, OrInstantiate, OrScaling, OrStartStop, OrUpdate,
};
use super::{Action, SenderType};

// ============================================================================
// Unrecognized
// ============================================================================

/// Catch-all payload for `(sender, action)` pairs without a dedicated shape.
///
/// Keeps every top-level field except `action`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Unrecognized {
    /// Action as received.
    pub action: Action,
    /// Remaining top-level fields.
    pub fields: Map<String, Value>,
}

// ============================================================================
// Shape
// ============================================================================

/// Discriminator of the payload shapes, without data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// [`OrInstantiate`].
    OrInstantiate,
    /// [`OrGrant`].
    OrGrant,
    /// [`OrError`].
    OrError,
    /// [`OrHeal`].
    OrHeal,
    /// [`OrScaling`].
    OrScaling,
    /// [`OrStartStop`].
    OrStartStop,
    /// [`OrUpdate`].
    OrUpdate,
    /// [`OrGeneric`].
    OrGeneric,
    /// [`VnfmInstantiate`].
    VnfmInstantiate,
    /// [`VnfmGrant`].
    VnfmGrant,
    /// [`VnfmAllocateResources`].
    VnfmAllocateResources,
    /// [`VnfmError`].
    VnfmError,
    /// [`VnfmHeal`].
    VnfmHeal,
    /// [`VnfmScaled`].
    VnfmScaled,
    /// [`VnfmScaling`].
    VnfmScaling,
    /// [`VnfmStartStop`].
    VnfmStartStop,
    /// [`VnfmGeneric`].
    VnfmGeneric,
    /// [`Unrecognized`].
    Unrecognized,
}

impl Shape {
    /// Selects the payload shape for an action sent by `sender`.
    ///
    /// Combinations without a dedicated shape select [`Shape::Unrecognized`].
    #[must_use]
    pub fn select(sender: SenderType, action: &Action) -> Self {
        match sender {
            SenderType::Nfvo => match action {
                Action::Instantiate => Self::OrInstantiate,
                Action::GrantOperation => Self::OrGrant,
                Action::Error => Self::OrError,
                Action::Heal => Self::OrHeal,
                Action::ScaleOut | Action::ScaleIn => Self::OrScaling,
                Action::Start | Action::Stop => Self::OrStartStop,
                Action::Update => Self::OrUpdate,
                Action::Modify
                | Action::ReleaseResources
                | Action::Configure
                | Action::Resume
                | Action::Scaling
                | Action::Scaled
                | Action::AllocateResources
                | Action::InstantiateFinish
                | Action::ReleaseResourcesFinish => Self::OrGeneric,
                Action::NoActionSpecified | Action::Other(_) => Self::Unrecognized,
            },
            SenderType::Vnfm => match action {
                Action::Instantiate => Self::VnfmInstantiate,
                Action::GrantOperation => Self::VnfmGrant,
                Action::AllocateResources => Self::VnfmAllocateResources,
                Action::Error => Self::VnfmError,
                Action::Heal => Self::VnfmHeal,
                Action::Scaled => Self::VnfmScaled,
                Action::Scaling => Self::VnfmScaling,
                Action::Start | Action::Stop => Self::VnfmStartStop,
                Action::Modify
                | Action::ReleaseResources
                | Action::Configure
                | Action::Resume
                | Action::Update => Self::VnfmGeneric,
                Action::ScaleIn
                | Action::ScaleOut
                | Action::InstantiateFinish
                | Action::ReleaseResourcesFinish
                | Action::NoActionSpecified
                | Action::Other(_) => Self::Unrecognized,
            },
        }
    }

    /// Returns the shape name, used in errors and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::OrInstantiate => "OrInstantiate",
            Self::OrGrant => "OrGrant",
            Self::OrError => "OrError",
            Self::OrHeal => "OrHeal",
            Self::OrScaling => "OrScaling",
            Self::OrStartStop => "OrStartStop",
            Self::OrUpdate => "OrUpdate",
            Self::OrGeneric => "OrGeneric",
            Self::VnfmInstantiate => "VnfmInstantiate",
            Self::VnfmGrant => "VnfmGrant",
            Self::VnfmAllocateResources => "VnfmAllocateResources",
            Self::VnfmError => "VnfmError",
            Self::VnfmHeal => "VnfmHeal",
            Self::VnfmScaled => "VnfmScaled",
            Self::VnfmScaling => "VnfmScaling",
            Self::VnfmStartStop => "VnfmStartStop",
            Self::VnfmGeneric => "VnfmGeneric",
            Self::Unrecognized => "Unrecognized",
        }
    }

    /// Returns the side that sends this shape, `None` for the catch-all.
    #[must_use]
    pub const fn sender(self) -> Option<SenderType> {
        match self {
            Self::OrInstantiate
            | Self::OrGrant
            | Self::OrError
            | Self::OrHeal
            | Self::OrScaling
            | Self::OrStartStop
            | Self::OrUpdate
            | Self::OrGeneric => Some(SenderType::Nfvo),
            Self::Unrecognized => None,
            _ => Some(SenderType::Vnfm),
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Payload
// ============================================================================

/// Typed message body, one variant per shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Instantiate request.
    OrInstantiate(OrInstantiate),
    /// Grant reply.
    OrGrant(OrGrant),
    /// Orchestrator error.
    OrError(OrError),
    /// Heal request.
    OrHeal(OrHeal),
    /// Scale-out / scale-in request.
    OrScaling(OrScaling),
    /// Start / stop request.
    OrStartStop(OrStartStop),
    /// Update request.
    OrUpdate(OrUpdate),
    /// Record-only orchestrator message.
    OrGeneric(OrGeneric),
    /// Instantiate reply.
    VnfmInstantiate(VnfmInstantiate),
    /// Grant request.
    VnfmGrant(VnfmGrant),
    /// Allocation request.
    VnfmAllocateResources(VnfmAllocateResources),
    /// Failure report.
    VnfmError(VnfmError),
    /// Heal reply.
    VnfmHeal(VnfmHeal),
    /// Scale-out completed.
    VnfmScaled(VnfmScaled),
    /// Scaling request.
    VnfmScaling(VnfmScaling),
    /// Start / stop reply.
    VnfmStartStop(VnfmStartStop),
    /// Record-only manager reply.
    VnfmGeneric(VnfmGeneric),
    /// Catch-all.
    Unrecognized(Unrecognized),
}

impl Payload {
    /// Returns the action this payload carries.
    #[must_use]
    pub fn action(&self) -> Action {
        match self {
            Self::OrInstantiate(_) | Self::VnfmInstantiate(_) => Action::Instantiate,
            Self::OrGrant(_) | Self::VnfmGrant(_) => Action::GrantOperation,
            Self::OrError(_) | Self::VnfmError(_) => Action::Error,
            Self::OrHeal(_) | Self::VnfmHeal(_) => Action::Heal,
            Self::OrUpdate(_) => Action::Update,
            Self::VnfmAllocateResources(_) => Action::AllocateResources,
            Self::VnfmScaled(_) => Action::Scaled,
            Self::VnfmScaling(_) => Action::Scaling,
            Self::OrScaling(body) => body.action.clone(),
            Self::OrStartStop(body) => body.action.clone(),
            Self::OrGeneric(body) => body.action.clone(),
            Self::VnfmStartStop(body) => body.action.clone(),
            Self::VnfmGeneric(body) => body.action.clone(),
            Self::Unrecognized(body) => body.action.clone(),
        }
    }

    /// Returns the shape discriminator.
    #[must_use]
    pub fn shape(&self) -> Shape {
        match self {
            Self::OrInstantiate(_) => Shape::OrInstantiate,
            Self::OrGrant(_) => Shape::OrGrant,
            Self::OrError(_) => Shape::OrError,
            Self::OrHeal(_) => Shape::OrHeal,
            Self::OrScaling(_) => Shape::OrScaling,
            Self::OrStartStop(_) => Shape::OrStartStop,
            Self::OrUpdate(_) => Shape::OrUpdate,
            Self::OrGeneric(_) => Shape::OrGeneric,
            Self::VnfmInstantiate(_) => Shape::VnfmInstantiate,
            Self::VnfmGrant(_) => Shape::VnfmGrant,
            Self::VnfmAllocateResources(_) => Shape::VnfmAllocateResources,
            Self::VnfmError(_) => Shape::VnfmError,
            Self::VnfmHeal(_) => Shape::VnfmHeal,
            Self::VnfmScaled(_) => Shape::VnfmScaled,
            Self::VnfmScaling(_) => Shape::VnfmScaling,
            Self::VnfmStartStop(_) => Shape::VnfmStartStop,
            Self::VnfmGeneric(_) => Shape::VnfmGeneric,
            Self::Unrecognized(_) => Shape::Unrecognized,
        }
    }
}

// ============================================================================
// Message
// ============================================================================

/// A protocol message: who sent it and what it carries.
///
/// Messages are immutable once built. Use [`Message::new`] for arbitrary
/// payloads or one of the typed constructors for manager messages.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Producing side.
    sender: SenderType,
    /// Typed body.
    payload: Payload,
}

impl Message {
    /// Creates a message, checking the payload against the shape tables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the payload shape is not the one
    /// selected for `(sender, payload.action())`.
    pub fn new(sender: SenderType, payload: Payload) -> Result<Self> {
        let action = payload.action();
        let expected = Shape::select(sender, &action);
        let actual = payload.shape();

        if expected != actual {
            return Err(Error::protocol(format!(
                "{sender} {action} must carry {expected}, got {actual}"
            )));
        }

        Ok(Self { sender, payload })
    }

    /// Builds a message that is known to satisfy the tables.
    pub(crate) fn trusted(sender: SenderType, payload: Payload) -> Self {
        debug_assert_eq!(
            Shape::select(sender, &payload.action()),
            payload.shape(),
            "inconsistent shape table"
        );
        Self { sender, payload }
    }

    /// Returns the sending side.
    #[inline]
    #[must_use]
    pub fn sender(&self) -> SenderType {
        self.sender
    }

    /// Returns the action, derived from the payload.
    #[inline]
    #[must_use]
    pub fn action(&self) -> Action {
        self.payload.action()
    }

    /// Returns the payload.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Consumes the message, returning its payload.
    #[inline]
    #[must_use]
    pub fn into_payload(self) -> Payload {
        self.payload
    }
}

// ============================================================================
// Manager Message Constructors
// ============================================================================

impl Message {
    /// `GRANT_OPERATION` request.
    #[must_use]
    pub fn grant_request(vnfr: VirtualNetworkFunctionRecord) -> Self {
        Self::trusted(SenderType::Vnfm, Payload::VnfmGrant(VnfmGrant { vnfr }))
    }

    /// `ALLOCATE_RESOURCES` request.
    #[must_use]
    pub fn allocate_resources(
        vnfr: VirtualNetworkFunctionRecord,
        vim_instances: BTreeMap<String, VimInstance>,
        userdata: String,
        key_pairs: Vec<Key>,
    ) -> Self {
        Self::trusted(
            SenderType::Vnfm,
            Payload::VnfmAllocateResources(VnfmAllocateResources {
                vnfr,
                vim_instances,
                userdata,
                key_pairs,
            }),
        )
    }

    /// `INSTANTIATE` reply.
    #[must_use]
    pub fn instantiated(vnfr: VirtualNetworkFunctionRecord) -> Self {
        Self::trusted(
            SenderType::Vnfm,
            Payload::VnfmInstantiate(VnfmInstantiate { vnfr }),
        )
    }

    /// `ERROR` report.
    #[must_use]
    pub fn error_report(
        vnfr: VirtualNetworkFunctionRecord,
        nsr_id: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::trusted(
            SenderType::Vnfm,
            Payload::VnfmError(VnfmError {
                vnfr,
                nsr_id: nsr_id.into(),
                exception: ExceptionDetail::new(detail),
            }),
        )
    }

    /// `HEAL` reply.
    #[must_use]
    pub fn healed(
        vnfr: VirtualNetworkFunctionRecord,
        vnfc_instance: Option<VnfcInstance>,
        cause: Option<String>,
    ) -> Self {
        Self::trusted(
            SenderType::Vnfm,
            Payload::VnfmHeal(VnfmHeal {
                vnfr,
                vnfc_instance,
                cause,
            }),
        )
    }

    /// `SCALED` reply.
    #[must_use]
    pub fn scaled(vnfr: VirtualNetworkFunctionRecord, vnfc_instance: Option<VnfcInstance>) -> Self {
        Self::trusted(
            SenderType::Vnfm,
            Payload::VnfmScaled(VnfmScaled {
                vnfr,
                vnfc_instance,
            }),
        )
    }

    /// `SCALING` request.
    #[must_use]
    pub fn scaling_request(vnfr: VirtualNetworkFunctionRecord, user_data: String) -> Self {
        Self::trusted(
            SenderType::Vnfm,
            Payload::VnfmScaling(VnfmScaling { vnfr, user_data }),
        )
    }

    /// `START` / `STOP` reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if `action` is neither `START` nor `STOP`.
    pub fn start_stop_reply(
        action: Action,
        vnfr: VirtualNetworkFunctionRecord,
        vnfc_instance: Option<VnfcInstance>,
    ) -> Result<Self> {
        Self::new(
            SenderType::Vnfm,
            Payload::VnfmStartStop(VnfmStartStop {
                action,
                vnfr,
                vnfc_instance,
            }),
        )
    }

    /// Record-only reply for `MODIFY`, `RELEASE_RESOURCES`, `CONFIGURE`,
    /// `RESUME` and `UPDATE`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for any other action.
    pub fn generic_reply(action: Action, vnfr: VirtualNetworkFunctionRecord) -> Result<Self> {
        Self::new(
            SenderType::Vnfm,
            Payload::VnfmGeneric(VnfmGeneric { action, vnfr }),
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_sender_matches_table() {
        let actions = [
            Action::GrantOperation,
            Action::AllocateResources,
            Action::ScaleIn,
            Action::ScaleOut,
            Action::Scaling,
            Action::Error,
            Action::ReleaseResources,
            Action::Instantiate,
            Action::Modify,
            Action::Heal,
            Action::Update,
            Action::Scaled,
            Action::ReleaseResourcesFinish,
            Action::InstantiateFinish,
            Action::Configure,
            Action::Start,
            Action::Stop,
            Action::Resume,
            Action::NoActionSpecified,
        ];

        for sender in [SenderType::Nfvo, SenderType::Vnfm] {
            for action in &actions {
                let shape = Shape::select(sender, action);
                if let Some(owner) = shape.sender() {
                    assert_eq!(owner, sender, "{sender} {action} selected {shape}");
                }
            }
        }
    }

    #[test]
    fn test_new_rejects_mismatched_payload() {
        let payload = Payload::OrGeneric(OrGeneric {
            action: Action::Instantiate,
            ..OrGeneric::default()
        });
        let result = Message::new(SenderType::Nfvo, payload);
        assert!(matches!(result, Err(Error::Protocol { .. })));
    }

    #[test]
    fn test_new_rejects_wrong_sender() {
        let payload = Payload::VnfmGrant(VnfmGrant::default());
        assert!(Message::new(SenderType::Nfvo, payload).is_err());
    }

    #[test]
    fn test_generic_reply_validates_action() {
        assert!(Message::generic_reply(Action::Configure, Default::default()).is_ok());
        assert!(Message::generic_reply(Action::Instantiate, Default::default()).is_err());
    }

    #[test]
    fn test_start_stop_reply_validates_action() {
        assert!(Message::start_stop_reply(Action::Stop, Default::default(), None).is_ok());
        assert!(Message::start_stop_reply(Action::Heal, Default::default(), None).is_err());
    }

    #[test]
    fn test_typed_constructors_are_vnfm() {
        let message = Message::grant_request(VirtualNetworkFunctionRecord::default());
        assert_eq!(message.sender(), SenderType::Vnfm);
        assert_eq!(message.action(), Action::GrantOperation);

        let message = Message::error_report(VirtualNetworkFunctionRecord::default(), "nsr", "boom");
        assert_eq!(message.action(), Action::Error);
        match message.payload() {
            Payload::VnfmError(body) => {
                assert_eq!(body.nsr_id, "nsr");
                assert_eq!(body.exception.detail_message, "boom");
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_unrecognized_accepts_any_sender() {
        let payload = Payload::Unrecognized(Unrecognized {
            action: Action::Other("MIGRATE".into()),
            fields: Map::new(),
        });
        assert!(Message::new(SenderType::Vnfm, payload.clone()).is_ok());
        assert!(Message::new(SenderType::Nfvo, payload).is_ok());
    }
}
