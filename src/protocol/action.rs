//! Protocol actions and sender roles.
//!
//! Every envelope carries an `action` string. The set of actions is closed;
//! strings outside it are kept as [`Action::Other`] when decoding so that
//! newer orchestrators do not break older managers, but they are never
//! written back to the wire.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ============================================================================
// Constants
// ============================================================================

/// Wire value of the "no action" sentinel.
pub const NO_ACTION_SPECIFIED: &str = "NO_ACTION_SPECIFIED";

// ============================================================================
// Action
// ============================================================================

/// Lifecycle action carried by a protocol message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Action {
    /// Ask the orchestrator to approve a lifecycle operation.
    GrantOperation,
    /// Ask the orchestrator to allocate VIM resources.
    AllocateResources,
    /// Remove a component instance.
    ScaleIn,
    /// Add a component instance.
    ScaleOut,
    /// Scaling round trip initiated by the manager.
    Scaling,
    /// Failure report.
    Error,
    /// Release all resources of a VNF.
    ReleaseResources,
    /// Instantiate a VNF.
    Instantiate,
    /// Apply dependency parameters.
    Modify,
    /// Repair a component instance.
    Heal,
    /// Update software through a script.
    Update,
    /// Scale-out completed.
    Scaled,
    /// Orchestrator finished releasing resources.
    ReleaseResourcesFinish,
    /// Orchestrator finished instantiation.
    InstantiateFinish,
    /// Configure a VNF.
    Configure,
    /// Start a VNF or component instance.
    Start,
    /// Stop a VNF or component instance.
    Stop,
    /// Resume a failed operation.
    Resume,
    /// Sentinel for "no action".
    #[default]
    NoActionSpecified,
    /// An action string this runtime does not know.
    Other(String),
}

impl Action {
    /// Parses a wire string, keeping unknown values as [`Action::Other`].
    #[must_use]
    pub fn from_wire(value: &str) -> Self {
        match value {
            "GRANT_OPERATION" => Self::GrantOperation,
            "ALLOCATE_RESOURCES" => Self::AllocateResources,
            "SCALE_IN" => Self::ScaleIn,
            "SCALE_OUT" => Self::ScaleOut,
            "SCALING" => Self::Scaling,
            "ERROR" => Self::Error,
            "RELEASE_RESOURCES" => Self::ReleaseResources,
            "INSTANTIATE" => Self::Instantiate,
            "MODIFY" => Self::Modify,
            "HEAL" => Self::Heal,
            "UPDATE" => Self::Update,
            "SCALED" => Self::Scaled,
            "RELEASE_RESOURCES_FINISH" => Self::ReleaseResourcesFinish,
            "INSTANTIATE_FINISH" => Self::InstantiateFinish,
            "CONFIGURE" => Self::Configure,
            "START" => Self::Start,
            "STOP" => Self::Stop,
            "RESUME" => Self::Resume,
            NO_ACTION_SPECIFIED => Self::NoActionSpecified,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the string written to the wire.
    ///
    /// Unknown actions are sanitized to [`NO_ACTION_SPECIFIED`].
    #[must_use]
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::GrantOperation => "GRANT_OPERATION",
            Self::AllocateResources => "ALLOCATE_RESOURCES",
            Self::ScaleIn => "SCALE_IN",
            Self::ScaleOut => "SCALE_OUT",
            Self::Scaling => "SCALING",
            Self::Error => "ERROR",
            Self::ReleaseResources => "RELEASE_RESOURCES",
            Self::Instantiate => "INSTANTIATE",
            Self::Modify => "MODIFY",
            Self::Heal => "HEAL",
            Self::Update => "UPDATE",
            Self::Scaled => "SCALED",
            Self::ReleaseResourcesFinish => "RELEASE_RESOURCES_FINISH",
            Self::InstantiateFinish => "INSTANTIATE_FINISH",
            Self::Configure => "CONFIGURE",
            Self::Start => "START",
            Self::Stop => "STOP",
            Self::Resume => "RESUME",
            Self::NoActionSpecified | Self::Other(_) => NO_ACTION_SPECIFIED,
        }
    }

    /// Returns `true` if this action is part of the closed set.
    #[inline]
    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(raw) => f.write_str(raw),
            known => f.write_str(known.as_wire()),
        }
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_wire())
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&raw))
    }
}

// ============================================================================
// SenderType
// ============================================================================

/// Side of the protocol that produced a message.
///
/// The sender selects the decoding table: the same action maps to different
/// payload shapes depending on who sent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SenderType {
    /// The VNF manager (this runtime).
    Vnfm,
    /// The orchestrator.
    Nfvo,
}

impl fmt::Display for SenderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vnfm => f.write_str("VNFM"),
            Self::Nfvo => f.write_str("NFVO"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_actions_round_trip() {
        for action in [
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
        ] {
            assert_eq!(Action::from_wire(action.as_wire()), action);
        }
    }

    #[test]
    fn test_unknown_action_kept_but_sanitized() {
        let action = Action::from_wire("MIGRATE");
        assert_eq!(action, Action::Other("MIGRATE".into()));
        assert!(!action.is_known());
        assert_eq!(action.as_wire(), NO_ACTION_SPECIFIED);
        assert_eq!(action.to_string(), "MIGRATE");
    }

    #[test]
    fn test_action_serde() {
        let json = serde_json::to_string(&Action::ScaleOut).expect("serialize");
        assert_eq!(json, "\"SCALE_OUT\"");

        let action: Action = serde_json::from_str("\"HEAL\"").expect("deserialize");
        assert_eq!(action, Action::Heal);

        let other = serde_json::to_string(&Action::Other("X".into())).expect("serialize");
        assert_eq!(other, "\"NO_ACTION_SPECIFIED\"");
    }

    #[test]
    fn test_sender_display() {
        assert_eq!(SenderType::Vnfm.to_string(), "VNFM");
        assert_eq!(SenderType::Nfvo.to_string(), "NFVO");
    }
}
