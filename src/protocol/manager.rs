//! Payloads sent by the manager (VNFM → NFVO).
//!
//! | Shape | Actions |
//! |-------|---------|
//! | [`VnfmInstantiate`] | `INSTANTIATE` |
//! | [`VnfmGrant`] | `GRANT_OPERATION` |
//! | [`VnfmAllocateResources`] | `ALLOCATE_RESOURCES` |
//! | [`VnfmError`] | `ERROR` |
//! | [`VnfmHeal`] | `HEAL` |
//! | [`VnfmScaled`] | `SCALED` |
//! | [`VnfmScaling`] | `SCALING` |
//! | [`VnfmStartStop`] | `START`, `STOP` |
//! | [`VnfmGeneric`] | `MODIFY`, `RELEASE_RESOURCES`, `CONFIGURE`, `RESUME`, `UPDATE` |

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::catalogue::{Key, VimInstance, VirtualNetworkFunctionRecord, VnfcInstance};

use super::Action;

// ============================================================================
// ExceptionDetail
// ============================================================================

/// Error body understood by the orchestrator.
///
/// A plain message is enough to represent any remote exception type.
///
/// ```json
/// { "detailMessage": "grant refused" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetail {
    /// Human readable error message.
    #[serde(default)]
    pub detail_message: String,
}

impl ExceptionDetail {
    /// Creates a detail from any displayable error.
    #[inline]
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            detail_message: message.into(),
        }
    }
}

// ============================================================================
// VnfmInstantiate
// ============================================================================

/// Instantiate reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VnfmInstantiate {
    /// Instantiated record.
    #[serde(default)]
    pub vnfr: VirtualNetworkFunctionRecord,
}

// ============================================================================
// VnfmGrant
// ============================================================================

/// Grant request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VnfmGrant {
    /// Record the grant is requested for.
    #[serde(rename = "virtualNetworkFunctionRecord", default)]
    pub vnfr: VirtualNetworkFunctionRecord,
}

// ============================================================================
// VnfmAllocateResources
// ============================================================================

/// Resource allocation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VnfmAllocateResources {
    /// Record to allocate resources for.
    #[serde(default)]
    pub vnfr: VirtualNetworkFunctionRecord,

    /// VIM instance per deployment unit, as granted.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vim_instances: BTreeMap<String, VimInstance>,

    /// Cloud-init user data.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub userdata: String,

    /// Key pairs to inject.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_pairs: Vec<Key>,
}

// ============================================================================
// VnfmError
// ============================================================================

/// Failure report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VnfmError {
    /// Record known at the failure point.
    #[serde(default)]
    pub vnfr: VirtualNetworkFunctionRecord,

    /// Owning network service record.
    #[serde(default)]
    pub nsr_id: String,

    /// Error detail.
    #[serde(default)]
    pub exception: ExceptionDetail,
}

// ============================================================================
// VnfmHeal
// ============================================================================

/// Heal reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VnfmHeal {
    /// Healed record.
    #[serde(rename = "virtualNetworkFunctionRecord", default)]
    pub vnfr: VirtualNetworkFunctionRecord,

    /// Healed instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vnfc_instance: Option<VnfcInstance>,

    /// Cause echoed from the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

// ============================================================================
// VnfmScaled
// ============================================================================

/// Scale-out completed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VnfmScaled {
    /// Scaled record.
    #[serde(default)]
    pub vnfr: VirtualNetworkFunctionRecord,

    /// Instance created by the scale-out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vnfc_instance: Option<VnfcInstance>,
}

// ============================================================================
// VnfmScaling
// ============================================================================

/// Scaling request asking the orchestrator to create the new instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VnfmScaling {
    /// Record to scale.
    #[serde(default)]
    pub vnfr: VirtualNetworkFunctionRecord,

    /// Cloud-init user data for the new instance.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_data: String,
}

// ============================================================================
// VnfmStartStop
// ============================================================================

/// Start or stop reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VnfmStartStop {
    /// `START` or `STOP`.
    #[serde(skip)]
    pub action: Action,

    /// Resulting record.
    #[serde(rename = "virtualNetworkFunctionRecord", default)]
    pub vnfr: VirtualNetworkFunctionRecord,

    /// Instance acted on, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vnfc_instance: Option<VnfcInstance>,
}

// ============================================================================
// VnfmGeneric
// ============================================================================

/// Record-only reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VnfmGeneric {
    /// Action the reply answers.
    #[serde(skip)]
    pub action: Action,

    /// Resulting record.
    #[serde(default)]
    pub vnfr: VirtualNetworkFunctionRecord,
}
