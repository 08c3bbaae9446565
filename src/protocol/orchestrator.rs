//! Payloads sent by the orchestrator (NFVO → VNFM).
//!
//! Field names follow the orchestrator's JSON. Shapes that serve several
//! actions keep the action in a field skipped by serde; the codec fills it
//! from the envelope.
//!
//! | Shape | Actions |
//! |-------|---------|
//! | [`OrInstantiate`] | `INSTANTIATE` |
//! | [`OrGrant`] | `GRANT_OPERATION` |
//! | [`OrError`] | `ERROR` |
//! | [`OrHeal`] | `HEAL` |
//! | [`OrScaling`] | `SCALE_OUT`, `SCALE_IN` |
//! | [`OrStartStop`] | `START`, `STOP` |
//! | [`OrUpdate`] | `UPDATE` |
//! | [`OrGeneric`] | everything else the orchestrator sends |

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::catalogue::{
    Key, Script, VimInstance, VirtualLinkRecord, VirtualNetworkFunctionDescriptor,
    VirtualNetworkFunctionRecord, VnfComponent, VnfDeploymentFlavour, VnfPackage, VnfcInstance,
    VnfrDependency,
};

use super::Action;

// ============================================================================
// OrInstantiate
// ============================================================================

/// Instantiate request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrInstantiate {
    /// Descriptor to instantiate.
    #[serde(default)]
    pub vnfd: VirtualNetworkFunctionDescriptor,

    /// Deployment flavour.
    #[serde(rename = "vnfdf", default, skip_serializing_if = "Option::is_none")]
    pub flavour: Option<VnfDeploymentFlavour>,

    /// Requested instance name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vnf_instance_name: Option<String>,

    /// Virtual link records.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vlrs: Vec<VirtualLinkRecord>,

    /// Extension values (`nsr-id`, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extension: BTreeMap<String, String>,

    /// Candidate VIM instances per deployment unit.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vim_instances: BTreeMap<String, Vec<VimInstance>>,

    /// Package carrying the lifecycle scripts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vnf_package: Option<VnfPackage>,

    /// Key pairs to inject.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<Key>,
}

impl OrInstantiate {
    /// Returns the chosen flavour key, if any.
    #[inline]
    #[must_use]
    pub fn flavour_key(&self) -> Option<&str> {
        self.flavour.as_ref().and_then(|f| f.flavour_key.as_deref())
    }
}

// ============================================================================
// OrGrant
// ============================================================================

/// Grant reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrGrant {
    /// Whether the operation was approved.
    #[serde(default)]
    pub grant_allowed: bool,

    /// VIM instance chosen for each deployment unit.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vdu_vim: BTreeMap<String, VimInstance>,

    /// Record as seen by the orchestrator.
    #[serde(rename = "virtualNetworkFunctionRecord", default)]
    pub vnfr: VirtualNetworkFunctionRecord,
}

// ============================================================================
// OrError
// ============================================================================

/// Error notification from the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrError {
    /// Record the error refers to.
    #[serde(default)]
    pub vnfr: VirtualNetworkFunctionRecord,

    /// Owning network service record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nsr_id: Option<String>,
}

// ============================================================================
// OrHeal
// ============================================================================

/// Heal request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrHeal {
    /// Record to heal.
    #[serde(rename = "virtualNetworkFunctionRecord", default)]
    pub vnfr: VirtualNetworkFunctionRecord,

    /// Failed instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vnfc_instance: Option<VnfcInstance>,

    /// Reason reported by monitoring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

// ============================================================================
// OrScaling
// ============================================================================

/// Scale-out or scale-in request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrScaling {
    /// `SCALE_OUT` or `SCALE_IN`.
    #[serde(skip)]
    pub action: Action,

    /// Component to add (scale-out).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<VnfComponent>,

    /// Instance to remove (scale-in).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vnfc_instance: Option<VnfcInstance>,

    /// VIM hosting the new instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vim_instance: Option<VimInstance>,

    /// Package carrying the lifecycle scripts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vnf_package: Option<VnfPackage>,

    /// Record to scale.
    #[serde(rename = "virtualNetworkFunctionRecord", default)]
    pub vnfr: VirtualNetworkFunctionRecord,

    /// Instance mode (`ACTIVE` or `STANDBY`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    /// Extension values.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extension: BTreeMap<String, String>,
}

// ============================================================================
// OrStartStop
// ============================================================================

/// Start or stop request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrStartStop {
    /// `START` or `STOP`.
    #[serde(skip)]
    pub action: Action,

    /// Record to start or stop.
    #[serde(rename = "virtualNetworkFunctionRecord", default)]
    pub vnfr: VirtualNetworkFunctionRecord,

    /// Single instance to act on; the whole record when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vnfc_instance: Option<VnfcInstance>,

    /// Dependency parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vnfr_dependency: Option<VnfrDependency>,
}

// ============================================================================
// OrUpdate
// ============================================================================

/// Software update request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrUpdate {
    /// Record to update.
    #[serde(default)]
    pub vnfr: VirtualNetworkFunctionRecord,

    /// Update script.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<Script>,
}

// ============================================================================
// OrGeneric
// ============================================================================

/// Record plus optional dependency; used by most orchestrator actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrGeneric {
    /// Action the message carries.
    #[serde(skip)]
    pub action: Action,

    /// Record the action applies to.
    #[serde(default)]
    pub vnfr: VirtualNetworkFunctionRecord,

    /// Dependency parameters.
    #[serde(rename = "vnfrd", default, skip_serializing_if = "Option::is_none")]
    pub dependency: Option<VnfrDependency>,
}
