//! VIM-side types: VIM instances, key pairs and the resources a driver manages.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// VimInstance
// ============================================================================

/// A Virtualized Infrastructure Manager the orchestrator knows about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VimInstance {
    /// VIM ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// VIM name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// VIM type (for example `openstack`).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub vim_type: Option<String>,

    /// Authentication endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,

    /// Tenant or project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,

    /// Remaining fields (credentials, networks, images, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Key
// ============================================================================

/// An SSH key pair registered with the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Key {
    /// Key ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Key name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Public key material.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,

    /// Key fingerprint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,

    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Driver Resources
// ============================================================================

/// A virtual machine on a VIM.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    /// Orchestrator-side ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Server name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// VIM-side ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_id: Option<String>,

    /// Server status as reported by the VIM.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A bootable image on a VIM.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NfvImage {
    /// Orchestrator-side ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Image name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// VIM-side ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_id: Option<String>,

    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A compute flavour on a VIM.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentFlavour {
    /// Orchestrator-side ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Flavour key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavour_key: Option<String>,

    /// VIM-side ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_id: Option<String>,

    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A network on a VIM.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    /// Orchestrator-side ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Network name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// VIM-side ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_id: Option<String>,

    /// Remaining fields (subnets, external flag, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A subnet of a VIM network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    /// Orchestrator-side ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Subnet name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// VIM-side ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_id: Option<String>,

    /// CIDR block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,

    /// VIM-side ID of the parent network.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,

    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Resource quota of a VIM tenant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quota {
    /// Tenant the quota applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,

    /// Maximum cores.
    #[serde(default)]
    pub cores: i64,

    /// Maximum RAM in MB.
    #[serde(default)]
    pub ram: i64,

    /// Maximum instances.
    #[serde(default)]
    pub instances: i64,

    /// Maximum floating IPs.
    #[serde(default)]
    pub floating_ips: i64,

    /// Maximum key pairs.
    #[serde(default)]
    pub key_pairs: i64,

    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
