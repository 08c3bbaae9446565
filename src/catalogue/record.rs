//! Runtime records: VNF records, deployment units and component instances.
//!
//! Records are exchanged with the orchestrator largely as opaque documents.
//! Only the fields the lifecycle flows read or write are typed; everything
//! else is kept in the `extra` map and written back unchanged.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use super::descriptor::VirtualNetworkFunctionDescriptor;
use super::vim::VimInstance;

// ============================================================================
// Constants
// ============================================================================

/// Extension key carrying the parent network service record ID.
pub const EXTENSION_NSR_ID: &str = "nsr-id";

/// VNFC instance state marking a standby (passive) instance.
pub const STATE_STANDBY: &str = "STANDBY";

// ============================================================================
// Status
// ============================================================================

/// Lifecycle status of a VNF record.
///
/// Status strings this runtime does not know are kept verbatim in
/// [`Status::Other`] so the record goes back to the orchestrator unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Status {
    /// Freshly built, not yet instantiated.
    #[default]
    Null,
    /// Resources allocated.
    Initialized,
    /// Instantiated but not started.
    Inactive,
    /// Scaling in progress.
    Scaling,
    /// Running.
    Active,
    /// Failed.
    Error,
    /// Released.
    Terminated,
    /// Resuming after a failure.
    Resuming,
    /// A status string this runtime does not know.
    Other(String),
}

impl Status {
    /// Parses a wire string, keeping unknown values as [`Status::Other`].
    #[must_use]
    pub fn from_wire(value: &str) -> Self {
        match value {
            "NULL" => Self::Null,
            "INITIALIZED" => Self::Initialized,
            "INACTIVE" => Self::Inactive,
            "SCALING" => Self::Scaling,
            "ACTIVE" => Self::Active,
            "ERROR" => Self::Error,
            "TERMINATED" => Self::Terminated,
            "RESUMING" => Self::Resuming,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the string written to the wire.
    #[must_use]
    pub fn as_wire(&self) -> &str {
        match self {
            Self::Null => "NULL",
            Self::Initialized => "INITIALIZED",
            Self::Inactive => "INACTIVE",
            Self::Scaling => "SCALING",
            Self::Active => "ACTIVE",
            Self::Error => "ERROR",
            Self::Terminated => "TERMINATED",
            Self::Resuming => "RESUMING",
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_wire())
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&raw))
    }
}

// ============================================================================
// VnfComponent
// ============================================================================

/// Template of a VNF component inside a deployment unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VnfComponent {
    /// Component ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Connection points, kept opaque.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connection_point: Vec<Value>,

    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// VnfcInstance
// ============================================================================

/// A running instance of a VNF component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VnfcInstance {
    /// Instance ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Hostname of the virtual machine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// ID of the VIM hosting the instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vim_id: Option<String>,

    /// ID of the virtual compute resource on the VIM.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vc_id: Option<String>,

    /// Instance state (for example `ACTIVE` or `STANDBY`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Component this instance was created from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vnf_component: Option<VnfComponent>,

    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VnfcInstance {
    /// Returns the ID of the component this instance was created from.
    #[inline]
    #[must_use]
    pub fn component_id(&self) -> Option<&str> {
        self.vnf_component.as_ref().and_then(|c| c.id.as_deref())
    }
}

// ============================================================================
// VirtualDeploymentUnit
// ============================================================================

/// A deployable unit, used both in descriptors and in records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualDeploymentUnit {
    /// Unit ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Unit name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// ID of the descriptor unit this record unit was built from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_vdu: Option<String>,

    /// Names of the VIM instances this unit may be deployed on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vim_instance_name: Vec<String>,

    /// Images usable by this unit.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vm_image: Vec<String>,

    /// Maximum number of component instances.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_in_out: Option<u32>,

    /// Component templates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vnfc: Vec<VnfComponent>,

    /// Running component instances.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vnfc_instance: Vec<VnfcInstance>,

    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// VirtualLinkRecord
// ============================================================================

/// Record of a virtual link the VNF is attached to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualLinkRecord {
    /// Link record ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Link name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// VnfrDependency
// ============================================================================

/// Dependency of a VNF record on parameters exposed by other records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VnfrDependency {
    /// Dependency ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Name of the dependent record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Dependency parameters, kept opaque.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,

    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// VirtualNetworkFunctionRecord
// ============================================================================

/// Runtime record of a virtual network function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualNetworkFunctionRecord {
    /// Record ID, assigned by the orchestrator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Record name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// VNF type (matches the manager type).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub vnf_type: Option<String>,

    /// ID of the descriptor this record was built from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor_reference: Option<String>,

    /// ID of the network service record owning this VNF.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_ns_id: Option<String>,

    /// Lifecycle status.
    #[serde(default)]
    pub status: Status,

    /// Flavour key chosen at instantiation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_flavour_key: Option<String>,

    /// Manager endpoint responsible for this VNF.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// ID of the VNF package.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_id: Option<String>,

    /// Deployment units.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vdu: Vec<VirtualDeploymentUnit>,

    /// Virtual links.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub virtual_link: Vec<VirtualLinkRecord>,

    /// Lifecycle events, kept opaque.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lifecycle_event: Vec<Value>,

    /// Monitoring parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub monitoring_parameter: Vec<String>,

    /// Configuration block, kept opaque.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configurations: Option<Value>,

    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VirtualNetworkFunctionRecord {
    /// Builds a fresh record from a descriptor.
    ///
    /// The record references the descriptor, starts in [`Status::Null`] and
    /// holds one deployment unit per descriptor unit with no component
    /// instances. Units that name no VIM instance may use every VIM instance
    /// supplied by the orchestrator.
    ///
    /// # Arguments
    ///
    /// * `vnfd` - Descriptor to build from
    /// * `flavour_key` - Deployment flavour chosen by the orchestrator
    /// * `vlrs` - Virtual link records the VNF is attached to
    /// * `extension` - Extension map (`nsr-id` becomes the parent NS ID)
    /// * `vim_instances` - VIM instances per deployment unit
    #[must_use]
    pub fn from_descriptor(
        vnfd: &VirtualNetworkFunctionDescriptor,
        flavour_key: Option<&str>,
        vlrs: &[VirtualLinkRecord],
        extension: &BTreeMap<String, String>,
        vim_instances: &BTreeMap<String, Vec<VimInstance>>,
    ) -> Self {
        let vdu = vnfd
            .vdu
            .iter()
            .map(|template| {
                let mut vim_instance_name = template.vim_instance_name.clone();
                if vim_instance_name.is_empty() {
                    let key = template.id.as_deref().unwrap_or_default();
                    vim_instance_name = vim_instances
                        .get(key)
                        .into_iter()
                        .flatten()
                        .filter_map(|vim| vim.name.clone())
                        .collect();
                }

                VirtualDeploymentUnit {
                    id: None,
                    name: template.name.clone(),
                    parent_vdu: template.id.clone(),
                    vim_instance_name,
                    vm_image: template.vm_image.clone(),
                    scale_in_out: template.scale_in_out,
                    vnfc: template.vnfc.clone(),
                    vnfc_instance: Vec::new(),
                    extra: template.extra.clone(),
                }
            })
            .collect();

        Self {
            id: None,
            name: vnfd.name.clone(),
            vnf_type: vnfd.vnf_type.clone(),
            descriptor_reference: vnfd.id.clone(),
            parent_ns_id: extension.get(EXTENSION_NSR_ID).cloned(),
            status: Status::Null,
            deployment_flavour_key: flavour_key.map(str::to_string),
            endpoint: vnfd.endpoint.clone(),
            package_id: vnfd.vnf_package_location.clone(),
            vdu,
            virtual_link: vlrs.to_vec(),
            lifecycle_event: vnfd.lifecycle_event.clone(),
            monitoring_parameter: vnfd.monitoring_parameter.clone(),
            configurations: vnfd.configurations.clone(),
            extra: Map::new(),
        }
    }

    /// Returns the ID of the owning network service record, or an empty string.
    #[inline]
    #[must_use]
    pub fn nsr_id(&self) -> &str {
        self.parent_ns_id.as_deref().unwrap_or_default()
    }

    /// Finds the component instance created from the given component.
    #[must_use]
    pub fn find_instance_mut(&mut self, component_id: &str) -> Option<&mut VnfcInstance> {
        self.vdu
            .iter_mut()
            .flat_map(|vdu| vdu.vnfc_instance.iter_mut())
            .find(|instance| instance.component_id() == Some(component_id))
    }
}

// ============================================================================
// Tests
// ============================================================================
