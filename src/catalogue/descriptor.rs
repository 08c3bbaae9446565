//! Descriptors and packages: templates the orchestrator hands to the manager.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::record::VirtualDeploymentUnit;

// ============================================================================
// VirtualNetworkFunctionDescriptor
// ============================================================================

/// Template of a virtual network function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualNetworkFunctionDescriptor {
    /// Descriptor ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Descriptor name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// VNF type.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub vnf_type: Option<String>,

    /// Manager endpoint responsible for this VNF.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Location of the VNF package.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vnf_package_location: Option<String>,

    /// Deployment unit templates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vdu: Vec<VirtualDeploymentUnit>,

    /// Deployment flavours.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deployment_flavour: Vec<VnfDeploymentFlavour>,

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

// ============================================================================
// VnfDeploymentFlavour
// ============================================================================

/// Deployment flavour of a VNF.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VnfDeploymentFlavour {
    /// Flavour ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Flavour key (for example `m1.small`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavour_key: Option<String>,

    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Script
// ============================================================================

/// A lifecycle script shipped inside a VNF package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    /// Script ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// File name.
    #[serde(default)]
    pub name: String,

    /// Script content, base64 on the wire.
    #[serde(default, with = "base64_bytes")]
    pub payload: Vec<u8>,
}

// ============================================================================
// VnfPackage
// ============================================================================

/// A VNF package with its lifecycle scripts.
///
/// Scripts are either shipped inline or referenced by a link (for example a
/// git repository); a non-empty `scripts_link` takes precedence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VnfPackage {
    /// Package ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Package name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Link to the scripts; empty when scripts are inline.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scripts_link: String,

    /// Inline scripts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scripts: Vec<Script>,

    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Base64 Serde Adapter
// ============================================================================

/// Serializes `Vec<u8>` as a standard base64 string.
mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        STANDARD.decode(encoded.as_bytes()).map_err(D::Error::custom)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_script_payload_is_base64() {
        let script = Script {
            id: None,
            name: "install.sh".into(),
            payload: b"#!/bin/sh\necho hi\n".to_vec(),
        };

        let value = serde_json::to_value(&script).expect("serialize");
        assert_eq!(value["payload"], json!("IyEvYmluL3NoCmVjaG8gaGkK"));

        let back: Script = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, script);
    }

    #[test]
    fn test_script_null_payload() {
        let script: Script =
            serde_json::from_value(json!({"name": "a.sh", "payload": null})).expect("parse");
        assert!(script.payload.is_empty());
    }

    #[test]
    fn test_package_scripts_link_defaults_empty() {
        let package: VnfPackage = serde_json::from_value(json!({"name": "p"})).expect("parse");
        assert!(package.scripts_link.is_empty());
        assert!(package.scripts.is_empty());
    }

    #[test]
    fn test_descriptor_keeps_unknown_fields() {
        let raw = json!({"id": "d", "vendor": "fokus", "version": "1"});
        let vnfd: VirtualNetworkFunctionDescriptor =
            serde_json::from_value(raw.clone()).expect("parse");
        assert_eq!(serde_json::to_value(&vnfd).expect("serialize"), raw);
    }
}
