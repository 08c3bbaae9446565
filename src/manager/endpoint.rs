//! Registration record of a VNF manager.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::config::ManagerConfig;

// ============================================================================
// Constants
// ============================================================================

/// Endpoint type announced to the orchestrator.
pub const ENDPOINT_TYPE_RABBIT: &str = "RABBIT";

// ============================================================================
// ManagerEndpoint
// ============================================================================

/// What a manager publishes on `manager-register` and `manager-unregister`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerEndpoint {
    /// VNF type served.
    #[serde(rename = "type")]
    pub vnfm_type: String,
    /// Queue the manager consumes.
    pub endpoint: String,
    /// Always [`ENDPOINT_TYPE_RABBIT`].
    pub endpoint_type: String,
    /// Free text.
    pub description: String,
    /// Enabled flag.
    pub enabled: bool,
    /// Active flag.
    pub active: bool,
}

impl ManagerEndpoint {
    /// Builds the endpoint of a configured manager.
    #[must_use]
    pub fn from_config(config: &ManagerConfig) -> Self {
        Self {
            vnfm_type: config.vnfm_type.clone(),
            endpoint: config.endpoint_queue().to_string(),
            endpoint_type: ENDPOINT_TYPE_RABBIT.to_string(),
            description: config.description.clone(),
            enabled: config.enabled,
            active: config.active,
        }
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
    fn test_endpoint_wire_format() {
        let config = ManagerConfig::new("dummy").with_description("dummy manager");
        let endpoint = ManagerEndpoint::from_config(&config);

        assert_eq!(
            serde_json::to_value(&endpoint).expect("json"),
            json!({
                "type": "dummy",
                "endpoint": "dummy",
                "endpointType": "RABBIT",
                "description": "dummy manager",
                "enabled": true,
                "active": true
            })
        );
    }

    #[test]
    fn test_endpoint_uses_explicit_queue() {
        let config = ManagerConfig::new("dummy").with_endpoint("vnfm-dummy-1");
        assert_eq!(ManagerEndpoint::from_config(&config).endpoint, "vnfm-dummy-1");
    }
}
