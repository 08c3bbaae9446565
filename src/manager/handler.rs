//! Business boundary of a VNF manager.
//!
//! The dispatcher owns the protocol; a [`Handler`] owns what actually happens
//! to a VNF. Every operation takes the record and returns the updated record
//! or an error. Errors are reported to the orchestrator as `ERROR` messages
//! carrying the record known at the failure point.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::catalogue::{Script, VimInstance, VirtualNetworkFunctionRecord, VnfPackage, VnfcInstance, VnfrDependency};
use crate::error::Result;
use crate::protocol::Action;

// ============================================================================
// Scripts
// ============================================================================

/// Where the lifecycle scripts of a VNF come from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Scripts {
    /// No package was supplied.
    #[default]
    None,
    /// The package names a location the scripts can be fetched from.
    Link(String),
    /// The package carries the scripts.
    Inline(Vec<Script>),
}

impl Scripts {
    /// Picks the scripts source of a package.
    ///
    /// A non-empty scripts link wins over inline scripts.
    #[must_use]
    pub fn from_package(package: Option<&VnfPackage>) -> Self {
        match package {
            None => Self::None,
            Some(package) if !package.scripts_link.is_empty() => {
                Self::Link(package.scripts_link.clone())
            }
            Some(package) => Self::Inline(package.scripts.clone()),
        }
    }

    /// Returns `true` if there is nothing to run.
    #[inline]
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

// ============================================================================
// Handler
// ============================================================================

/// Lifecycle operations implemented by a concrete VNF manager.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Chooses the action a `RESUME` replays; it becomes the reply's action.
    async fn action_for_resume(
        &self,
        vnfr: &VirtualNetworkFunctionRecord,
        vnfc_instance: Option<&VnfcInstance>,
    ) -> Result<Action>;

    /// Checks that an instantiation can proceed; runs before the grant.
    async fn check_instantiation_feasibility(&self) -> Result<()>;

    /// Applies the configuration lifecycle events.
    async fn configure(&self, vnfr: VirtualNetworkFunctionRecord) -> Result<VirtualNetworkFunctionRecord>;

    /// Reacts to an error reported by the orchestrator.
    async fn handle_error(&self, vnfr: VirtualNetworkFunctionRecord) -> Result<VirtualNetworkFunctionRecord>;

    /// Heals a component instance.
    async fn heal(
        &self,
        vnfr: VirtualNetworkFunctionRecord,
        vnfc_instance: Option<VnfcInstance>,
        cause: Option<String>,
    ) -> Result<VirtualNetworkFunctionRecord>;

    /// Deploys a granted record.
    ///
    /// `vim_instances` maps deployment unit IDs to the VIM instances the
    /// orchestrator offered for them.
    async fn instantiate(
        &self,
        vnfr: VirtualNetworkFunctionRecord,
        scripts: Scripts,
        vim_instances: &BTreeMap<String, Vec<VimInstance>>,
    ) -> Result<VirtualNetworkFunctionRecord>;

    /// Applies a dependency change.
    async fn modify(
        &self,
        vnfr: VirtualNetworkFunctionRecord,
        dependency: Option<VnfrDependency>,
    ) -> Result<VirtualNetworkFunctionRecord>;

    /// Resumes a record after a failure.
    async fn resume(
        &self,
        vnfr: VirtualNetworkFunctionRecord,
        vnfc_instance: Option<VnfcInstance>,
        dependency: Option<VnfrDependency>,
    ) -> Result<VirtualNetworkFunctionRecord>;

    /// Scales a record in or out.
    ///
    /// For `SCALE_OUT` the instance is the one the orchestrator created;
    /// for `SCALE_IN` it is the one to remove.
    async fn scale(
        &self,
        action: Action,
        vnfr: VirtualNetworkFunctionRecord,
        vnfc_instance: Option<VnfcInstance>,
        scripts: Scripts,
    ) -> Result<VirtualNetworkFunctionRecord>;

    /// Starts every component of a record.
    async fn start(&self, vnfr: VirtualNetworkFunctionRecord) -> Result<VirtualNetworkFunctionRecord>;

    /// Starts a single component instance.
    async fn start_vnfc_instance(
        &self,
        vnfr: VirtualNetworkFunctionRecord,
        vnfc_instance: VnfcInstance,
    ) -> Result<VirtualNetworkFunctionRecord>;

    /// Stops every component of a record.
    async fn stop(&self, vnfr: VirtualNetworkFunctionRecord) -> Result<VirtualNetworkFunctionRecord>;

    /// Stops a single component instance.
    async fn stop_vnfc_instance(
        &self,
        vnfr: VirtualNetworkFunctionRecord,
        vnfc_instance: VnfcInstance,
    ) -> Result<VirtualNetworkFunctionRecord>;

    /// Releases the resources of a record.
    async fn terminate(&self, vnfr: VirtualNetworkFunctionRecord) -> Result<VirtualNetworkFunctionRecord>;

    /// Runs an updated script.
    async fn update_software(
        &self,
        script: Option<Script>,
        vnfr: VirtualNetworkFunctionRecord,
    ) -> Result<VirtualNetworkFunctionRecord>;

    /// Cloud-init user data sent with allocation and scaling requests.
    async fn user_data(&self) -> String;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn package(link: &str, scripts: Vec<Script>) -> VnfPackage {
        VnfPackage {
            scripts_link: link.to_string(),
            scripts,
            ..VnfPackage::default()
        }
    }

    fn script(name: &str) -> Script {
        Script {
            id: None,
            name: name.to_string(),
            payload: b"#!/bin/sh".to_vec(),
        }
    }

    #[test]
    fn test_scripts_without_package() {
        assert!(Scripts::from_package(None).is_none());
    }

    #[test]
    fn test_scripts_link_wins() {
        let package = package("https://scripts.example/iperf.git", vec![script("install.sh")]);
        assert_eq!(
            Scripts::from_package(Some(&package)),
            Scripts::Link("https://scripts.example/iperf.git".into())
        );
    }

    #[test]
    fn test_scripts_inline_when_link_empty() {
        let package = package("", vec![script("install.sh")]);
        match Scripts::from_package(Some(&package)) {
            Scripts::Inline(scripts) => assert_eq!(scripts[0].name, "install.sh"),
            other => panic!("expected inline scripts, got {other:?}"),
        }
    }

    #[test]
    fn test_scripts_inline_may_be_empty() {
        let package = package("", Vec::new());
        assert_eq!(Scripts::from_package(Some(&package)), Scripts::Inline(Vec::new()));
    }
}
