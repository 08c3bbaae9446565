//! Operations a VIM driver exposes to the orchestrator.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::catalogue::{DeploymentFlavour, Key, Network, NfvImage, Quota, Server, Subnet, VimInstance};
use crate::error::Result;

// ============================================================================
// LaunchRequest
// ============================================================================

/// Parameters shared by the two launch operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaunchRequest {
    /// Server name.
    pub name: String,
    /// Image name or ID.
    pub image: String,
    /// Flavour name or ID.
    pub flavour: String,
    /// Key pair name.
    pub key_pair: String,
    /// Networks to attach.
    pub networks: Vec<String>,
    /// Security groups to apply.
    pub security_groups: Vec<String>,
    /// Cloud-init user data.
    pub user_data: String,
}

// ============================================================================
// Driver
// ============================================================================

/// A VIM driver.
///
/// Method names mirror the wire `methodName` values in camel case.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// `addFlavor`
    async fn add_flavor(&self, vim: VimInstance, flavour: DeploymentFlavour) -> Result<DeploymentFlavour>;

    /// `addImage`; `image_file` is the raw image.
    async fn add_image(&self, vim: VimInstance, image: NfvImage, image_file: Vec<u8>) -> Result<NfvImage>;

    /// `createNetwork`
    async fn create_network(&self, vim: VimInstance, network: Network) -> Result<Network>;

    /// `createSubnet`
    async fn create_subnet(&self, vim: VimInstance, network: Network, subnet: Subnet) -> Result<Subnet>;

    /// `deleteFlavor`
    async fn delete_flavor(&self, vim: VimInstance, ext_id: String) -> Result<bool>;

    /// `deleteImage`
    async fn delete_image(&self, vim: VimInstance, image: NfvImage) -> Result<bool>;

    /// `deleteNetwork`
    async fn delete_network(&self, vim: VimInstance, ext_id: String) -> Result<bool>;

    /// `deleteSubnet`
    async fn delete_subnet(&self, vim: VimInstance, ext_id: String) -> Result<bool>;

    /// `deleteServerByIdAndWait`
    async fn delete_server_by_id_and_wait(&self, vim: VimInstance, id: String) -> Result<()>;

    /// `getNetworkById`
    async fn get_network_by_id(&self, vim: VimInstance, id: String) -> Result<Network>;

    /// `getQuota`
    async fn get_quota(&self, vim: VimInstance) -> Result<Quota>;

    /// `getType`
    async fn get_type(&self, vim: VimInstance) -> Result<String>;

    /// `launchInstance`
    async fn launch_instance(&self, vim: VimInstance, request: LaunchRequest) -> Result<Server>;

    /// `launchInstanceAndWait`
    ///
    /// `floating_ips` maps network names to the address to assign (or
    /// `random`); `keys` are injected into the server.
    async fn launch_instance_and_wait(
        &self,
        vim: VimInstance,
        request: LaunchRequest,
        floating_ips: BTreeMap<String, String>,
        keys: Vec<Key>,
    ) -> Result<Server>;

    /// `listFlavors`
    async fn list_flavors(&self, vim: VimInstance) -> Result<Vec<DeploymentFlavour>>;

    /// `listImages`
    async fn list_images(&self, vim: VimInstance) -> Result<Vec<NfvImage>>;

    /// `listNetworks`
    async fn list_networks(&self, vim: VimInstance) -> Result<Vec<Network>>;

    /// `listServer`
    async fn list_server(&self, vim: VimInstance) -> Result<Vec<Server>>;

    /// `updateNetwork`
    async fn update_network(&self, vim: VimInstance, network: Network) -> Result<Network>;
}
