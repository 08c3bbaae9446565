//! NFV data model subset carried inside protocol messages.
//!
//! The orchestrator owns the full information model; this runtime treats it
//! as opaque documents and types only what the lifecycle flows need. Every
//! struct keeps unknown fields in an `extra` map so records survive a trip
//! through the manager unchanged.
//!
//! References between records (a VNF record and its parent network service)
//! are identifiers, never pointers.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `descriptor` | VNF descriptors, flavours, packages and scripts |
//! | `record` | VNF records, deployment units and component instances |
//! | `vim` | VIM instances, keys and VIM resources |

// ============================================================================
// Submodules
// ============================================================================

/// Descriptors and packages.
pub mod descriptor;

/// Runtime records.
pub mod record;

/// VIM-side types.
pub mod vim;

// ============================================================================
// Re-exports
// ============================================================================

pub use descriptor::{Script, VirtualNetworkFunctionDescriptor, VnfDeploymentFlavour, VnfPackage};
pub use record::{
    EXTENSION_NSR_ID, STATE_STANDBY, Status, VirtualDeploymentUnit, VirtualLinkRecord,
    VirtualNetworkFunctionRecord, VnfComponent, VnfcInstance, VnfrDependency,
};
pub use vim::{DeploymentFlavour, Key, Network, NfvImage, Quota, Server, Subnet, VimInstance};
