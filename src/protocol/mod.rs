//! Lifecycle protocol messages and their wire codec.
//!
//! This module defines the message format exchanged between the manager
//! (VNFM) and the orchestrator (NFVO).
//!
//! # Protocol Overview
//!
//! | Direction | Shapes | Example |
//! |-----------|--------|---------|
//! | NFVO → VNFM | `Or*` | instantiate request, grant reply |
//! | VNFM → NFVO | `Vnfm*` | grant request, scaled notification |
//! | either | [`Unrecognized`] | actions without a dedicated shape |
//!
//! # Wire Format
//!
//! A flat JSON object with an `action` field next to the payload fields:
//!
//! ```json
//! { "action": "SCALED", "vnfr": { ... }, "vnfcInstance": { ... } }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `action` | Action enumeration and sender roles |
//! | `codec` | Envelope encoding and decoding |
//! | `manager` | Payloads sent by the manager |
//! | `message` | Message envelope and shape tables |
//! | `orchestrator` | Payloads sent by the orchestrator |

// ============================================================================
// Submodules
// ============================================================================

/// Actions and sender roles.
pub mod action;

/// Wire codec.
pub mod codec;

/// VNFM → NFVO payloads.
pub mod manager;

/// Message envelope.
pub mod message;

/// NFVO → VNFM payloads.
pub mod orchestrator;

// ============================================================================
// Re-exports
// ============================================================================

pub use action::{Action, NO_ACTION_SPECIFIED, SenderType};
pub use codec::{decode, encode};
pub use manager::{
    ExceptionDetail, VnfmAllocateResources, VnfmError, VnfmGeneric, VnfmGrant, VnfmHeal,
    VnfmInstantiate, VnfmScaled, VnfmScaling, VnfmStartStop,
};
pub use message::{Message, Payload, Shape, Unrecognized};
pub use orchestrator::{
    OrError, OrGeneric, OrGrant, OrHeal, OrInstantiate, OrScaling, OrStartStop, OrUpdate,
};
