//! VIM-driver plugin runtime.
//!
//! A plugin consumes `vim-drivers.<type>.<name>` and answers each request on
//! the request's reply queue. Method names are resolved through a fixed
//! table, so an unknown name or a badly typed argument becomes an
//! `exception` reply instead of a runtime fault.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Plugin`] | Channel plus request workers |
//! | [`Driver`] | Operations of a concrete VIM driver |
//! | [`PluginRequest`] / [`PluginResponse`] | Wire format |

// ============================================================================
// Submodules
// ============================================================================

/// Running plugin.
pub mod core;

/// Driver boundary.
pub mod driver;

/// Wire format and method table.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::Plugin;
pub use driver::{Driver, LaunchRequest};
pub use request::{PluginRequest, PluginResponse};
