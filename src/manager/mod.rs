//! VNF manager runtime.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Manager`] | Channel plus dispatcher, registered with the orchestrator |
//! | [`ManagerBuilder`] | Fluent configuration |
//! | [`Dispatcher`] | Worker pool routing inbound messages to the handler |
//! | [`Handler`] | Lifecycle operations of a concrete manager |
//! | [`Scripts`] | Where lifecycle scripts come from |
//! | [`ManagerEndpoint`] | Registration record |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder.
pub mod builder;

/// Running manager.
pub mod core;

/// Dispatcher worker pool.
pub mod dispatcher;

/// Registration record.
pub mod endpoint;

/// Business boundary.
pub mod handler;

mod flows;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ManagerBuilder;
pub use self::core::Manager;
pub use dispatcher::Dispatcher;
pub use endpoint::{ENDPOINT_TYPE_RABBIT, ManagerEndpoint};
pub use handler::{Handler, Scripts};
