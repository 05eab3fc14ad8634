//! Shared types for the relief coordination server.
//!
//! Everything that crosses a crate boundary lives here: domain models,
//! REST request/response bodies, gateway events, and the pure rules
//! (geo math, status transitions) that both the API and the database
//! layer rely on.

#[macro_use]
mod macros;

pub mod api;
pub mod events;
pub mod geo;
pub mod models;
pub mod workflow;

/// A string did not name any variant of a wire enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}
