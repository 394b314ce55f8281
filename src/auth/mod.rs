//! Actor context for protected routes.
//!
//! Authentication itself happens upstream; the gateway forwards the
//! verified identity in trusted headers and every protected route extracts
//! an [`ActorContext`] from them.

pub mod context;

pub use context::{ActorContext, ActorRole};
