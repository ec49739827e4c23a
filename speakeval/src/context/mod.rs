//! Context management for graph runs.
//!
//! This module provides:
//! - The shared result context with exclusive per-field ownership
//! - Read-only projections handed to stages
//! - Run identity for correlation

mod identity;
mod projection;
mod result;

pub use identity::RunIdentity;
pub use projection::ContextProjection;
pub use result::{is_truthy, ResultContext, INITIAL_OWNER};
