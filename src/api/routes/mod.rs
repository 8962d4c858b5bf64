//! Route handlers for the front door
//!
//! Handlers are organized by domain:
//! - [`artifact`] - Cached artifacts
//! - [`feed`] - The republished feed
//! - [`system`] - Health and poll status

mod artifact;
mod feed;
mod system;

// Re-export all handlers so `routes::function_name` works
pub use artifact::*;
pub use feed::*;
pub use system::*;
