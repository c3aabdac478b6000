//! HTTP boundary and configuration for the Firesync service.
//!
//! The router maps CloudEvent intake requests onto the propagation
//! engine and exposes liveness and metrics endpoints. All vendor-shaped
//! concerns stay here; the engine only ever sees classified events.

mod config;
mod handlers;

pub use config::Config;
pub use handlers::{build_router, AppState};
