//! parley-service - agent host
//!
//! Serves configured agents over HTTP. Each turn is dispatched to a cached
//! graph instance, resumed if its thread is interrupted, and its events are
//! translated into the `parley-schema` stream format.

pub mod config;
pub mod convert;
pub mod dispatch;
pub mod error;
pub mod feedback;
pub mod registry;
pub mod routes;
pub mod state;
pub mod translate;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
