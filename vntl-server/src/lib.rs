//! HTTP front end for the vntl job workspaces.

pub mod config;
pub mod error;
pub mod http;
pub mod state;
pub mod sweeper;
pub mod telemetry;

pub use config::ServerArgs;
pub use http::router;
pub use state::AppState;
