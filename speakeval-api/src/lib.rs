//! HTTP front door for the speaking assessment graph.
//!
//! Exposes `POST /process/speaking` (multipart field `file`) and a health
//! check on `GET /`.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::ServerArgs;
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
