//! HTTP server module.
//!
//! An axum-based REST API over the analytics update service and the
//! data integrity checks. Long-running work (table updates, integrity
//! runs) executes as background jobs tracked by the job tracker; the
//! API returns a job id immediately and streams progress over SSE.

#[cfg(feature = "http-server")]
pub mod dto;

#[cfg(feature = "http-server")]
pub mod error;

#[cfg(feature = "http-server")]
pub mod handlers;

#[cfg(feature = "http-server")]
pub mod router;

#[cfg(feature = "http-server")]
pub mod state;

#[cfg(feature = "http-server")]
pub use router::create_router;

#[cfg(feature = "http-server")]
pub use state::AppState;
