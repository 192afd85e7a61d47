//! View feed HTTP API
//!
//! Read-only: the display layer polls these endpoints or subscribes to
//! `/api/v1/events` for pushes.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{create_router, run, AppContext};
