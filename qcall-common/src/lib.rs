//! # qcall Common Library
//!
//! Shared code for the qcall announcement services including:
//! - Push-channel message types and the mapping to `CallEvent`
//! - Announcement clip path normalisation
//! - Configuration file resolution
//! - Timestamp helpers

pub mod clips;
pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
pub use events::{AnnouncementKey, CallEvent, EntityId};
