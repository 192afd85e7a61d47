//! # qcall Announcer Library (qcall-announcer)
//!
//! Announcement engine for queue display nodes.
//!
//! **Purpose:** Receive "ticket called" events over the queue server's push
//! channel and turn each one into a gapless, ordered, audible announcement,
//! tolerating connection loss, event replay and overlapping calls.
//!
//! **Architecture:** One dispatcher task owns all announcement state; the
//! push connection, audio-end notifications and timers feed it through a
//! single channel. Audio runs on symphonia + rubato + cpal.

pub mod api;
pub mod audio;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod marquee;
pub mod notify;
pub mod playback;
pub mod state;

pub use error::{Error, Result};
pub use state::SharedState;
