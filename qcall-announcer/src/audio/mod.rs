//! Audio subsystem
//!
//! Clip fetching and decoding, sample-rate conversion, and the output
//! engines the playback scheduler drives.

pub mod clip_cache;
pub mod decoder;
pub mod engine;
pub mod mixer;
pub mod output;
pub mod resampler;
pub mod types;
pub mod virtual_engine;

pub use clip_cache::{AudioClipCache, ClipSource, HttpClipSource};
pub use decoder::ClipDecoder;
pub use engine::{AudioEngine, SourceHandle, SourceId};
pub use output::CpalEngine;
pub use types::{AudioClip, ClipFailure, ClipState, DecodedClip};
pub use virtual_engine::VirtualEngine;
