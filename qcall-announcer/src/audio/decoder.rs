//! Clip decoder using symphonia
//!
//! Decodes fetched clip bytes (WAV, MP3, FLAC, Vorbis, AAC) to interleaved
//! stereo f32. Clips are short, so the whole stream is decoded in one pass
//! from memory.

use super::resampler::Resampler;
use super::types::{DecodedClip, OUTPUT_CHANNELS};
use crate::error::{Error, Result};
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Result of fully preparing a clip for an engine
#[derive(Debug, Clone)]
pub struct PreparedClip {
    pub buffer: DecodedClip,
    pub duration_secs: f64,
}

pub struct ClipDecoder;

impl ClipDecoder {
    /// Decode a complete clip held in memory.
    ///
    /// `extension` is a format hint (usually the clip key's extension).
    ///
    /// # Returns
    /// - interleaved stereo f32 samples (mono duplicated, extra channels
    ///   folded into left/right)
    /// - the source sample rate
    pub fn decode(bytes: &[u8], extension: Option<&str>) -> Result<(Vec<f32>, u32)> {
        let cursor = Cursor::new(bytes.to_vec());
        let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to probe format: {}", e)))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;

        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        let mut stereo = Vec::new();
        let mut sample_buf: Option<SampleBuffer<f32>> = None;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => {
                    warn!("Error reading packet: {}", e);
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping undecodable packet: {}", e);
                    continue;
                }
                Err(e) => return Err(Error::Decode(format!("Decode failed: {}", e))),
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count();

            let needed = decoded.capacity() * channels;
            if sample_buf.as_ref().map_or(true, |buf| buf.capacity() < needed) {
                sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
            }
            if let Some(buf) = sample_buf.as_mut() {
                buf.copy_interleaved_ref(decoded);
                push_stereo(buf.samples(), channels, &mut stereo);
            }
        }

        debug!(
            "Decoded {} frames at {}Hz",
            stereo.len() / OUTPUT_CHANNELS,
            sample_rate
        );

        Ok((stereo, sample_rate))
    }

    /// Decode and convert to `target_rate`.
    ///
    /// Duration is taken from the source frame count and rate, before
    /// resampling. A clip with no audio frames is a decode error.
    pub fn prepare(bytes: &[u8], extension: Option<&str>, target_rate: u32) -> Result<PreparedClip> {
        let (samples, source_rate) = Self::decode(bytes, extension)?;

        let source_frames = samples.len() / OUTPUT_CHANNELS;
        if source_frames == 0 {
            return Err(Error::Decode("Clip contains no audio frames".to_string()));
        }
        let duration_secs = source_frames as f64 / source_rate as f64;

        let samples = Resampler::resample(&samples, source_rate, target_rate, OUTPUT_CHANNELS as u16)?;

        Ok(PreparedClip {
            buffer: DecodedClip {
                samples,
                sample_rate: target_rate,
            },
            duration_secs,
        })
    }
}

/// Append interleaved samples with `channels` channels as stereo
fn push_stereo(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    match channels {
        0 => {}
        1 => {
            for &s in interleaved {
                out.push(s);
                out.push(s);
            }
        }
        2 => out.extend_from_slice(interleaved),
        n => {
            // Even channels fold left, odd channels fold right
            let per_side_left = n.div_ceil(2) as f32;
            let per_side_right = (n / 2) as f32;
            for frame in interleaved.chunks_exact(n) {
                let (mut left, mut right) = (0.0f32, 0.0f32);
                for (ch, &s) in frame.iter().enumerate() {
                    if ch % 2 == 0 {
                        left += s;
                    } else {
                        right += s;
                    }
                }
                out.push(left / per_side_left);
                out.push(right / per_side_right);
            }
        }
    }
}
