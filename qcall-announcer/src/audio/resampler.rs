//! Sample-rate conversion using rubato
//!
//! Clips arrive at whatever rate they were recorded at; the output device
//! runs at its own rate. Each clip is converted once, when it enters the
//! cache, so the render path never resamples.

use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler as _};
use tracing::debug;

pub struct Resampler;

impl Resampler {
    /// Resample interleaved audio from `input_rate` to `output_rate`.
    ///
    /// Returns a copy when the rates already match.
    pub fn resample(
        input: &[f32],
        input_rate: u32,
        output_rate: u32,
        channels: u16,
    ) -> Result<Vec<f32>> {
        if input_rate == output_rate || input.is_empty() {
            return Ok(input.to_vec());
        }
        if input_rate == 0 || output_rate == 0 || channels == 0 {
            return Err(Error::Decode(format!(
                "Cannot resample {}Hz -> {}Hz with {} channels",
                input_rate, output_rate, channels
            )));
        }

        let planar_input = Self::deinterleave(input, channels);
        let input_frames = planar_input[0].len();

        let mut resampler = FastFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0,
            PolynomialDegree::Septic,
            input_frames,
            channels as usize,
        )
        .map_err(|e| Error::Decode(format!("Failed to create resampler: {}", e)))?;

        let planar_output = resampler
            .process(&planar_input, None)
            .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;

        let output = Self::interleave(planar_output);

        debug!(
            "Resampled {} frames at {}Hz to {} frames at {}Hz",
            input_frames,
            input_rate,
            output.len() / channels as usize,
            output_rate
        );

        Ok(output)
    }

    /// [L, R, L, R, ...] -> [[L, L, ...], [R, R, ...]]
    fn deinterleave(samples: &[f32], channels: u16) -> Vec<Vec<f32>> {
        let num_channels = channels as usize;
        let num_frames = samples.len() / num_channels;
        let mut planar = vec![Vec::with_capacity(num_frames); num_channels];

        for frame in samples.chunks_exact(num_channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                planar[ch].push(sample);
            }
        }

        planar
    }

    /// [[L, L, ...], [R, R, ...]] -> [L, R, L, R, ...]
    fn interleave(planar: Vec<Vec<f32>>) -> Vec<f32> {
        let Some(first) = planar.first() else {
            return Vec::new();
        };

        let num_frames = first.len();
        let mut interleaved = Vec::with_capacity(num_frames * planar.len());
        for frame_idx in 0..num_frames {
            for channel in &planar {
                interleaved.push(channel[frame_idx]);
            }
        }

        interleaved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deinterleave() {
        let planar = Resampler::deinterleave(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2);
        assert_eq!(planar[0], vec![1.0, 3.0, 5.0]);
        assert_eq!(planar[1], vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_interleave() {
        let interleaved = Resampler::interleave(vec![vec![1.0, 3.0], vec![2.0, 4.0]]);
        assert_eq!(interleaved, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_same_rate_is_copy() {
        let input = vec![0.1, 0.2, 0.3, 0.4];
        let output = Resampler::resample(&input, 48000, 48000, 2).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_upsample_roughly_scales_frame_count() {
        let input = vec![0.0f32; 22050 * 2];
        let output = Resampler::resample(&input, 22050, 44100, 2).unwrap();
        let frames = output.len() / 2;
        // FastFixedIn may hold back a few frames of delay
        assert!(frames > 43000 && frames <= 44200, "got {} frames", frames);
    }

    #[test]
    fn test_zero_rate_rejected() {
        assert!(Resampler::resample(&[0.0, 0.0], 0, 44100, 2).is_err());
    }
}
