//! Audio output using cpal
//!
//! The cpal stream is not `Send` on every host, so it is built and owned by
//! a dedicated thread for the engine's lifetime. The render callback only
//! locks the shared [`Mixer`].

use super::engine::{AudioEngine, SourceHandle, SourceId};
use super::mixer::Mixer;
use super::types::AudioClip;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Audio device engine
pub struct CpalEngine {
    mixer: Arc<Mutex<Mixer>>,
    sample_rate: u32,
    device_name: String,
    shutdown: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

struct OpenedStream {
    mixer: Arc<Mutex<Mixer>>,
    sample_rate: u32,
    device_name: String,
}

impl CpalEngine {
    /// List available output device names
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open an output device and start the stream.
    ///
    /// An unknown `device_name` falls back to the default device.
    pub fn open(device_name: Option<&str>, volume: f32) -> Result<Self> {
        let requested = device_name.map(str::to_string);
        let (ready_tx, ready_rx) = mpsc::channel::<Result<OpenedStream>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("qcall-audio-output".to_string())
            .spawn(move || match start_stream(requested.as_deref(), volume) {
                Ok((stream, opened)) => {
                    let _ = ready_tx.send(Ok(opened));
                    // Blocks until the engine is dropped
                    let _ = shutdown_rx.recv();
                    drop(stream);
                    debug!("Audio stream closed");
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn audio thread: {}", e)))?;

        let opened = ready_rx
            .recv()
            .map_err(|_| Error::AudioOutput("Audio thread exited during startup".to_string()))??;

        info!(
            device = %opened.device_name,
            sample_rate = opened.sample_rate,
            "Audio output started"
        );

        Ok(Self {
            mixer: opened.mixer,
            sample_rate: opened.sample_rate,
            device_name: opened.device_name,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl AudioEngine for CpalEngine {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        match self.mixer.lock() {
            Ok(mixer) => mixer.clock_secs(),
            Err(poisoned) => poisoned.into_inner().clock_secs(),
        }
    }

    fn start_source(&self, clip: Arc<AudioClip>, when: f64) -> Result<SourceHandle> {
        let mut mixer = self
            .mixer
            .lock()
            .map_err(|_| Error::Playback("Mixer lock poisoned".to_string()))?;
        let placed = mixer.schedule(clip, when);
        Ok(SourceHandle {
            id: placed.id,
            start_at: placed.start_secs,
            end_at: placed.end_secs,
            ended: placed.ended,
        })
    }

    fn stop_source(&self, id: SourceId) {
        if let Ok(mut mixer) = self.mixer.lock() {
            mixer.cancel(id);
        }
    }
}

impl Drop for CpalEngine {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Audio thread panicked during shutdown");
            }
        }
    }
}

/// Runs on the audio thread
fn start_stream(device_name: Option<&str>, volume: f32) -> Result<(Stream, OpenedStream)> {
    let host = cpal::default_host();
    let device = select_device(&host, device_name)?;
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let supported = device
        .default_output_config()
        .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.config();

    debug!(
        "Audio config: sample_rate={}, channels={}, format={:?}",
        config.sample_rate.0, config.channels, sample_format
    );

    let mixer = Arc::new(Mutex::new(Mixer::new(config.sample_rate.0, volume)));

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, Arc::clone(&mixer))?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, Arc::clone(&mixer))?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, Arc::clone(&mixer))?,
        SampleFormat::I32 => build_stream::<i32>(&device, &config, Arc::clone(&mixer))?,
        other => {
            return Err(Error::AudioOutput(format!(
                "Unsupported sample format: {:?}",
                other
            )));
        }
    };

    stream
        .play()
        .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

    Ok((
        stream,
        OpenedStream {
            mixer,
            sample_rate: config.sample_rate.0,
            device_name: name,
        },
    ))
}

fn select_device(host: &cpal::Host, device_name: Option<&str>) -> Result<Device> {
    if let Some(name) = device_name {
        let mut devices = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;

        if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            return Ok(device);
        }
        warn!("Requested device '{}' not found, falling back to default device", name);
    }

    host.default_output_device()
        .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))
}

fn build_stream<T>(device: &Device, config: &StreamConfig, mixer: Arc<Mutex<Mixer>>) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                match mixer.lock() {
                    Ok(mut mixer) => mixer.render(&mut scratch, channels),
                    Err(_) => scratch.fill(0.0),
                }
                for (out, &sample) in data.iter_mut().zip(scratch.iter()) {
                    *out = T::from_sample(sample);
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
}
