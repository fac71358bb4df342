// CPAL host - Real audio output
//
// The device's output callback is the audio clock: every callback renders one
// block of the attached core and advances the shared sample counter.
//
// The stream is created with the device's preferred sample format (F32, I16
// or U16); the core always renders f32 into a scratch buffer that is converted
// on write. On macOS the cpal `Stream` is not `Send`, so this host must stay
// on the thread that created it.

use crate::audio::core::{render_block, SharedCore};
use crate::audio::host::AudioHost;
use crate::audio::timing::AudioTiming;
use crate::error::{EngineError, EngineResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Frames the scratch buffer is sized for up front
const SCRATCH_FRAMES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Closed = 0,
    Running = 1,
    Error = 2,
}

impl From<u8> for StreamStatus {
    fn from(value: u8) -> Self {
        match value {
            1 => StreamStatus::Running,
            2 => StreamStatus::Error,
            _ => StreamStatus::Closed,
        }
    }
}

/// Stream status shared with the error callback
#[derive(Clone, Debug)]
pub struct AtomicStreamStatus {
    inner: Arc<AtomicU8>,
}

impl AtomicStreamStatus {
    pub fn new(status: StreamStatus) -> Self {
        Self {
            inner: Arc::new(AtomicU8::new(status as u8)),
        }
    }

    pub fn get(&self) -> StreamStatus {
        StreamStatus::from(self.inner.load(Ordering::Relaxed))
    }

    pub fn set(&self, status: StreamStatus) {
        self.inner.store(status as u8, Ordering::Relaxed);
    }
}

impl Default for AtomicStreamStatus {
    fn default() -> Self {
        Self::new(StreamStatus::Closed)
    }
}

/// Everything known once the default output device has been opened
struct OpenDevice {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    timing: AudioTiming,
}

#[derive(Default)]
pub struct CpalHost {
    opened: Option<OpenDevice>,
    stream: Option<Stream>,
    status: AtomicStreamStatus,
}

impl CpalHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> StreamStatus {
        self.status.get()
    }

    fn open_default_device() -> EngineResult<OpenDevice> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| EngineError::AudioLocked("no audio output device".to_string()))?;

        let supported_config = device
            .default_output_config()
            .map_err(|e| EngineError::AudioLocked(format!("output config unavailable: {}", e)))?;

        info!(
            device = %device.name().unwrap_or_else(|_| "Unknown".to_string()),
            sample_rate = supported_config.sample_rate().0,
            channels = supported_config.channels(),
            format = ?supported_config.sample_format(),
            "audio device opened"
        );

        let sample_format = supported_config.sample_format();
        let config: StreamConfig = supported_config.into();
        let timing = AudioTiming::new(config.sample_rate.0 as f64);
        Ok(OpenDevice {
            device,
            config,
            sample_format,
            timing,
        })
    }

    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        core: SharedCore,
        timing: AudioTiming,
        status: AtomicStreamStatus,
    ) -> EngineResult<Stream>
    where
        T: SizedSample + FromSample<f32> + Send + 'static,
    {
        let channels = config.channels as usize;
        let mut scratch = vec![0.0f32; SCRATCH_FRAMES * channels];

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    // ========== SACRED ZONE ==========
                    // No I/O, no blocking locks. Allocates only if the device
                    // asks for a larger block than ever before.
                    if scratch.len() < data.len() {
                        scratch.resize(data.len(), 0.0);
                    }
                    let block = &mut scratch[..data.len()];
                    render_block(&core, &timing, block, channels);

                    for (dst, &src) in data.iter_mut().zip(block.iter()) {
                        *dst = T::from_sample(src);
                    }
                    // ========== SACRED ZONE END ==========
                },
                move |err| {
                    // Runs outside the audio callback
                    error!(%err, "audio stream error");
                    status.set(StreamStatus::Error);
                },
                None,
            )
            .map_err(|e| EngineError::Stream(format!("stream creation failed: {}", e)))
    }
}

impl AudioHost for CpalHost {
    fn unlock(&mut self) -> EngineResult<AudioTiming> {
        if let Some(opened) = &self.opened {
            return Ok(opened.timing.clone());
        }
        let opened = Self::open_default_device()?;
        let timing = opened.timing.clone();
        self.opened = Some(opened);
        Ok(timing)
    }

    fn attach(&mut self, core: SharedCore) -> EngineResult<()> {
        let opened = self
            .opened
            .as_ref()
            .ok_or_else(|| EngineError::AudioLocked("attach before unlock".to_string()))?;

        // Replacing a stream: drop the old one first so two never run at once
        self.stream = None;

        let timing = opened.timing.clone();
        let status = self.status.clone();
        let stream = match opened.sample_format {
            SampleFormat::F32 => {
                Self::build_stream::<f32>(&opened.device, &opened.config, core, timing, status)
            }
            SampleFormat::I16 => {
                Self::build_stream::<i16>(&opened.device, &opened.config, core, timing, status)
            }
            SampleFormat::U16 => {
                Self::build_stream::<u16>(&opened.device, &opened.config, core, timing, status)
            }
            other => {
                return Err(EngineError::Stream(format!(
                    "unsupported sample format: {:?} (supported: F32, I16, U16)",
                    other
                )));
            }
        }?;

        stream
            .play()
            .map_err(|e| EngineError::Stream(format!("stream refused to start: {}", e)))?;
        self.status.set(StreamStatus::Running);
        self.stream = Some(stream);
        debug!("cpal stream attached");
        Ok(())
    }

    fn detach(&mut self) {
        if self.stream.take().is_some() {
            self.status.set(StreamStatus::Closed);
            debug!("cpal stream detached");
        }
    }
}
