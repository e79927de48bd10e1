//! Audio output
//!
//! The engine's [`AudioRenderer`] is a pull source: something has to ask it
//! for samples at the device rate, otherwise the audio queue fills up and
//! demuxing stalls.
//!
//! ```text
//! ┌───────────────┐  fill(buf)  ┌─────────────────────────────┐
//! │ AudioRenderer │ <────────── │ headless pacing thread      │
//! │  (vsplay-core)│             │   or CPAL output callback   │
//! └───────────────┘             └─────────────────────────────┘
//! ```
//!
//! The headless sink paces itself with the wall clock and throws the
//! samples away. The CPAL sink (feature `cpal-output`) plays them on the
//! default output device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Result;
use vsplay_core::playback::AudioRenderer;

use crate::config::{AudioBackend, AudioOutputConfig};

/// A running audio sink; dropping it stops output
pub enum AudioOutput {
    Headless(HeadlessSink),
    #[cfg(feature = "cpal-output")]
    Cpal(cpal_output::CpalSink),
}

impl AudioOutput {
    pub fn describe(&self) -> &'static str {
        match self {
            AudioOutput::Headless(_) => "headless",
            #[cfg(feature = "cpal-output")]
            AudioOutput::Cpal(_) => "cpal",
        }
    }
}

/// Start pulling audio from `renderer` with the configured backend
pub fn start_audio_output(renderer: AudioRenderer, config: &AudioOutputConfig) -> Result<AudioOutput> {
    let frames = config
        .buffer_frames
        .unwrap_or_else(|| renderer.preferred_buffer_frames())
        .max(1);

    match config.backend {
        AudioBackend::Headless => Ok(AudioOutput::Headless(HeadlessSink::start(renderer, frames)?)),
        #[cfg(feature = "cpal-output")]
        AudioBackend::Cpal => Ok(AudioOutput::Cpal(cpal_output::CpalSink::start(renderer, frames)?)),
        #[cfg(not(feature = "cpal-output"))]
        AudioBackend::Cpal => {
            log::warn!("[AUDIO] Built without cpal-output, falling back to headless sink");
            Ok(AudioOutput::Headless(HeadlessSink::start(renderer, frames)?))
        }
    }
}

/// Pulls one buffer per buffer period on a dedicated thread
pub struct HeadlessSink {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl HeadlessSink {
    pub fn start(mut renderer: AudioRenderer, frames: u32) -> Result<Self> {
        let format = renderer.format();
        let period = Duration::from_secs_f64(frames as f64 / format.sample_rate.max(1) as f64);
        let mut buffer = vec![0u8; frames as usize * format.bytes_per_frame()];

        log::info!(
            "[AUDIO] Headless sink: {} Hz, {} ch, {} frames (~{:.1}ms period)",
            format.sample_rate,
            format.channels,
            frames,
            period.as_secs_f64() * 1000.0
        );

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name("vsplay-audio-sink".to_string())
            .spawn(move || {
                let mut deadline = Instant::now();
                while !thread_stop.load(Ordering::Acquire) {
                    renderer.fill(&mut buffer);
                    deadline += period;
                    let now = Instant::now();
                    if deadline > now {
                        thread::sleep(deadline - now);
                    } else {
                        // Fell behind (blocked fill or slow host); don't burst
                        deadline = now;
                    }
                }
                log::debug!("[AUDIO] Headless sink stopped");
            })?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }
}

impl Drop for HeadlessSink {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("[AUDIO] Headless sink thread panicked");
            }
        }
    }
}

#[cfg(feature = "cpal-output")]
mod cpal_output {
    use anyhow::{anyhow, Context, Result};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{BufferSize, SampleRate, Stream, StreamConfig};
    use vsplay_core::playback::AudioRenderer;

    /// Keeps the CPAL stream alive
    pub struct CpalSink {
        _stream: Stream,
    }

    impl CpalSink {
        pub fn start(mut renderer: AudioRenderer, frames: u32) -> Result<Self> {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| anyhow!("No default audio output device"))?;
            let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

            let format = renderer.format();
            let config = StreamConfig {
                channels: format.channels,
                sample_rate: SampleRate(format.sample_rate),
                buffer_size: BufferSize::Fixed(frames),
            };

            log::info!(
                "[AUDIO] Using {}: {} channels, {}Hz, {} frames (~{:.1}ms latency)",
                device_name,
                config.channels,
                format.sample_rate,
                frames,
                frames as f64 / format.sample_rate.max(1) as f64 * 1000.0
            );

            let stream = device
                .build_output_stream(
                    &config,
                    move |data: &mut [i16], _info: &cpal::OutputCallbackInfo| {
                        renderer.fill_i16(data);
                    },
                    move |err| {
                        log::error!("[AUDIO] Output stream error: {}", err);
                    },
                    None,
                )
                .context("Failed to build audio output stream")?;
            stream.play().context("Failed to start audio output stream")?;

            Ok(Self { _stream: stream })
        }
    }
}
