//! Microphone input through cpal

use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tokio::sync::mpsc;

use super::capture::{DeviceStream, InputDevice, Recorder, RecorderEvent};
use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// The default input device of the default host
#[derive(Debug, Default, Clone, Copy)]
pub struct Microphone;

impl InputDevice for Microphone {
    fn acquire(&self) -> Result<Arc<dyn DeviceStream>> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::CaptureUnavailable("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::CaptureUnavailable(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Arc::new(MicrophoneStream { config }))
    }
}

/// Negotiated microphone configuration; recorders open the device with it
pub struct MicrophoneStream {
    config: StreamConfig,
}

impl DeviceStream for MicrophoneStream {
    fn mime_type(&self) -> &str {
        "audio/wav"
    }

    fn record(&self, events: mpsc::UnboundedSender<RecorderEvent>) -> Result<Box<dyn Recorder>> {
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<()>>(1);
        let config = self.config.clone();

        // cpal streams are not Send on every platform, so each recording owns a thread
        std::thread::Builder::new()
            .name("parley-capture".to_string())
            .spawn(move || record_until_stopped(&config, &events, &stop_rx, &ready_tx))?;

        ready_rx
            .recv()
            .map_err(|_| Error::Audio("capture thread exited before starting".to_string()))??;

        Ok(Box::new(MicrophoneRecorder {
            stop: Some(stop_tx),
        }))
    }
}

/// Handle to a recording thread
struct MicrophoneRecorder {
    stop: Option<std_mpsc::Sender<()>>,
}

impl Recorder for MicrophoneRecorder {
    fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            // the thread also stops when the sender is dropped
            let _ = stop.send(());
        }
    }
}

fn record_until_stopped(
    config: &StreamConfig,
    events: &mpsc::UnboundedSender<RecorderEvent>,
    stop: &std_mpsc::Receiver<()>,
    ready: &std_mpsc::SyncSender<Result<()>>,
) {
    let buffer = Arc::new(Mutex::new(Vec::<f32>::new()));

    let stream = match open_stream(config, Arc::clone(&buffer)) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if ready.send(Ok(())).is_err() {
        return;
    }

    // Blocks until stop() or the recorder is dropped
    let _ = stop.recv();
    drop(stream);

    let samples = buffer
        .lock()
        .map(|mut buf| std::mem::take(&mut *buf))
        .unwrap_or_default();

    tracing::debug!(samples = samples.len(), "audio capture stopped");

    if !samples.is_empty() {
        match samples_to_wav(&samples, SAMPLE_RATE) {
            Ok(wav) => {
                let _ = events.send(RecorderEvent::Data(wav));
            }
            Err(e) => tracing::error!(error = %e, "failed to encode captured audio"),
        }
    }

    let _ = events.send(RecorderEvent::Stopped);
}

fn open_stream(config: &StreamConfig, buffer: Arc<Mutex<Vec<f32>>>) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| Error::CaptureUnavailable("no input device".to_string()))?;

    let stream = device
        .build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend_from_slice(data);
                }
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;
    tracing::debug!("audio capture started");

    Ok(stream)
}

/// Convert f32 samples to WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            // Convert f32 [-1.0, 1.0] to i16
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
