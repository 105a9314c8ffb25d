//! Audio capture controller
//!
//! Wraps a platform microphone behind three small traits: an [`InputDevice`]
//! hands out a live [`DeviceStream`] once, the stream binds a fresh
//! [`Recorder`] per recording, and the recorder reports back through
//! [`RecorderEvent`]s. The controller turns that callback flow into one
//! awaitable [`CaptureController::start`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::gateway::AudioFile;
use crate::{Error, Result};

/// Recorder state as seen by the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Inactive,
    Recording,
}

/// Notification from an active recorder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderEvent {
    /// An encoded chunk of audio is available
    Data(Vec<u8>),
    /// The recorder finished; no further events follow
    Stopped,
}

/// Source of live microphone streams (permission prompt, device lookup)
pub trait InputDevice: Send + Sync {
    /// Acquire the device stream
    ///
    /// # Errors
    ///
    /// Returns error if no device is available or access is denied
    fn acquire(&self) -> Result<Arc<dyn DeviceStream>>;
}

/// A live device stream that recorders bind to
pub trait DeviceStream: Send + Sync {
    /// MIME type of the chunks recorders produce
    fn mime_type(&self) -> &str;

    /// Bind and start a new recorder delivering events on `events`
    ///
    /// # Errors
    ///
    /// Returns error if the recorder cannot be started
    fn record(&self, events: mpsc::UnboundedSender<RecorderEvent>) -> Result<Box<dyn Recorder>>;
}

/// An active recording
pub trait Recorder: Send {
    /// Finalize: flush pending data, then emit [`RecorderEvent::Stopped`]
    fn stop(&mut self);
}

#[derive(Default)]
struct CaptureInner {
    stream: Option<Arc<dyn DeviceStream>>,
    recorder: Option<Box<dyn Recorder>>,
}

/// Records one utterance at a time from a cached device stream
pub struct CaptureController {
    device: Arc<dyn InputDevice>,
    inner: Mutex<CaptureInner>,
    status: watch::Sender<RecordingState>,
}

impl CaptureController {
    #[must_use]
    pub fn new(device: Arc<dyn InputDevice>) -> Self {
        Self {
            device,
            inner: Mutex::new(CaptureInner::default()),
            status: watch::Sender::new(RecordingState::Inactive),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CaptureInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record until [`stop`](Self::stop) is called or `cancel` fires
    ///
    /// Resolves with every chunk concatenated into one file. Starting again
    /// while a recording is active stops the older one first.
    ///
    /// # Errors
    ///
    /// - `CaptureUnavailable` if the device cannot be acquired
    /// - `Cancelled` if `cancel` fires first; buffered audio is discarded
    /// - `NoAudioCaptured` if the recorder stopped without delivering data
    pub async fn start(&self, cancel: CancellationToken) -> Result<AudioFile> {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mime_type = {
            let mut inner = self.lock();

            let stream = if let Some(stream) = &inner.stream {
                Arc::clone(stream)
            } else {
                let stream = self.device.acquire().map_err(|e| match e {
                    Error::CaptureUnavailable(_) => e,
                    other => Error::CaptureUnavailable(other.to_string()),
                })?;
                tracing::debug!(mime_type = stream.mime_type(), "device stream acquired");
                inner.stream = Some(Arc::clone(&stream));
                stream
            };

            if let Some(mut previous) = inner.recorder.take() {
                tracing::debug!("stopping superseded recorder");
                previous.stop();
            }

            inner.recorder = Some(stream.record(tx)?);
            self.status.send_replace(RecordingState::Recording);
            stream.mime_type().to_string()
        };

        tracing::debug!("recording started");

        let mut chunks: Vec<Vec<u8>> = Vec::new();
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    chunks.clear();
                    if let Err(e) = self.stop() {
                        tracing::debug!(error = %e, "recorder already stopped at cancellation");
                    }
                    tracing::debug!("recording cancelled, buffer discarded");
                    return Err(Error::Cancelled);
                }
                event = rx.recv() => match event {
                    Some(RecorderEvent::Data(chunk)) => chunks.push(chunk),
                    Some(RecorderEvent::Stopped) | None => break,
                },
            }
        }

        if chunks.is_empty() {
            tracing::debug!("recorder stopped without data");
            return Err(Error::NoAudioCaptured);
        }

        let data = chunks.concat();
        tracing::debug!(chunks = chunks.len(), bytes = data.len(), "recording assembled");

        Ok(AudioFile::named_for(mime_type, data))
    }

    /// Finalize the active recorder
    ///
    /// # Errors
    ///
    /// Returns `CaptureUnavailable` if nothing is recording
    pub fn stop(&self) -> Result<()> {
        let mut recorder = self
            .lock()
            .recorder
            .take()
            .ok_or_else(|| Error::CaptureUnavailable("no active recorder".to_string()))?;

        recorder.stop();
        self.status.send_replace(RecordingState::Inactive);
        tracing::debug!("recording stopped");
        Ok(())
    }

    /// Drop the cached device stream, stopping any active recorder
    pub fn release(&self) {
        let (recorder, stream) = {
            let mut inner = self.lock();
            (inner.recorder.take(), inner.stream.take())
        };

        if let Some(mut recorder) = recorder {
            recorder.stop();
        }
        if stream.is_some() {
            tracing::debug!("device stream released");
        }
        self.status.send_replace(RecordingState::Inactive);
    }

    #[must_use]
    pub fn status(&self) -> RecordingState {
        *self.status.borrow()
    }

    /// Watch recorder state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RecordingState> {
        self.status.subscribe()
    }
}
