//! Audio playback controller
//!
//! At most one sink plays at a time; starting a new one pauses and drops the
//! previous. Natural end of audio runs the same teardown as [`PlaybackController::stop`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::watch;

use crate::{Error, Result};

/// Playback state as seen by the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Inactive,
    Playing,
}

/// Encoded audio held in memory, addressed by its content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSource {
    pub content_type: String,
    pub data: Vec<u8>,
}

impl AudioSource {
    #[must_use]
    pub fn new(content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            content_type: content_type.into(),
            data,
        }
    }
}

/// Invoked once when a sink reaches the end of its audio
pub type EndedCallback = Box<dyn FnOnce() + Send>;

/// Platform audio output
pub trait AudioOutput: Send + Sync {
    /// Begin playing `source` on a new sink
    ///
    /// `on_ended` must be invoked from another thread or task after this
    /// call returns, and never for a sink that was paused.
    ///
    /// # Errors
    ///
    /// Returns error if the audio cannot be decoded or the device cannot be opened
    fn play(&self, source: AudioSource, on_ended: EndedCallback) -> Result<Box<dyn Sink>>;
}

/// A playing audio sink
pub trait Sink: Send {
    /// Halt output; the sink will not report an end afterwards
    fn pause(&mut self);
}

#[derive(Default)]
struct PlaybackInner {
    sink: Option<Box<dyn Sink>>,
    generation: u64,
}

struct Shared {
    inner: Mutex<PlaybackInner>,
    status: watch::Sender<PlaybackStatus>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PlaybackInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// End-of-audio teardown for the sink started as `generation`
    fn finish(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation != generation {
            return;
        }

        if let Some(mut sink) = inner.sink.take() {
            sink.pause();
            self.status.send_replace(PlaybackStatus::Inactive);
            tracing::debug!(generation, "playback ended");
        }
    }
}

/// Plays one audio resource at a time
pub struct PlaybackController {
    output: Arc<dyn AudioOutput>,
    shared: Arc<Shared>,
}

impl PlaybackController {
    #[must_use]
    pub fn new(output: Arc<dyn AudioOutput>) -> Self {
        Self {
            output,
            shared: Arc::new(Shared {
                inner: Mutex::new(PlaybackInner::default()),
                status: watch::Sender::new(PlaybackStatus::Inactive),
            }),
        }
    }

    /// Play `source`, replacing whatever is playing
    ///
    /// # Errors
    ///
    /// Returns error if the output cannot play the source; status is then `Inactive`
    pub fn start(&self, source: AudioSource) -> Result<()> {
        let mut inner = self.shared.lock();

        if let Some(mut previous) = inner.sink.take() {
            previous.pause();
            tracing::debug!(generation = inner.generation, "previous playback discarded");
        }

        inner.generation += 1;
        let generation = inner.generation;

        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        let on_ended: EndedCallback = Box::new(move || {
            if let Some(shared) = shared.upgrade() {
                shared.finish(generation);
            }
        });

        tracing::debug!(
            generation,
            content_type = %source.content_type,
            bytes = source.data.len(),
            "starting playback"
        );

        match self.output.play(source, on_ended) {
            Ok(sink) => {
                inner.sink = Some(sink);
                self.shared.status.send_replace(PlaybackStatus::Playing);
                Ok(())
            }
            Err(e) => {
                self.shared.status.send_replace(PlaybackStatus::Inactive);
                Err(e)
            }
        }
    }

    /// Pause and release the current sink
    ///
    /// # Errors
    ///
    /// Returns `PlaybackUnavailable` if nothing is playing
    pub fn stop(&self) -> Result<()> {
        let mut inner = self.shared.lock();
        let mut sink = inner.sink.take().ok_or(Error::PlaybackUnavailable)?;

        sink.pause();
        self.shared.status.send_replace(PlaybackStatus::Inactive);
        tracing::debug!(generation = inner.generation, "playback stopped");
        Ok(())
    }

    #[must_use]
    pub fn status(&self) -> PlaybackStatus {
        *self.shared.status.borrow()
    }

    /// Watch playback state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PlaybackStatus> {
        self.shared.status.subscribe()
    }
}
