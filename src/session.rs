//! Voice session orchestration
//!
//! A session chains two reactions through the message log: a new `human`
//! turn asks the conversation backend for a reply, and a new `ai` turn is
//! synthesized and played. Reactions are driven by log change notifications,
//! and each one owns a cancellation token that the next change cancels, so a
//! stale response never lands on a newer log.
//!
//! ```text
//!  record_turn ──► transcribe ──► log += human
//!                                    │
//!                       ┌────────────┘
//!                       ▼
//!               reply(full log) ──► log += ai
//!                                       │
//!                       ┌───────────────┘
//!                       ▼
//!               speak(ai content) ──► playback ──► loading = false
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::gateway::AudioFile;
use crate::message::{Message, MessageLog, Role};
use crate::voice::{AudioSource, CaptureController, PlaybackController, PlaybackStatus};
use crate::{Error, Result};

/// Capacity of the session event channel
const EVENT_CAPACITY: usize = 64;

/// The three calls a session makes for each turn
#[async_trait]
pub trait VoiceBackend: Send + Sync {
    /// Turn recorded audio into text
    async fn transcribe(&self, audio: AudioFile, credential: Option<&str>) -> Result<String>;

    /// Answer the newest message of `messages`
    async fn reply(&self, messages: &[Message], credential: Option<&str>) -> Result<String>;

    /// Turn text into playable audio
    async fn speak(&self, content: &str, credential: Option<&str>) -> Result<AudioSource>;
}

/// Which step of a turn an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Transcription,
    Conversation,
    Synthesis,
    Playback,
}

/// Where the session is in the reply pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingReply,
    AwaitingSpeech,
}

/// Notifications for a front end
#[derive(Debug, Clone)]
pub enum SessionEvent {
    MessageAppended(Message),
    PlaybackStarted { message_id: String },
    Failed { stage: Stage, error: String },
}

/// One voice conversation: the log, the devices, and the reactions between them
pub struct Session {
    backend: Arc<dyn VoiceBackend>,
    capture: CaptureController,
    playback: PlaybackController,
    log: watch::Sender<MessageLog>,
    loading: watch::Sender<bool>,
    phase: watch::Sender<Phase>,
    credential: watch::Sender<Option<String>>,
    events: broadcast::Sender<SessionEvent>,
    shutdown: CancellationToken,
    /// Set while a `record_turn` call owns the microphone
    turn: AtomicBool,
}

/// Releases the turn claim when `record_turn` returns
struct TurnClaim<'a>(&'a AtomicBool);

impl Drop for TurnClaim<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Session {
    /// Create a session and start reacting to log changes
    ///
    /// Must be called within a Tokio runtime.
    pub fn spawn(
        backend: Arc<dyn VoiceBackend>,
        capture: CaptureController,
        playback: PlaybackController,
        credential: Option<String>,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let session = Arc::new(Self {
            backend,
            capture,
            playback,
            log: watch::Sender::new(MessageLog::new()),
            loading: watch::Sender::new(false),
            phase: watch::Sender::new(Phase::Idle),
            credential: watch::Sender::new(credential),
            events,
            shutdown: CancellationToken::new(),
            turn: AtomicBool::new(false),
        });

        let log_rx = session.log.subscribe();
        let handle = tokio::spawn(Arc::clone(&session).react(log_rx));

        (session, handle)
    }

    /// Record one utterance and append its transcript as a `human` turn
    ///
    /// Recording ends when [`stop_recording`](Self::stop_recording) is called.
    /// The loading indicator is raised once audio is captured and stays up
    /// until the spoken reply starts playing or a step fails.
    ///
    /// # Errors
    ///
    /// - `Busy` while audio plays, a previous turn is in flight, or another
    ///   call is already recording
    /// - capture errors (`CaptureUnavailable`, `Cancelled`, `NoAudioCaptured`)
    /// - transcription backend errors
    pub async fn record_turn(&self, cancel: CancellationToken) -> Result<Message> {
        if self.playback.status() == PlaybackStatus::Playing {
            return Err(Error::Busy("audio is playing"));
        }
        if *self.loading.borrow() {
            return Err(Error::Busy("a turn is in progress"));
        }
        if self.turn.swap(true, Ordering::SeqCst) {
            return Err(Error::Busy("already recording"));
        }
        let _claim = TurnClaim(&self.turn);

        let token = self.shutdown.child_token();
        let capture = self.capture.start(token.clone());
        tokio::pin!(capture);

        let file = tokio::select! {
            result = &mut capture => result,
            () = cancel.cancelled() => {
                token.cancel();
                capture.await
            }
        }?;

        self.loading.send_replace(true);
        let credential = self.current_credential();

        let transcript = tokio::select! {
            () = self.shutdown.cancelled() => Err(Error::Cancelled),
            result = self.backend.transcribe(file, credential.as_deref()) => result,
        };

        match transcript {
            Ok(text) => Ok(self.append(Role::Human, text)),
            Err(e) => {
                self.fail(Stage::Transcription, &e);
                Err(e)
            }
        }
    }

    /// Finish the recording started by [`record_turn`](Self::record_turn)
    ///
    /// # Errors
    ///
    /// Returns `CaptureUnavailable` if nothing is recording
    pub fn stop_recording(&self) -> Result<()> {
        self.capture.stop()
    }

    /// Stop the spoken reply
    ///
    /// # Errors
    ///
    /// Returns `PlaybackUnavailable` if nothing is playing
    pub fn stop_playback(&self) -> Result<()> {
        self.playback.stop()
    }

    /// Append seed context; system turns trigger no reaction
    pub fn seed_system(&self, content: impl Into<String>) -> Message {
        self.append(Role::System, content.into())
    }

    /// Replace the per-user credential used by subsequent calls
    pub fn set_credential(&self, credential: Option<String>) {
        self.credential
            .send_replace(credential.filter(|c| !c.is_empty()));
    }

    /// Snapshot of the log
    #[must_use]
    pub fn log(&self) -> MessageLog {
        self.log.borrow().clone()
    }

    /// Watch the log
    #[must_use]
    pub fn subscribe_log(&self) -> watch::Receiver<MessageLog> {
        self.log.subscribe()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    /// Watch the loading indicator
    #[must_use]
    pub fn subscribe_loading(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Receive session events from now on
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub const fn capture(&self) -> &CaptureController {
        &self.capture
    }

    #[must_use]
    pub const fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    /// Cancel everything in flight and release the devices
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.capture.release();
        if self.playback.stop().is_ok() {
            tracing::debug!("playback stopped at shutdown");
        }
        self.loading.send_replace(false);
        self.phase.send_replace(Phase::Idle);
    }

    fn current_credential(&self) -> Option<String> {
        self.credential.borrow().clone()
    }

    fn append(&self, role: Role, content: String) -> Message {
        let mut message = Message::new(role, content);
        self.log.send_modify(|log| log.push(&mut message));

        tracing::debug!(id = %message.id, role = %message.role, "message appended");
        let _ = self
            .events
            .send(SessionEvent::MessageAppended(message.clone()));

        message
    }

    fn fail(&self, stage: Stage, error: &Error) {
        tracing::warn!(?stage, error = %error, "voice turn failed");

        self.loading.send_replace(false);
        self.phase.send_replace(Phase::Idle);
        let _ = self.events.send(SessionEvent::Failed {
            stage,
            error: error.to_string(),
        });
    }

    /// React to each log change until shutdown
    async fn react(self: Arc<Self>, mut log_rx: watch::Receiver<MessageLog>) {
        let mut inflight: Option<CancellationToken> = None;

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                changed = log_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            if let Some(previous) = inflight.take() {
                previous.cancel();
            }

            let log = log_rx.borrow_and_update().clone();
            let Some(last) = log.last().cloned() else {
                continue;
            };

            let token = self.shutdown.child_token();
            match last.role {
                Role::Human => {
                    self.phase.send_replace(Phase::AwaitingReply);
                    inflight = Some(token.clone());
                    tokio::spawn(Arc::clone(&self).reply(log, token));
                }
                Role::Ai => {
                    self.phase.send_replace(Phase::AwaitingSpeech);
                    inflight = Some(token.clone());
                    tokio::spawn(Arc::clone(&self).speak(last, token));
                }
                Role::System => {
                    // A reply or speech cut off here has no follow-up
                    if self.phase() != Phase::Idle {
                        tracing::debug!(phase = ?self.phase(), "turn superseded by system entry");
                        self.loading.send_replace(false);
                        self.phase.send_replace(Phase::Idle);
                    }
                }
            }
        }

        tracing::debug!("session reactions stopped");
    }

    async fn reply(self: Arc<Self>, log: MessageLog, cancel: CancellationToken) {
        let credential = self.current_credential();

        let result = tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!(version = log.version(), "stale reply discarded");
                return;
            }
            result = self.backend.reply(log.messages(), credential.as_deref()) => result,
        };

        if cancel.is_cancelled() {
            return;
        }

        match result {
            Ok(answer) => {
                self.append(Role::Ai, answer);
            }
            Err(e) => self.fail(Stage::Conversation, &e),
        }
    }

    async fn speak(self: Arc<Self>, message: Message, cancel: CancellationToken) {
        let credential = self.current_credential();

        let result = tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!(id = %message.id, "stale speech discarded");
                return;
            }
            result = self.backend.speak(&message.content, credential.as_deref()) => result,
        };

        if cancel.is_cancelled() {
            return;
        }

        let source = match result {
            Ok(source) => source,
            Err(e) => return self.fail(Stage::Synthesis, &e),
        };

        if let Err(e) = self.playback.start(source) {
            return self.fail(Stage::Playback, &e);
        }

        self.loading.send_replace(false);
        self.phase.send_replace(Phase::Idle);
        let _ = self.events.send(SessionEvent::PlaybackStarted {
            message_id: message.id,
        });
    }
}
