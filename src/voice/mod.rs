//! Voice I/O module
//!
//! Capture and playback controllers over platform traits, with cpal-backed
//! microphone and speaker implementations.

mod capture;
mod microphone;
mod playback;
mod speaker;

pub use capture::{
    CaptureController, DeviceStream, InputDevice, Recorder, RecorderEvent, RecordingState,
};
pub use microphone::{Microphone, MicrophoneStream, SAMPLE_RATE, samples_to_wav};
pub use playback::{
    AudioOutput, AudioSource, EndedCallback, PlaybackController, PlaybackStatus, Sink,
};
pub use speaker::{Decoded, PLAYBACK_SAMPLE_RATE, Speaker, decode, resample};
