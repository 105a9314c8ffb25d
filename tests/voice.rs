//! Voice pipeline integration tests
//!
//! Tests voice components without requiring audio hardware

use std::io::Cursor;

use parley::voice::{
    AudioSource, PLAYBACK_SAMPLE_RATE, PlaybackStatus, RecordingState, SAMPLE_RATE, decode,
    resample, samples_to_wav,
};
use parley::{Error, gateway::extension_for};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

mod common;
use common::{WAIT, fake_devices};

/// Generate sine wave audio samples
fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

fn rms(samples: &[f32]) -> f32 {
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

#[test]
fn test_samples_to_wav() {
    let samples = generate_sine_samples(440.0, 0.1, 0.5);
    let wav_data = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    // Check WAV header magic
    assert_eq!(&wav_data[0..4], b"RIFF");
    assert_eq!(&wav_data[8..12], b"WAVE");

    // 44 byte header plus two bytes per sample
    assert_eq!(wav_data.len(), 44 + samples.len() * 2);
}

#[test]
fn test_wav_spec() {
    let wav_data = samples_to_wav(&[0.0, 0.5, -0.5, 1.0, -1.0, 0.25], SAMPLE_RATE).unwrap();

    let reader = hound::WavReader::new(Cursor::new(wav_data)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);
}

#[test]
fn test_decoded_tone_keeps_energy() {
    let samples = generate_sine_samples(440.0, 0.5, 0.5);
    let wav_data = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    let decoded = decode(&AudioSource::new("audio/wav", wav_data)).unwrap();
    assert_eq!(decoded.sample_rate, SAMPLE_RATE);
    assert_eq!(decoded.samples.len(), samples.len());

    // A sine of amplitude A has RMS A/sqrt(2)
    assert!((rms(&decoded.samples) - 0.5 / 2f32.sqrt()).abs() < 0.01);
}

#[test]
fn test_resample_capture_rate_to_playback_rate() {
    let samples = generate_sine_samples(440.0, 1.0, 0.3);
    let out = resample(&samples, SAMPLE_RATE, PLAYBACK_SAMPLE_RATE).unwrap();

    assert_eq!(out.len(), PLAYBACK_SAMPLE_RATE as usize);
    assert!((rms(&out) - rms(&samples)).abs() < 0.01);
}

#[test]
fn test_mime_type_extensions() {
    assert_eq!(extension_for("audio/webm;codecs=opus"), "webm");
    assert_eq!(extension_for("audio/wav"), "wav");
    assert_eq!(extension_for("audio/mpeg"), "mp3");
}

#[test]
fn test_invalid_mp3_yields_no_samples_or_error() {
    match decode(&AudioSource::new("audio/mpeg", vec![0u8; 64])) {
        Ok(decoded) => assert!(decoded.samples.is_empty()),
        Err(e) => assert!(matches!(e, Error::Audio(_))),
    }
}

#[tokio::test]
async fn test_capture_reuses_device_stream() {
    let (capture, _playback, _speaker) = fake_devices(b"abc");

    for _ in 0..2 {
        let recording = capture.start(CancellationToken::new());
        tokio::pin!(recording);

        let mut status = capture.subscribe();
        tokio::select! {
            _ = &mut recording => panic!("recording ended before stop"),
            changed = status.wait_for(|s| *s == RecordingState::Recording) => {
                changed.unwrap();
            }
        }

        capture.stop().unwrap();
        let file = timeout(WAIT, recording).await.unwrap().unwrap();
        assert_eq!(file.data, b"abc");
        assert_eq!(file.name, "speech.webm");
    }

    // Nothing left to stop
    assert!(matches!(capture.stop(), Err(Error::CaptureUnavailable(_))));
}

#[test]
fn test_playback_replaces_previous_sink() {
    let (_capture, playback, speaker) = fake_devices(b"");

    playback
        .start(AudioSource::new("audio/mpeg", b"first".to_vec()))
        .unwrap();
    playback
        .start(AudioSource::new("audio/mpeg", b"second".to_vec()))
        .unwrap();
    assert_eq!(playback.status(), PlaybackStatus::Playing);
    assert_eq!(speaker.played().len(), 2);

    // Only the newest sink's end tears playback down
    speaker.finish_latest();
    assert_eq!(playback.status(), PlaybackStatus::Inactive);

    speaker.finish_latest();
    assert_eq!(playback.status(), PlaybackStatus::Inactive);
}
