use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use parley::voice::{
    AudioSource, CaptureController, Microphone, PLAYBACK_SAMPLE_RATE, PlaybackController,
    PlaybackStatus, Speaker, samples_to_wav,
};
use parley::{
    ApiServerBuilder, Config, HttpBackend, MessageLog, Role, Session, SessionEvent, VoiceBackend,
};

/// Parley - voice chat playground
#[derive(Parser)]
#[command(name = "parley", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway (default)
    Serve {
        /// Port to listen on
        #[arg(long, env = "PARLEY_PORT")]
        port: Option<u16>,

        /// Directory holding a pre-built web UI
        #[arg(long, env = "PARLEY_STATIC_DIR")]
        static_dir: Option<PathBuf>,
    },
    /// Hold a spoken conversation through a running gateway
    Talk {
        /// Gateway base URL
        #[arg(long, env = "PARLEY_SERVER_URL")]
        server_url: Option<String>,

        /// OpenAI API key sent with each request
        #[arg(long)]
        api_key: Option<String>,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Synthesize text through a running gateway and play it
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,

        /// Gateway base URL
        #[arg(long, env = "PARLEY_SERVER_URL")]
        server_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,parley=info",
        1 => "info,parley=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;
    tracing::debug!(?config.server, ?config.client.server_url, "loaded configuration");

    match cli.command.unwrap_or(Command::Serve {
        port: None,
        static_dir: None,
    }) {
        Command::Serve { port, static_dir } => serve(&config, port, static_dir).await,
        Command::Talk {
            server_url,
            api_key,
        } => talk(&config, server_url, api_key).await,
        Command::TestMic { duration } => test_mic(duration).await,
        Command::TestSpeaker => test_speaker().await,
        Command::TestTts { text, server_url } => test_tts(&config, server_url, &text).await,
    }
}

async fn serve(
    config: &Config,
    port: Option<u16>,
    static_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut builder = ApiServerBuilder::new(config);
    if let Some(port) = port {
        builder = builder.port(port);
    }
    if static_dir.is_some() {
        builder = builder.static_dir(static_dir);
    }

    tracing::info!(
        chat_model = %config.openai.chat_model,
        stt_model = %config.openai.stt_model,
        tts_model = %config.openai.tts_model,
        "starting parley gateway"
    );

    builder.build().run().await?;
    Ok(())
}

/// Interactive voice session on the local microphone and speaker
async fn talk(
    config: &Config,
    server_url: Option<String>,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let server_url = server_url.unwrap_or_else(|| config.client.server_url.clone());
    let backend: Arc<dyn VoiceBackend> = Arc::new(HttpBackend::new(&server_url));

    let capture = CaptureController::new(Arc::new(Microphone));
    let playback = PlaybackController::new(Arc::new(Speaker::new()?));

    let credential = api_key.or_else(|| config.client.api_key.clone());
    let (session, reactions) = Session::spawn(backend, capture, playback, credential);

    let mut events = session.events();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SessionEvent::MessageAppended(message) => {
                    println!("{}: {}", message.role, message.content);
                }
                SessionEvent::PlaybackStarted { .. } => println!("(speaking)"),
                SessionEvent::Failed { stage, error } => {
                    println!("! {stage:?} failed: {error}");
                }
            }
        }
    });

    println!("Connected to {server_url}");
    println!(
        "Enter: start/stop recording | key <sk-...>: set API key | log: show transcript | q: quit\n"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();

        if line == "q" || line == "quit" {
            break;
        }
        if let Some(key) = line.strip_prefix("key ") {
            session.set_credential(Some(key.trim().to_string()));
            println!("API key updated");
            continue;
        }
        if line == "log" {
            print_log(&session.log());
            continue;
        }

        let recording = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.record_turn(CancellationToken::new()).await }
        });

        println!("Recording... press Enter to stop");
        if lines.next_line().await?.is_none() {
            recording.abort();
            break;
        }

        if let Err(e) = session.stop_recording() {
            println!("! {e}");
        }

        match recording.await? {
            Ok(_) => {
                let mut loading = session.subscribe_loading();
                loading.wait_for(|l| !l).await?;

                let mut status = session.playback().subscribe();
                status.wait_for(|s| *s == PlaybackStatus::Inactive).await?;
            }
            Err(e) => println!("! {e}"),
        }
    }

    session.shutdown();
    reactions.await?;
    printer.abort();

    let log = session.log();
    let turns = log.messages().iter().filter(|m| m.role != Role::System).count();
    println!("\nSession ended after {turns} turns");

    Ok(())
}

fn print_log(log: &MessageLog) {
    if log.is_empty() {
        println!("(no messages yet)");
    } else {
        println!("{}", log.transcript());
    }
}

/// Test microphone input
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let capture = Arc::new(CaptureController::new(Arc::new(Microphone)));

    let recording = tokio::spawn({
        let capture = Arc::clone(&capture);
        async move { capture.start(CancellationToken::new()).await }
    });

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;
        println!("[{:2}s] recording...", i + 1);
    }

    capture.stop()?;
    let file = recording.await??;

    let decoded = parley::voice::decode(&AudioSource::new(&file.mime_type, file.data))?;
    let energy = calculate_rms(&decoded.samples);
    let peak = decoded.samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

    println!("---");
    println!(
        "Captured {} samples at {} Hz | RMS: {energy:.4} | Peak: {peak:.4}",
        decoded.samples.len(),
        decoded.sample_rate
    );

    println!("\nIf RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");
    println!("  4. Try: pavucontrol (to check levels)");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (PLAYBACK_SAMPLE_RATE as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / PLAYBACK_SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {PLAYBACK_SAMPLE_RATE} Hz...", samples.len());

    let wav = samples_to_wav(&samples, PLAYBACK_SAMPLE_RATE)?;
    play_to_end(AudioSource::new("audio/wav", wav)).await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Test TTS output via the gateway
async fn test_tts(config: &Config, server_url: Option<String>, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let server_url = server_url.unwrap_or_else(|| config.client.server_url.clone());
    let backend = HttpBackend::new(server_url);

    println!("Synthesizing speech...");
    let source = backend.speak(text, config.client.api_key.as_deref()).await?;
    println!("Got {} bytes of {}", source.data.len(), source.content_type);

    println!("Playing audio...");
    play_to_end(source).await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}

async fn play_to_end(source: AudioSource) -> anyhow::Result<()> {
    let playback = PlaybackController::new(Arc::new(Speaker::new()?));
    let mut status = playback.subscribe();

    playback.start(source)?;
    status.wait_for(|s| *s == PlaybackStatus::Inactive).await?;

    Ok(())
}
