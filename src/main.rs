use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use estimate_voice::tools::{FunctionDeclaration, ToolDeclarations};
use estimate_voice::voice::{
    CapturePipeline, CommandSpeech, CpalInput, CpalOutput, PLAYBACK_SAMPLE_RATE, PlaybackEngine,
    SilentSpeech, sample_to_pcm16,
};
use estimate_voice::{
    Config, HttpBackend, Role, SessionController, ToolAction, ToolName, ToolRegistry,
};

/// Upper bound on waiting for a reply to finish playing before exit
const PLAYBACK_WAIT: Duration = Duration::from_secs(60);

/// Estimate Voice - talk to the estimating assistant from the terminal
#[derive(Parser)]
#[command(name = "estimate-voice", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Send one typed message and print the conversation
    Chat {
        /// Message text
        text: String,
    },
    /// Record one voice turn and print the conversation
    Talk {
        /// Recording length in seconds
        #[arg(short, long, default_value = "5")]
        seconds: u64,
    },
    /// Print the tool declarations sent to the backend
    Tools,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,estimate_voice=info",
        1 => "info,estimate_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
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
    match cli.command {
        Command::TestMic { duration } => test_mic(duration).await,
        Command::TestSpeaker => test_speaker().await,
        Command::Chat { text } => chat(&text).await,
        Command::Talk { seconds } => talk(seconds).await,
        Command::Tools => print_tools(),
    }
}

/// Build a session wired to the real audio devices and HTTP backend
fn build_session(config: &Config) -> anyhow::Result<SessionController> {
    let capture = CapturePipeline::new(Box::new(CpalInput), config.audio.capture_sample_rate);
    let speech = CommandSpeech::detect_or_silent(
        config.speech.program.as_deref(),
        &config.speech.language,
    );
    let playback = PlaybackEngine::new(Box::new(CpalOutput), speech, config.audio.output_volume);
    let backend = Arc::new(HttpBackend::new(&config.backend)?);

    Ok(SessionController::new(
        config.session.clone(),
        capture,
        playback,
        backend,
        terminal_tools(),
    )
    .with_instructions(|| {
        "You are a helpful assistant for a UK construction business. Keep replies short."
            .to_string()
    }))
}

/// Capabilities available without the full application
fn terminal_tools() -> ToolRegistry {
    ToolRegistry::new()
        .with(ToolName::ListCapabilities, |_: ToolAction| async {
            let names: Vec<&str> = [ToolName::ListCapabilities, ToolName::NavigateToView]
                .iter()
                .map(|tool| tool.description())
                .collect();
            anyhow::Ok(format!("Here are some things I can do: {}", names.join(" ")))
        })
        .with(ToolName::NavigateToView, |action: ToolAction| async move {
            let ToolAction::NavigateToView(args) = action else {
                anyhow::bail!("unexpected action for navigateToView");
            };
            println!("-> navigate to {:?}", args.view);
            Ok(format!("Navigated to {:?}.", args.view))
        })
}

fn print_transcript(session: &SessionController) {
    for message in session.transcript() {
        let who = match message.role {
            Role::User => "you",
            Role::Assistant => "assistant",
            Role::System => "system",
        };
        println!("[{who}] {}", message.text);
    }
}

/// Let a spoken reply finish before the session (and its audio) is dropped
async fn wait_for_playback(session: &SessionController) {
    let deadline = tokio::time::Instant::now() + PLAYBACK_WAIT;
    while session.playback().is_busy() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

async fn chat(text: &str) -> anyhow::Result<()> {
    let config = Config::load()?;
    let session = build_session(&config)?;

    session.send_text_message(text).await?;
    print_transcript(&session);
    wait_for_playback(&session).await;

    if let Some(error) = session.status().last_error {
        anyhow::bail!(error);
    }
    Ok(())
}

async fn talk(seconds: u64) -> anyhow::Result<()> {
    let config = Config::load()?;
    let session = build_session(&config)?;

    session.start_session()?;
    println!("Recording for {seconds} seconds, speak now...");
    tokio::time::sleep(Duration::from_secs(seconds)).await;

    println!("Sending...");
    session.stop_session().await?;
    print_transcript(&session);
    wait_for_playback(&session).await;

    if let Some(error) = session.status().last_error {
        anyhow::bail!(error);
    }
    Ok(())
}

fn print_tools() -> anyhow::Result<()> {
    let declarations = ToolDeclarations {
        function_declarations: ToolName::ALL
            .iter()
            .copied()
            .map(FunctionDeclaration::from)
            .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&[declarations])?);
    Ok(())
}

async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let config = Config::load()?;
    let capture = CapturePipeline::new(Box::new(CpalInput), config.audio.capture_sample_rate);
    let sample_rate = capture.open()?;
    println!("Sample rate: {sample_rate} Hz");
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples: Vec<f32> = capture
            .take_chunks()
            .iter()
            .flat_map(|chunk| chunk.samples().iter().copied())
            .collect();
        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.close();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: arecord -l (to list devices)");
    println!("  3. Try: pavucontrol (to check levels)");

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

/// Test speaker output with a sine wave through the playback engine
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let config = Config::load()?;
    let playback = PlaybackEngine::new(
        Box::new(CpalOutput),
        Box::new(SilentSpeech),
        config.audio.output_volume,
    );

    let frequency = 440.0_f32;
    let num_samples = PLAYBACK_SAMPLE_RATE as usize * 2;

    #[allow(clippy::cast_precision_loss)]
    let pcm: Vec<u8> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / PLAYBACK_SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .flat_map(|sample| sample_to_pcm16(sample).to_le_bytes())
        .collect();

    println!("Playing {num_samples} samples at {PLAYBACK_SAMPLE_RATE} Hz...");
    playback.play_pcm(&pcm)?;

    while playback.active_sources() > 0 {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    playback.close();

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}
