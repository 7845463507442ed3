use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use vynx::coordinator::{Command, Coordinator};
use vynx::voice::{CaptureAdapter, CaptureConfig, CaptureEvent, PlaybackEvent, SpeechPlayback};
use vynx::{MemoryStore, ResponseGenerator, Settings};

/// Vynx - desktop voice and text companion
#[derive(Parser)]
#[command(name = "vynx", version, about)]
struct Cli {
    /// Path to the settings file (default: ~/.config/vynx/config.json)
    #[arg(long, env = "VYNX_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable voice capture (for machines without audio hardware)
    #[arg(long, env = "VYNX_DISABLE_VOICE")]
    disable_voice: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.unwrap_or_else(Settings::default_path);
    let settings = Settings::load(&config_path)?;

    init_logging(&settings, cli.verbose)?;
    tracing::info!(
        config = %config_path.display(),
        model = %settings.model_name,
        disable_voice = cli.disable_voice,
        "starting vynx"
    );

    let memory = if settings.memory_enabled {
        Some(MemoryStore::open(Settings::data_dir().join("memory.json"))?)
    } else {
        None
    };

    let responder = Arc::new(ResponseGenerator::new(&settings));

    // Playback worker plus a forwarder marshaling its events onto the
    // coordinator channel
    let (playback_tx, mut playback_rx) = tokio::sync::mpsc::unbounded_channel();
    let playback = SpeechPlayback::spawn(
        settings.tts_voice_id.clone(),
        settings.tts_rate,
        settings.tts_volume,
        playback_tx,
    );

    // Capture thread, unless voice is disabled
    let (capture_tx, mut capture_rx) = tokio::sync::mpsc::unbounded_channel();
    let capture = if cli.disable_voice {
        None
    } else {
        let adapter = CaptureAdapter::spawn(
            CaptureConfig {
                mic_device: settings.mic_device.clone(),
                wake_word: settings.wake_word.clone(),
                language: settings.stt_language.clone(),
            },
            capture_tx,
        );
        Some(Box::new(adapter) as Box<dyn vynx::coordinator::CaptureControl>)
    };

    let (coordinator, cmd_tx, ui_rx) =
        Coordinator::new(&settings, responder, capture, Box::new(playback), memory);

    // Adapter events → coordinator commands
    let playback_cmds = cmd_tx.clone();
    tokio::spawn(async move {
        while let Some(event) = playback_rx.recv().await {
            let cmd = match event {
                PlaybackEvent::Started => Command::PlaybackStarted,
                PlaybackEvent::Finished => Command::PlaybackFinished,
            };
            if playback_cmds.send(cmd).is_err() {
                break;
            }
        }
    });
    let capture_cmds = cmd_tx.clone();
    tokio::spawn(async move {
        while let Some(event) = capture_rx.recv().await {
            let cmd = match event {
                CaptureEvent::Transcript(text) => Command::VoiceTranscript(text),
                CaptureEvent::Status(message) => Command::Status(message),
            };
            if capture_cmds.send(cmd).is_err() {
                break;
            }
        }
    });

    // OS interrupt/terminate → quit (idempotent alongside the UI's own quit)
    let signal_cmds = cmd_tx.clone();
    tokio::spawn(async move {
        let interrupted = wait_for_signal().await;
        if interrupted {
            let _ = signal_cmds.send(Command::Quit);
        }
    });

    let coordinator_task = tokio::spawn(coordinator.run());

    // The shell blocks on terminal input; give it its own thread
    let ui_cmds = cmd_tx.clone();
    let ui_task = tokio::task::spawn_blocking(move || vynx::ui::run(&ui_cmds, ui_rx));
    let ui_result = ui_task.await?;

    // The shell is gone; make sure the coordinator winds down too
    let _ = cmd_tx.send(Command::Quit);
    let _ = tokio::time::timeout(Duration::from_secs(2), coordinator_task).await;

    tracing::info!("vynx stopped");
    ui_result
}

/// Wait for SIGINT or SIGTERM; returns false if handlers cannot be installed
#[cfg(unix)]
async fn wait_for_signal() -> bool {
    use tokio::signal::unix::{SignalKind, signal};

    let Ok(mut terminate) = signal(SignalKind::terminate()) else {
        return tokio::signal::ctrl_c().await.is_ok();
    };
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.is_ok(),
        () = async { terminate.recv().await; } => true,
    }
}

/// Wait for an OS interrupt; returns false if the handler cannot be installed
#[cfg(not(unix))]
async fn wait_for_signal() -> bool {
    tokio::signal::ctrl_c().await.is_ok()
}

/// Set up logging to a file under the data directory; the terminal belongs
/// to the shell
fn init_logging(settings: &Settings, verbose: u8) -> anyhow::Result<()> {
    if !settings.logs_enabled {
        return Ok(());
    }

    let filter = match verbose {
        0 => "info,vynx=info",
        1 => "info,vynx=debug",
        2 => "debug",
        _ => "trace",
    };

    let data_dir = Settings::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(data_dir.join("vynx.log"))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(Arc::new(log_file))
        .with_ansi(false)
        .init();

    Ok(())
}
