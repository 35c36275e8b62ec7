//! Record a session.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use screenrec_capture_engine::{DirectorySink, EndOutcome, ScreenRecorder};
use screenrec_common::config::{load_last_options, save_last_options, AppConfig};
use screenrec_common::RecordingOptions;
use screenrec_platform_core::CaptureHost;
use screenrec_platform_linux::LinuxHost;
use screenrec_platform_synthetic::SyntheticHost;

/// Source switches given on the command line. `None` keeps the remembered
/// value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptionOverrides {
    pub mic: Option<bool>,
    pub audio: Option<bool>,
    pub screen: Option<bool>,
    pub camera: Option<bool>,
}

impl OptionOverrides {
    /// Fold a `--x` / `--no-x` pair. clap keeps at most one of them set.
    pub fn flag(on: bool, off: bool) -> Option<bool> {
        match (on, off) {
            (true, _) => Some(true),
            (false, true) => Some(false),
            (false, false) => None,
        }
    }

    pub fn apply(&self, base: RecordingOptions) -> RecordingOptions {
        RecordingOptions {
            enable_mic: self.mic.unwrap_or(base.enable_mic),
            enable_audio: self.audio.unwrap_or(base.enable_audio),
            enable_screen: self.screen.unwrap_or(base.enable_screen),
            enable_camera: self.camera.unwrap_or(base.enable_camera),
        }
    }
}

pub struct RecordArgs {
    pub overrides: OptionOverrides,
    pub output: Option<PathBuf>,
    pub synthetic: bool,
    pub duration: Option<f64>,
    pub remember: bool,
}

pub async fn run(args: RecordArgs, config: AppConfig) -> anyhow::Result<()> {
    let options = args
        .overrides
        .apply(load_last_options().unwrap_or_default());
    if args.remember {
        if let Err(e) = save_last_options(&options) {
            tracing::warn!(error = %e, "Could not remember recording options");
        }
    }

    let output_dir = args.output.unwrap_or_else(|| config.output_dir.clone());
    let host: Arc<dyn CaptureHost> = if args.synthetic {
        Arc::new(SyntheticHost::builder().build())
    } else {
        Arc::new(LinuxHost::new(&config.recording))
    };

    println!("Starting recording");
    println!("  Host: {} ({:?})", host.name(), host.display_server());
    println!("  Output: {}", output_dir.display());
    println!("  Screen: {}", options.enable_screen);
    println!("  System audio: {}", options.enable_audio);
    println!("  Mic: {}", options.enable_mic);
    println!("  Camera: {}", options.enable_camera);
    println!();

    let recorder = ScreenRecorder::new(
        host,
        Arc::new(DirectorySink::new(&output_dir)),
        config.recording.clone(),
    );
    let handle = recorder
        .start(options)
        .await
        .context("could not start recording")?;

    println!("Recording... press Ctrl+C to stop");
    let limit = args.duration.map(Duration::from_secs_f64);
    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::warn!(error = %e, "Ctrl+C handler failed; stopping");
            }
            handle.end().await
        }
        _ = sleep_for(limit) => handle.end().await,
        outcome = handle.finished() => {
            println!("Screen sharing ended");
            outcome
        }
    };

    println!();
    match outcome {
        EndOutcome::Saved { filename, bytes } => {
            println!("Recording saved to: {} ({bytes} bytes)", output_dir.join(filename).display());
            Ok(())
        }
        EndOutcome::TooShort => Ok(()),
        other => anyhow::bail!("{other}"),
    }
}

async fn sleep_for(limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending().await,
    }
}
