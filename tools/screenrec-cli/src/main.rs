//! screenrec CLI: record the screen, camera and audio into a WebM file.
//!
//! Usage:
//!   screenrec record [OPTIONS]    Record until Ctrl+C or until sharing stops
//!   screenrec check               Check system capabilities

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

use commands::record::{OptionOverrides, RecordArgs};

#[derive(Parser)]
#[command(
    name = "screenrec",
    about = "Local screen recorder with camera inset and mixed audio",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record until Ctrl+C, --duration, or the screen share ending
    Record {
        /// Record the microphone
        #[arg(long, overrides_with = "no_mic")]
        mic: bool,
        /// Do not record the microphone
        #[arg(long)]
        no_mic: bool,

        /// Record system/tab audio
        #[arg(long, overrides_with = "no_audio")]
        audio: bool,
        /// Do not record system/tab audio
        #[arg(long)]
        no_audio: bool,

        /// Record the screen
        #[arg(long, overrides_with = "no_screen")]
        screen: bool,
        /// Do not record the screen
        #[arg(long)]
        no_screen: bool,

        /// Add the camera inset
        #[arg(long, overrides_with = "no_camera")]
        camera: bool,
        /// Leave the camera out
        #[arg(long)]
        no_camera: bool,

        /// Directory the recording is saved into
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Record test patterns and tones instead of real devices
        #[arg(long)]
        synthetic: bool,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<f64>,

        /// Remember the chosen sources for next time
        #[arg(long)]
        remember: bool,
    },

    /// Check system capabilities
    Check {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = screenrec_common::config::AppConfig::load();
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    screenrec_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Record {
            mic,
            no_mic,
            audio,
            no_audio,
            screen,
            no_screen,
            camera,
            no_camera,
            output,
            synthetic,
            duration,
            remember,
        } => {
            let args = RecordArgs {
                overrides: OptionOverrides {
                    mic: OptionOverrides::flag(mic, no_mic),
                    audio: OptionOverrides::flag(audio, no_audio),
                    screen: OptionOverrides::flag(screen, no_screen),
                    camera: OptionOverrides::flag(camera, no_camera),
                },
                output,
                synthetic,
                duration,
                remember,
            };
            commands::record::run(args, config).await
        }
        Commands::Check { json } => commands::check::run(json),
    }
}
