//! Shortcraft CLI: build, preview, and export short-form video projects.
//!
//! Usage:
//!   shortcraft init <NAME>                 Create a new project file
//!   shortcraft add <PROJECT> [MEDIA]       Add images/audio and build clips
//!   shortcraft info <PROJECT>              Show clips and durations
//!   shortcraft frame <PROJECT> --time T    Render the preview frame at T
//!   shortcraft export <PROJECT>            Render the project to MP4
//!   shortcraft check                       Check encoder and font availability

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use shortcraft_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "shortcraft",
    about = "Compose image + audio clips into short-form videos",
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
    /// Create a new empty project
    Init {
        /// Project name
        name: String,

        /// Directory to create the project in
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Add media files; clips are created for new audio
    Add {
        /// Project file or directory
        project: PathBuf,

        /// Image files
        #[arg(long, num_args = 1..)]
        images: Vec<PathBuf>,

        /// Audio files
        #[arg(long, num_args = 1..)]
        audio: Vec<PathBuf>,
    },

    /// Show project information
    Info {
        /// Project file or directory
        project: PathBuf,
    },

    /// Render the preview frame at a timeline position
    Frame {
        /// Project file or directory
        project: PathBuf,

        /// Position in seconds
        #[arg(short, long, default_value = "0")]
        time: f64,

        /// Output PNG path
        #[arg(short, long, default_value = "frame.png")]
        output: PathBuf,
    },

    /// Export the project to MP4
    Export {
        /// Project file or directory
        project: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check system capabilities
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load();
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    shortcraft_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Init { name, output } => commands::init::run(name, output),
        Commands::Add {
            project,
            images,
            audio,
        } => commands::add::run(project, images, audio).await,
        Commands::Info { project } => commands::info::run(project),
        Commands::Frame {
            project,
            time,
            output,
        } => commands::frame::run(&config, project, time, output).await,
        Commands::Export { project, output } => {
            commands::export::run(&config, project, output).await
        }
        Commands::Check => commands::check::run(&config),
    }
}
