use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "scormcast")]
#[command(author, version, about = "Play a SCORM package headlessly and record it to video")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Play a package in a browser and record it to a video file
    Record {
        /// SCORM package (.zip)
        #[arg(required = true)]
        package: PathBuf,

        /// Directory the recording is saved to
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Start of the kept window, in seconds
        #[arg(long)]
        trim_start: Option<f64>,

        /// End of the kept window, in seconds
        #[arg(long)]
        trim_end: Option<f64>,

        /// Save the raw MJPEG capture without transcoding
        #[arg(long)]
        raw_only: bool,

        /// Connect to an already running browser instead of launching one
        #[arg(long)]
        devtools_url: Option<String>,

        /// Show the browser window
        #[arg(long)]
        headed: bool,
    },

    /// Show the items and entry points of a package
    Inspect {
        /// SCORM package (.zip)
        #[arg(required = true)]
        package: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Serve a package for playback in your own browser
    Serve {
        /// SCORM package (.zip)
        #[arg(required = true)]
        package: PathBuf,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
