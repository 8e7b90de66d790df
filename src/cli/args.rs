//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::camera::CameraKind;

/// Live MJPEG camera server with still capture
#[derive(Parser, Debug)]
#[command(name = "booth-cam")]
#[command(version, about = "Live MJPEG camera server for a photo booth", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Address to listen on (overrides [server] bind)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Camera backend (overrides [camera] kind)
    #[arg(long, short = 'k')]
    pub camera_kind: Option<CameraKind>,

    /// Capture device index (from list-cameras)
    #[arg(long)]
    pub device: Option<u32>,

    /// Directory for captured photos
    #[arg(long)]
    pub photos_dir: Option<PathBuf>,

    /// Config file path
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List available cameras
    ListCameras,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}
