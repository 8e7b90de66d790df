//! Subcommand handlers for list-cameras and config actions.

use std::io;
use std::path::Path;

use super::args::ConfigAction;
use crate::camera;
use crate::config::Config;

/// List available cameras and print them to stdout.
pub fn list_cameras() {
    let devices = camera::list_devices();
    if devices.is_empty() {
        println!("No cameras found.");
        println!();
        println!("Make sure the camera is connected and the user is in the 'video' group.");
        println!("CSI cameras are driven through rpicam-vid and need no device node.");
    } else {
        println!("Available cameras:");
        for device in devices {
            println!("  {}", device);
        }
        println!();
        println!("Use --camera-kind device --device <index> to select a camera.");
    }
}

/// Handle config subcommand actions.
///
/// `config` is the effective configuration, `config_path` the file it was
/// loaded from (or would be).
pub fn handle_config_action(action: ConfigAction, config: &Config, config_path: &Path) {
    match action {
        ConfigAction::Show => {
            println!("Current configuration:");
            println!();
            print!("{}", config.to_toml());
            println!();

            if config_path.exists() {
                println!("Config file: {} (exists)", config_path.display());
            } else {
                println!("Config file: {} (not found)", config_path.display());
            }
        }
        ConfigAction::Init => match init_config(config_path) {
            Ok(()) => println!("Created config file: {}", config_path.display()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                eprintln!("Config file already exists: {}", config_path.display());
                eprintln!("Use 'booth-cam config show' to view current settings.");
                std::process::exit(1);
            }
            Err(e) => {
                eprintln!("Error writing config file: {}", e);
                std::process::exit(1);
            }
        },
    }
}

/// Write the default configuration to `path`, creating parent directories.
///
/// Refuses to overwrite an existing file.
pub fn init_config(path: &Path) -> io::Result<()> {
    if path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", path.display()),
        ));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = format!(
        "# booth-cam configuration\n# camera.kind: \"process\" (rpicam-vid) or \"device\" (V4L2)\n\n{}",
        Config::default().to_toml()
    );
    std::fs::write(path, contents)
}
