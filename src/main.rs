use std::path::PathBuf;
use std::sync::Arc;

use booth_cam::cli::{self, Args, Command};
use booth_cam::config::{self, Config};
use booth_cam::server::{self, AppState};
use booth_cam::session::CameraSessionManager;
use booth_cam::shutdown;
use booth_cam::storage::PhotoStore;
use clap::Parser;
use env_logger::Env;

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();
}

/// Apply CLI overrides on top of the loaded file.
fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if let Some(kind) = args.camera_kind {
        config.camera.kind = kind;
    }
    if let Some(device) = args.device {
        config.camera.device_index = device;
    }
    if let Some(dir) = &args.photos_dir {
        config.storage.photos_dir = dir.clone();
    }
}

fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let signal = shutdown::install()?;

    let store = PhotoStore::new(config.storage.photos_dir.clone());
    store.ensure_dir_exists()?;

    let manager = Arc::new(CameraSessionManager::new(
        Arc::new(config.sources()),
        config.session(),
    ));
    let state = AppState::new(Arc::clone(&manager), store, config.camera.kind);
    log::info!(
        "Camera kind: {}, photos in {}",
        config.camera.kind,
        config.storage.photos_dir.display()
    );

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(async {
        let listener = server::bind(&config.server.bind).await?;
        let shutdown_manager = Arc::clone(&manager);
        server::serve(listener, state, async move {
            signal.wait().await;
            // Ends any live view so graceful shutdown can complete.
            let _ = tokio::task::spawn_blocking(move || shutdown_manager.stop_session()).await;
        })
        .await
    });

    manager.stop_session();
    if shutdown::shutdown_requested() {
        log::info!("Shut down on request");
    }
    result.map_err(Into::into)
}

fn main() {
    // dotenv::dotenv() returns Err if .env doesn't exist, which is fine
    let _ = dotenv::dotenv();

    let args = Args::parse();
    init_logging(args.verbose);

    let config_path: PathBuf = args.config.clone().unwrap_or_else(config::default_path);
    let mut cfg = match Config::load(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    apply_overrides(&mut cfg, &args);

    match args.command {
        Some(Command::ListCameras) => cli::list_cameras(),
        Some(Command::Config { action }) => cli::handle_config_action(action, &cfg, &config_path),
        None => {
            if let Err(e) = run(cfg) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use booth_cam::camera::CameraKind;

    #[test]
    fn test_overrides_replace_file_values() {
        let mut config = Config::default();
        let args = Args::parse_from([
            "booth-cam",
            "--bind",
            "127.0.0.1:9000",
            "--camera-kind",
            "device",
            "--device",
            "3",
            "--photos-dir",
            "/tmp/shots",
        ]);
        apply_overrides(&mut config, &args);

        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert_eq!(config.camera.kind, CameraKind::Device);
        assert_eq!(config.camera.device_index, 3);
        assert_eq!(config.storage.photos_dir, PathBuf::from("/tmp/shots"));
    }

    #[test]
    fn test_no_overrides_keep_file_values() {
        let mut config = Config::default();
        config.server.bind = "127.0.0.1:7000".to_string();
        apply_overrides(&mut config, &Args::parse_from(["booth-cam"]));
        assert_eq!(config.server.bind, "127.0.0.1:7000");
        assert_eq!(config.camera.kind, CameraKind::Process);
    }
}
