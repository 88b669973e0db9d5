use backup_protocol::config::{BackupConfig, ENV_CONFIG_PATH};
use backup_protocol::error::Result;
use backup_protocol::transport::tcp;
use backup_protocol::utils::logging::init_logging;
use std::process::ExitCode;
use tracing::{error, info};

/// Config file from the first argument or `BACKUP_SERVER_CONFIG`, then env overrides.
fn load_config() -> Result<BackupConfig> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(ENV_CONFIG_PATH).ok());

    let mut config = match path {
        Some(path) => BackupConfig::from_file(path)?,
        None => BackupConfig::default(),
    };
    config.apply_env_overrides();
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("backup-server: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("backup-server: {e}");
    }

    if let Err(e) = config.validate_strict() {
        error!(error = %e, "Refusing to start");
        return ExitCode::FAILURE;
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Starting backup server");
    match tcp::start_server(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server stopped");
            ExitCode::FAILURE
        }
    }
}
