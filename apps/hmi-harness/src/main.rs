use hmi_harness::commands::{self, Reply};
use hmi_harness::error::HarnessError;
use hmi_harness::logger::initialize as LoggerInitialize;

use hmi_core::channel::WebSocketTransport;
use hmi_core::clock::SystemClock;
use hmi_core::config::HmiConfig;
use hmi_core::session::{HmiSnapshot, SessionHandle};

use common::ErrorLocation;

use std::env::current_dir;
use std::fs::create_dir_all;
use std::panic::Location;
use std::process::ExitCode;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader, stdin};
use tokio::spawn as TokioSpawn;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), HarnessError> {
    let config_dir = HmiConfig::default_dir().map_err(HarnessError::core)?;

    create_dir_all(&config_dir).map_err(|e| HarnessError::Harness {
        message: format!("Failed to create config directory: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    // Logger FIRST
    LoggerInitialize(&config_dir)?;

    info!("HMI harness starting");
    info!("Config directory: {}", config_dir.display());

    let config = HmiConfig::load(&config_dir).map_err(HarnessError::core)?;

    let transport = Arc::new(WebSocketTransport::new(config.channel_settings()));
    let session = SessionHandle::spawn(transport, config.session_settings(), Arc::new(SystemClock));

    let base = current_dir().map_err(|e| HarnessError::Harness {
        message: format!("Failed to resolve working directory: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;
    let schema_paths = config.schema_paths(&base);
    info!(
        "Loading schemas from {} and {}",
        schema_paths.common.display(),
        schema_paths.share.display()
    );
    session.load_schemas(schema_paths);

    let specs = config.adapter_specs().map_err(HarnessError::core)?;
    for spec in specs {
        let name = spec.name.clone();
        match session.add_adapter(spec).await {
            Ok(adapter_id) => info!("Seeded adapter {adapter_id} '{name}'"),
            Err(e) => warn!("Adapter '{name}' not seeded: {e}"),
        }
    }

    TokioSpawn(log_snapshots(session.clone()));

    println!("{}", commands::HELP);
    read_commands(&session).await?;

    info!("HMI harness exiting");
    Ok(())
}

async fn read_commands(session: &SessionHandle) -> Result<(), HarnessError> {
    let mut lines = BufReader::new(stdin()).lines();

    loop {
        let line = lines.next_line().await.map_err(|e| HarnessError::Harness {
            message: format!("Failed to read stdin: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;
        let Some(line) = line else {
            debug!("stdin closed");
            return Ok(());
        };

        let command = match commands::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        match commands::execute(session, command).await {
            Ok(Reply::Quit) => return Ok(()),
            Ok(Reply::Text(text)) => println!("{text}"),
            Ok(Reply::Done) => {}
            Err(e) => {
                warn!("Command failed: {e}");
                println!("{e}");
            }
        }
    }
}

/// Log adapter and device status whenever a snapshot changes them.
async fn log_snapshots(session: SessionHandle) {
    let mut snapshots = session.subscribe();
    let mut last = summarize(&snapshots.borrow_and_update());

    while snapshots.changed().await.is_ok() {
        let summary = summarize(&snapshots.borrow_and_update());
        if summary != last {
            info!("{summary}");
            last = summary;
        }
    }
}

fn summarize(snapshot: &HmiSnapshot) -> String {
    let adapters: Vec<String> = snapshot
        .adapters
        .iter()
        .map(|adapter| format!("{}={}", adapter.id, adapter.status))
        .collect();
    let devices: Vec<String> = snapshot
        .devices
        .iter()
        .map(|device| format!("{}={:?}", device.id, device.status))
        .collect();
    format!(
        "Adapters [{}] devices [{}] active {:?} selected {:?}",
        adapters.join(", "),
        devices.join(", "),
        snapshot.active_adapter,
        snapshot.selected_device
    )
}
