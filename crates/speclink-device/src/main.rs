//! Speclink CLI: run the controller, provision storage, inspect the
//! catalog, or erase it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use speclink_common::{FixedIdentity, ModelName, SerialTag, TransportId};
use speclink_device::{
    serve_transports, spawn_transport_worker, ActivityTracker, DeviceError, DeviceRegistry,
    DeviceSettings, DeviceStore, IdleMonitor, TransportChannels, TransportEndpoint,
};
use speclink_protocol::{ActivityMonitor, CommandPort, SessionArbiter};
use speclink_status::StatusCenter;
use speclink_store::{ConfigRecord, ConfigStore, FileMedium, FixedScanBody, NvmMedium, STORE_SIZE};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "speclink", version, about = "Speclink spectrometer controller runner")]
struct Cli {
    /// Path to the settings file (YAML).
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the controller and its transport harness.
    Run {
        /// Override the harness base port from settings.
        #[arg(long)]
        base_port: Option<u16>,
    },
    /// Provision a fresh storage file: factory record and identity.
    Init,
    /// Dump the catalog, counters, and identity as JSON.
    Inspect,
    /// Truncate the catalog to the factory record.
    EraseAll {
        /// Skip the confirmation.
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> Result<(), DeviceError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut settings = match &cli.config {
        Some(path) => DeviceSettings::load(path)?,
        None => DeviceSettings::default(),
    };

    match cli.command {
        Command::Run { base_port } => {
            if let Some(port) = base_port {
                settings.base_port = port;
            }
            run(settings)
        }
        Command::Init => init(settings),
        Command::Inspect => inspect(settings),
        Command::EraseAll { yes } => erase_all(settings, yes),
    }
}

/// Open the store over the settings' backing file.
fn open_store(settings: &DeviceSettings) -> Result<DeviceStore, DeviceError> {
    let medium: Box<dyn NvmMedium> =
        Box::new(FileMedium::open(&settings.storage_path, STORE_SIZE)?);
    let identity = Box::new(FixedIdentity::new(
        &settings.serial_number,
        &settings.model_name,
    ));
    Ok(ConfigStore::new(medium, identity))
}

/// Provision a blank store: factory record, identity strings.
fn provision(store: &mut DeviceStore, settings: &DeviceSettings) -> Result<(), DeviceError> {
    store.initialize(&ConfigRecord::fixed(FixedScanBody::default()))?;
    store.set_serial_number(&SerialTag::from_str_lossy(&settings.serial_number))?;
    store.set_model_name(&ModelName::from_str_lossy(&settings.model_name))?;
    tracing::info!(
        path = %settings.storage_path.display(),
        serial = %settings.serial_number,
        "storage provisioned"
    );
    Ok(())
}

fn run(settings: DeviceSettings) -> Result<(), DeviceError> {
    tracing::info!(
        version = speclink_common::FIRMWARE_VERSION,
        serial = %settings.serial_number,
        "starting controller"
    );
    let mut store = open_store(&settings)?;
    if store.record_count()? == 0 {
        tracing::info!("blank storage detected, provisioning");
        provision(&mut store, &settings)?;
    }

    let store = Arc::new(Mutex::new(store));
    let status = Arc::new(StatusCenter::new());
    status.reset_all();
    let session = Arc::new(SessionArbiter::new());
    let tracker = Arc::new(ActivityTracker::new());
    let activity: Arc<dyn ActivityMonitor> = tracker.clone();

    let registry = DeviceRegistry::new(Arc::clone(&store), Arc::clone(&status));
    let port = Arc::new(CommandPort::new(
        Arc::clone(&session),
        Arc::clone(&status),
        activity,
        registry,
    ));

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            tracing::info!("shutdown requested");
            flag.store(true, Ordering::Relaxed);
        })?;
    }

    let mut workers = Vec::new();
    let mut endpoints = Vec::new();
    for &transport in &settings.transports {
        if transport == TransportId::None {
            continue;
        }
        let (worker_half, harness_half) = TransportChannels::new_pair();
        workers.push(spawn_transport_worker(
            transport,
            Arc::clone(&port),
            worker_half,
            Arc::clone(&shutdown),
        ));
        endpoints.push((
            TransportEndpoint {
                transport,
                port: settings.port_for(transport),
            },
            harness_half,
        ));
    }

    let monitor = IdleMonitor::start(
        Arc::clone(&session),
        Arc::clone(&tracker),
        Duration::from_secs(settings.idle_timeout_secs),
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve_transports(
        endpoints,
        Arc::clone(&session),
        Arc::clone(&shutdown),
    ))?;

    monitor.stop();
    for worker in workers {
        let _ = worker.join();
    }
    tracing::info!("controller stopped");
    Ok(())
}

fn init(settings: DeviceSettings) -> Result<(), DeviceError> {
    let mut store = open_store(&settings)?;
    provision(&mut store, &settings)?;
    Ok(())
}

fn inspect(settings: DeviceSettings) -> Result<(), DeviceError> {
    let mut store = open_store(&settings)?;
    let records = store.summarize()?;
    let dump = serde_json::json!({
        "serial_number": store.serial_number()?.to_string_lossy(),
        "model_name": store.model_name()?.to_string_lossy(),
        "scan_name": store.scan_name()?,
        "record_count": store.record_count()?,
        "active_index": store.active_index()?,
        "next_config_index": store.next_config_index()?,
        "next_scan_index": store.next_scan_index()?,
        "records": records,
    });
    println!("{}", serde_json::to_string_pretty(&dump)?);
    Ok(())
}

fn erase_all(settings: DeviceSettings, yes: bool) -> Result<(), DeviceError> {
    if !yes {
        eprintln!("refusing to erase without --yes");
        std::process::exit(2);
    }
    let mut store = open_store(&settings)?;
    store.erase_all()?;
    tracing::info!("catalog truncated to factory record");
    Ok(())
}
