use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use common::types::ContactBatch;
use dotenvy::dotenv;
use service::keys::KeyService;
use service::runtime::{until_shutdown, Completion};
use service::storage::KeyStore;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "notifier", version, about = "Tell people when their address shows up in a breach")]
struct Args {
    /// Path to config.toml
    #[arg(long, env = "CONFIG_PATH")]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Look up every contact in a batch file and notify the affected ones
    Run {
        /// JSON file shaped like {"contacts":[{"email":"..","phone":".."}]}
        #[arg(long)]
        contacts: PathBuf,
        /// Also tell contacts that were not found in any breach
        #[arg(long)]
        always_notify: bool,
        /// Record messages instead of sending them
        #[arg(long)]
        dry_run: bool,
    },
    /// Inspect or edit the persisted key store
    Keys {
        #[command(subcommand)]
        action: KeyAction,
    },
}

#[derive(Subcommand, Debug)]
enum KeyAction {
    /// Print the values of the given keys (missing keys are omitted)
    Get { keys: Vec<String> },
    /// Add a key that must not exist yet
    Create { key: String, value: String },
    /// Change the value of an existing key
    Update { key: String, value: String },
    /// Insert or overwrite without checks
    Set { key: String, value: String },
    /// Remove an existing key
    Delete { key: String },
    /// Write the whole store to stdout as one JSON line
    Dump,
}

fn main() -> ExitCode {
    // load .env first so RUST_LOG and credentials are visible
    dotenv().ok();
    let args = Args::parse();

    let cfg = match configs::AppConfig::load_and_validate(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            common::utils::logging::init_logging_default();
            error!(service = "notifier", event = "config_invalid", error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    common::utils::logging::init_logging(&cfg.runtime.log_format);
    info!(service = "notifier", event = "logger_init", "tracing subscriber initialized");

    let service_id = Uuid::new_v4();
    let pid = std::process::id();
    let version = env!("CARGO_PKG_VERSION");

    std::panic::set_hook(Box::new(move |info| {
        error!(
            service = "notifier",
            event = "panic",
            %service_id,
            pid,
            message = %info,
            "unhandled panic occurred"
        );
    }));

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(w) = cfg.runtime.worker_threads { builder.worker_threads(w); }
    let rt = match builder.build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(service = "notifier", event = "runtime_build_failed", error = %e, "failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    info!(service = "notifier", event = "start", %service_id, pid, version, "notifier starting");

    rt.block_on(async move {
        let snapshot_path = cfg.store.snapshot_path.clone();
        if let Err(e) = service::runtime::ensure_env(&snapshot_path).await {
            error!(service = "notifier", event = "env_check_failed", error = %e, "runtime environment check failed");
            return ExitCode::FAILURE;
        }
        let store = match KeyStore::hydrate(&snapshot_path).await {
            Ok(store) => store,
            Err(e) => {
                error!(service = "notifier", event = "hydrate_failed", error = %e, path = %snapshot_path, "cannot load key snapshot");
                return ExitCode::FAILURE;
            }
        };

        let batch_file = match &args.command {
            Command::Run { contacts, .. } => Some(contacts.display().to_string()),
            Command::Keys { .. } => None,
        };
        let work = execute(args.command, &cfg, store.clone());
        let code = match until_shutdown(work, tokio::signal::ctrl_c()).await {
            Completion::Finished(Ok(())) => ExitCode::SUCCESS,
            Completion::Finished(Err(e)) => {
                error!(service = "notifier", event = "command_failed", error = %e, "command failed");
                ExitCode::FAILURE
            }
            Completion::Interrupted => {
                match batch_file {
                    Some(file) => warn!(
                        service = "notifier",
                        event = "batch_interrupted",
                        %service_id,
                        pid,
                        contacts = %file,
                        "Ctrl+C mid-batch; later contacts were not notified, no report written"
                    ),
                    None => warn!(
                        service = "notifier",
                        event = "shutdown_signal",
                        %service_id,
                        pid,
                        "received Ctrl+C before the command finished"
                    ),
                }
                ExitCode::FAILURE
            }
        };

        // the snapshot is written on every exit path that got this far
        if let Err(e) = store.persist(&snapshot_path).await {
            error!(service = "notifier", event = "persist_failed", error = %e, path = %snapshot_path, "cannot write key snapshot");
            return ExitCode::FAILURE;
        }
        info!(service = "notifier", event = "stop", %service_id, pid, "notifier stopped");
        code
    })
}

async fn execute(command: Command, cfg: &configs::AppConfig, store: KeyStore) -> anyhow::Result<()> {
    match command {
        Command::Run { contacts, always_notify, dry_run } => {
            let raw = tokio::fs::read(&contacts)
                .await
                .with_context(|| format!("cannot read {}", contacts.display()))?;
            let batch: ContactBatch = serde_json::from_slice(&raw).context("contacts file is not a valid batch")?;
            let driver = service::runtime::build_driver(cfg, dry_run)?;
            let reports = driver
                .run_batch(&batch.contacts, always_notify || cfg.notify.always_notify)
                .await;
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        Command::Keys { action } => {
            let keys = KeyService::new(store);
            match action {
                KeyAction::Get { keys: wanted } => {
                    let found = keys.get_many(&wanted).await;
                    println!("{}", serde_json::to_string(&found)?);
                }
                KeyAction::Create { key, value } => keys.create(&key, value).await?,
                KeyAction::Update { key, value } => keys.update(&key, value).await?,
                KeyAction::Set { key, value } => {
                    service::keys::validate_key(&key)?;
                    keys.store().set(key, value).await;
                }
                KeyAction::Delete { key } => keys.remove(&key).await?,
                KeyAction::Dump => {
                    let mut out = tokio::io::stdout();
                    keys.store().dump_to(&mut out).await?;
                }
            }
        }
    }
    Ok(())
}
