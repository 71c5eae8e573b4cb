//! Dorado Provisioner CLI
//!
//! Runs one provisioning operation against a Dorado array and prints the
//! result as JSON on stdout. Logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use prometheus::Registry;
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use dorado_provisioner::{
    ArrayClientRef, ArrayConfig, ArrayFactory, DoradoClient, HostMapper, ImportantPassword,
    Metrics, ObjectKind, PollPolicy, PowerOperation, Repositories, VolumeService,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Dorado Provisioner - SAN host mapping and volume lifecycle
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "DORADO_CONFIG")]
    config: Option<PathBuf>,

    /// Management endpoint, one per controller (repeatable)
    #[arg(long = "endpoint", env = "DORADO_ENDPOINTS", value_delimiter = ',')]
    endpoints: Vec<String>,

    /// Array user
    #[arg(long, env = "DORADO_USERNAME")]
    username: Option<String>,

    /// Array password
    #[arg(long, env = "DORADO_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Run against an in-memory array instead of a real one
    #[arg(long, env = "DRY_RUN")]
    dry_run: bool,

    /// Print Prometheus metrics to stderr when done
    #[arg(long)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and read the array clock
    Ping,

    /// Ensure the host and its host group exist
    EnsureHost { hostname: String },

    /// Ensure the mapping graph of a host and attach it to a port group
    Map {
        hostname: String,
        /// Port group ID
        #[arg(long)]
        port_group: String,
        /// Map without a LUN group
        #[arg(long)]
        no_lun_group: bool,
    },

    /// Detach a host's mapping view members and delete the view
    Unmap {
        hostname: String,
        /// Port group ID
        #[arg(long)]
        port_group: String,
    },

    /// Delete a host group and its host
    Teardown { host_group_id: String },

    /// Create the LUN backing a volume
    CreateLun {
        #[arg(long)]
        volume: Uuid,
        #[arg(long)]
        size_gb: u64,
        /// Storage pool name
        #[arg(long)]
        pool: String,
        /// Return without waiting for the LUN to come online
        #[arg(long)]
        no_wait: bool,
    },

    /// Grow a LUN
    ExpandLun {
        lun_id: String,
        #[arg(long)]
        size_gb: u64,
    },

    DeleteLun { lun_id: String },

    /// Snapshot a LUN
    CreateSnapshot {
        #[arg(long)]
        lun_id: String,
        #[arg(long)]
        snapshot: Uuid,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        no_wait: bool,
    },

    DeleteSnapshot { snapshot_id: String },

    /// Host-visible LUN number of a LUN
    HostLunId {
        #[arg(long)]
        lun_id: String,
        #[arg(long)]
        host_id: String,
    },

    /// iSCSI target IQNs of the array
    TargetIqns,

    /// HyperMetro domains of the array
    HypermetroDomains,

    /// Power off or reboot the whole array
    Power {
        #[arg(value_enum)]
        operation: PowerArg,
        /// Super administrator password
        #[arg(long, env = "DORADO_IMPORTANT_PASSWORD", hide_env_values = true)]
        important_password: String,
        /// Required: every mapped host loses its storage
        #[arg(long)]
        confirm: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PowerArg {
    Off,
    Reboot,
}

impl From<PowerArg> for PowerOperation {
    fn from(arg: PowerArg) -> Self {
        match arg {
            PowerArg::Off => PowerOperation::PowerOff,
            PowerArg::Reboot => PowerOperation::Reboot,
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    info!("Dorado Provisioner {}", dorado_provisioner::VERSION);
    info!("  Dry run: {}", args.dry_run);

    let config = load_config(&args)?;

    let registry = Registry::new();
    let metrics = Arc::new(Metrics::register(&registry)?);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            on_signal.cancel();
        }
    });

    let output = match &args.command {
        Command::Ping => ping(&args, config).await?,
        command => {
            let poll = config.poll.policy();
            let client = connect(&args, config, command)?;
            run(command, client, poll, metrics, &cancel).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);

    if args.print_metrics {
        eprintln!("{}", dorado_provisioner::metrics::render(&registry)?);
    }

    Ok(())
}

// =============================================================================
// Configuration
// =============================================================================

/// File values overridden by flags and environment
fn load_config(args: &Args) -> Result<ArrayConfig> {
    let mut config = match &args.config {
        Some(path) => ArrayConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ArrayConfig::default(),
    };

    if !args.endpoints.is_empty() {
        config.endpoints = args.endpoints.clone();
    }
    if let Some(username) = &args.username {
        config.username = username.clone();
    }
    if let Some(password) = &args.password {
        config.password = password.clone();
    }
    config.normalize();

    Ok(config)
}

fn connect(args: &Args, config: ArrayConfig, command: &Command) -> Result<ArrayClientRef> {
    ArrayFactory::for_mode(args.dry_run, config, dry_run_seed(command))
        .context("creating array client")
}

/// Objects a dry run needs but never creates
fn dry_run_seed(command: &Command) -> Vec<(ObjectKind, serde_json::Value)> {
    match command {
        Command::Map { port_group, .. } | Command::Unmap { port_group, .. } => vec![(
            ObjectKind::PortGroup,
            json!({"ID": port_group, "NAME": "dry-run"}),
        )],
        Command::CreateLun { pool, .. } => vec![(
            ObjectKind::StoragePool,
            json!({"ID": "0", "NAME": pool}),
        )],
        _ => Vec::new(),
    }
}

// =============================================================================
// Commands
// =============================================================================

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}

async fn ping(args: &Args, config: ArrayConfig) -> Result<serde_json::Value> {
    if args.dry_run {
        return Ok(json!({ "adapter": "memory" }));
    }

    let client = DoradoClient::new(config)?;
    client.login().await.context("logging in")?;
    let time = client.system_utc_time().await?;
    Ok(json!({ "adapter": "dorado", "utc_time": time.to_rfc3339() }))
}

async fn run(
    command: &Command,
    client: ArrayClientRef,
    poll: PollPolicy,
    metrics: Arc<Metrics>,
    cancel: &CancellationToken,
) -> Result<serde_json::Value> {
    let repos = Repositories::new(client);
    let mapper = HostMapper::new(repos.clone()).with_metrics(metrics.clone());
    let volumes = VolumeService::new(repos.clone(), poll).with_metrics(metrics);

    match command {
        Command::Ping => Ok(json!({})),

        Command::EnsureHost { hostname } => {
            let (host_group, host) = mapper.ensure_host_group(hostname).await?;
            Ok(json!({ "host_group": host_group, "host": host }))
        }

        Command::Map {
            hostname,
            port_group,
            no_lun_group,
        } => {
            let (host_group, host) = mapper.ensure_host_group(hostname).await?;
            let view = mapper.ensure_mapping_view(hostname).await?;
            let lun_group = if *no_lun_group {
                None
            } else {
                Some(mapper.ensure_lun_group(hostname).await?)
            };
            let steps = mapper
                .map(&view, &host_group, lun_group.as_ref(), port_group)
                .await?;
            Ok(json!({
                "host": host,
                "host_group": host_group,
                "mapping_view": view,
                "lun_group": lun_group,
                "applied": steps,
            }))
        }

        Command::Unmap {
            hostname,
            port_group,
        } => {
            let name = dorado_provisioner::naming::encode_host_name(hostname);
            let host_group = repos
                .host_groups
                .find_by_hostname(hostname)
                .await?
                .exactly_one(ObjectKind::HostGroup, &name)?;
            let view = repos
                .mapping_views
                .find_by_hostname(hostname)
                .await?
                .exactly_one(ObjectKind::MappingView, &name)?;
            let lun_group = repos
                .lun_groups
                .find_by_hostname(hostname)
                .await?
                .at_most_one(ObjectKind::LunGroup, &name)?;
            let steps = mapper
                .unmap(&view, &host_group, lun_group.as_ref(), port_group)
                .await?;
            Ok(json!({ "applied": steps }))
        }

        Command::Teardown { host_group_id } => {
            let steps = mapper.teardown(host_group_id).await?;
            Ok(json!({ "applied": steps }))
        }

        Command::CreateLun {
            volume,
            size_gb,
            pool,
            no_wait,
        } => {
            let lun = if *no_wait {
                volumes.create_lun(volume, *size_gb, pool).await?
            } else {
                volumes
                    .create_lun_with_wait(volume, *size_gb, pool, cancel)
                    .await?
            };
            to_json(&lun)
        }

        Command::ExpandLun { lun_id, size_gb } => {
            volumes.expand_lun(lun_id, *size_gb).await?;
            to_json(&repos.luns.get(lun_id).await?)
        }

        Command::DeleteLun { lun_id } => {
            volumes.delete_lun(lun_id).await?;
            Ok(json!({ "deleted": lun_id }))
        }

        Command::CreateSnapshot {
            lun_id,
            snapshot,
            description,
            no_wait,
        } => {
            let snapshot = if *no_wait {
                volumes.create_snapshot(lun_id, snapshot, description).await?
            } else {
                volumes
                    .create_snapshot_with_wait(lun_id, snapshot, description, cancel)
                    .await?
            };
            to_json(&snapshot)
        }

        Command::DeleteSnapshot { snapshot_id } => {
            volumes.delete_snapshot(snapshot_id).await?;
            Ok(json!({ "deleted": snapshot_id }))
        }

        Command::HostLunId { lun_id, host_id } => {
            let host_lun_id = mapper.host_lun_id(lun_id, host_id).await?;
            Ok(json!({ "lun_id": lun_id, "host_id": host_id, "host_lun_id": host_lun_id }))
        }

        Command::TargetIqns => to_json(&repos.target_ports.target_iqns().await?),

        Command::HypermetroDomains => {
            to_json(&repos.hypermetro_domains.list().await?.into_vec())
        }

        Command::Power {
            operation,
            important_password,
            confirm,
        } => {
            let operation = PowerOperation::from(*operation);
            if !confirm {
                anyhow::bail!("refusing to {} the array without --confirm", operation);
            }
            repos
                .system
                .power(operation, ImportantPassword::new(important_password.as_str()))
                .await?;
            Ok(json!({ "requested": operation }))
        }
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=info".parse()?)
        .add_directive("rustls=warn".parse()?);

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}
