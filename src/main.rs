use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use sdn_ledger_sync::config::SyncConfig;
use sdn_ledger_sync::ledger::MultiChainLedger;
use sdn_ledger_sync::model::{FlowSet, HostSet, Snapshot, SubjectKind, TopologySnapshot};
use sdn_ledger_sync::onos::{ControllerApi, OnosClient};
use sdn_ledger_sync::sync::{
    check_once, LedgerPublisher, PipelineSettings, SyncContext, SyncService, SystemClock,
    TracingAlertSink,
};
use sdn_ledger_sync::telemetry::{init_tracing, LogFormat};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch the primary and publish agreed state to the ledger
    Run(RunArgs),
    /// Compare one subject on primary and backup once
    Check(CheckArgs),
    /// Copy one subject from one controller into the other
    Propagate(PropagateArgs),
    /// Show version and build information
    Version,
}

#[derive(Parser, Debug)]
struct ConnectionArgs {
    /// TOML configuration file
    #[arg(long, short, env = "SDN_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Primary controller northbound URL
    #[arg(long, env = "ONOS_PRIMARY_URL")]
    primary_url: Option<String>,

    /// Backup controller northbound URL
    #[arg(long, env = "ONOS_BACKUP_URL")]
    backup_url: Option<String>,

    #[arg(long, env = "ONOS_USERNAME")]
    onos_username: Option<String>,

    #[arg(long, env = "ONOS_PASSWORD", hide_env_values = true)]
    onos_password: Option<String>,

    /// MultiChain JSON-RPC endpoint
    #[arg(long, env = "MULTICHAIN_RPC_URL")]
    rpc_url: Option<String>,

    #[arg(long, env = "MULTICHAIN_RPC_USER")]
    rpc_user: Option<String>,

    #[arg(long, env = "MULTICHAIN_RPC_PASSWORD", hide_env_values = true)]
    rpc_password: Option<String>,

    /// Identity reported in alerts
    #[arg(long, env = "SYNC_ORIGIN")]
    origin: Option<String>,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl ConnectionArgs {
    /// File (or defaults) with flag and environment overrides applied
    fn load_config(&self) -> anyhow::Result<SyncConfig> {
        let mut cfg = SyncConfig::load(self.config.as_deref())?;

        if let Some(url) = &self.primary_url {
            cfg.primary.url = url.clone();
        }
        if let Some(url) = &self.backup_url {
            cfg.backup.url = url.clone();
        }
        for endpoint in [&mut cfg.primary, &mut cfg.backup] {
            if let Some(username) = &self.onos_username {
                endpoint.username = username.clone();
            }
            if let Some(password) = &self.onos_password {
                endpoint.password = password.clone();
            }
        }
        if let Some(url) = &self.rpc_url {
            cfg.ledger.rpc_url = url.clone();
        }
        if let Some(user) = &self.rpc_user {
            cfg.ledger.rpc_user = user.clone();
        }
        if let Some(password) = &self.rpc_password {
            cfg.ledger.rpc_password = password.clone();
        }
        if let Some(origin) = &self.origin {
            cfg.origin = Some(origin.clone());
        }

        Ok(cfg)
    }
}

#[derive(Parser, Debug)]
struct RunArgs {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Subjects to sync; replaces the configured list
    #[arg(long = "subject", value_enum)]
    subjects: Vec<SubjectKind>,

    /// Push the primary's state to the backup after a disagreement
    #[arg(long, env = "RECONCILE_ON_DISAGREEMENT")]
    reconcile: bool,

    /// Directory for handoff file mirrors
    #[arg(long, env = "HANDOFF_DIR")]
    handoff_dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct CheckArgs {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[arg(long, value_enum, default_value_t = SubjectKind::Flows)]
    subject: SubjectKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Side {
    Primary,
    Backup,
}

#[derive(Parser, Debug)]
struct PropagateArgs {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[arg(long, value_enum, default_value_t = SubjectKind::Flows)]
    subject: SubjectKind,

    /// Controller to copy from; the other one receives the state
    #[arg(long, value_enum, default_value_t = Side::Primary)]
    from: Side,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("sdn-ledger-sync v{}", env!("CARGO_PKG_VERSION"));
            if let Some(sha) = option_env!("GIT_SHA") {
                println!("Git SHA: {}", sha);
            }
            Ok(())
        }
        Commands::Run(run_args) => run_sync(run_args).await,
        Commands::Check(check_args) => run_check(check_args).await,
        Commands::Propagate(propagate_args) => run_propagate(propagate_args).await,
    }
}

type Controllers = (Arc<dyn ControllerApi>, Arc<dyn ControllerApi>);

fn controllers(cfg: &SyncConfig) -> anyhow::Result<Controllers> {
    let primary = OnosClient::new(&cfg.primary).context("building primary client")?;
    let backup = OnosClient::new(&cfg.backup).context("building backup client")?;
    Ok((Arc::new(primary), Arc::new(backup)))
}

async fn run_sync(args: RunArgs) -> anyhow::Result<()> {
    init_tracing(args.connection.log_format);

    let mut cfg = args.connection.load_config()?;
    if !args.subjects.is_empty() {
        cfg.subjects = args.subjects.clone();
    }
    if args.reconcile {
        cfg.reconcile_on_disagreement = true;
    }
    if let Some(dir) = args.handoff_dir {
        cfg.handoff_dir = Some(dir);
    }
    cfg.validate()?;

    info!("Starting sdn-ledger-sync v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Primary {} / backup {}, ledger {} on {}",
        cfg.primary.url, cfg.backup.url, cfg.ledger.chain_name, cfg.ledger.rpc_url
    );

    let (primary, backup) = controllers(&cfg)?;
    let ledger = MultiChainLedger::new(&cfg.ledger).context("building ledger client")?;

    let ctx = Arc::new(SyncContext {
        primary,
        backup,
        publisher: Arc::new(LedgerPublisher::new(
            Arc::new(ledger),
            cfg.ledger.max_payload_bytes,
        )),
        alerts: Arc::new(TracingAlertSink),
        clock: Arc::new(SystemClock),
        settings: cfg.pipeline_settings(),
        origin: cfg.origin(),
    });

    let service = SyncService::start(ctx, &cfg.subjects).await?;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("Shutdown signal received, stopping sync loops");
    service.shutdown().await;

    Ok(())
}

async fn run_check(args: CheckArgs) -> anyhow::Result<()> {
    init_tracing(args.connection.log_format);
    let cfg = args.connection.load_config()?;
    cfg.validate()?;
    let (primary, backup) = controllers(&cfg)?;
    let settings = cfg.pipeline_settings();

    match args.subject {
        SubjectKind::Flows => check_subject::<FlowSet>(primary, backup, &settings).await,
        SubjectKind::Hosts => check_subject::<HostSet>(primary, backup, &settings).await,
        SubjectKind::Topology => {
            check_subject::<TopologySnapshot>(primary, backup, &settings).await
        }
    }
}

async fn check_subject<S: Snapshot>(
    primary: Arc<dyn ControllerApi>,
    backup: Arc<dyn ControllerApi>,
    settings: &PipelineSettings,
) -> anyhow::Result<()> {
    let addresses = (primary.address().to_string(), backup.address().to_string());
    check_once::<S>(primary, backup, settings, &CancellationToken::new()).await?;
    println!("{}: {} and {} agree", S::KIND, addresses.0, addresses.1);
    Ok(())
}

async fn run_propagate(args: PropagateArgs) -> anyhow::Result<()> {
    init_tracing(args.connection.log_format);
    let cfg = args.connection.load_config()?;
    cfg.validate()?;
    let (primary, backup) = controllers(&cfg)?;

    let (source, target) = match args.from {
        Side::Primary => (primary, backup),
        Side::Backup => (backup, primary),
    };

    match args.subject {
        SubjectKind::Flows => propagate::<FlowSet>(source.as_ref(), target.as_ref()).await,
        SubjectKind::Hosts => propagate::<HostSet>(source.as_ref(), target.as_ref()).await,
        SubjectKind::Topology => {
            propagate::<TopologySnapshot>(source.as_ref(), target.as_ref()).await
        }
    }
}

async fn propagate<S: Snapshot>(
    source: &dyn ControllerApi,
    target: &dyn ControllerApi,
) -> anyhow::Result<()> {
    let snapshot = S::fetch(source).await?;
    S::install(target, &snapshot)
        .await
        .with_context(|| format!("installing {} into {}", S::KIND, target.address()))?;
    info!(
        "Propagated {} from {} to {}",
        S::KIND,
        source.address(),
        target.address()
    );
    Ok(())
}
