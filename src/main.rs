use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use recovery_gate::clock::SystemClock;
use recovery_gate::config::GateConfig;
use recovery_gate::gate::{handle, DirectoryLookup, OutboxNotifier, RecoveryGate, Route};
use recovery_gate::store;

#[derive(Debug, Parser)]
#[command(name = "recovery-gate", version, about = "Password recovery request gate")]
struct Cli {
    /// YAML configuration file; RECOVERY_GATE_* environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Handle one request: JSON body on stdin, JSON response on stdout
    Invoke {
        #[arg(value_enum)]
        route: RouteArg,

        #[arg(long, default_value = "POST")]
        method: String,
    },
    /// Remove expired rate-limit history and tokens
    Prune,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RouteArg {
    Request,
    Redeem,
}

impl From<RouteArg> for Route {
    fn from(arg: RouteArg) -> Self {
        match arg {
            RouteArg::Request => Route::Request,
            RouteArg::Redeem => Route::Redeem,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = GateConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    info!(
        storage = ?config.storage.backend,
        global_max = config.limits.global_max,
        user_max = config.limits.user_max,
        token_ttl_secs = config.tokens.ttl_secs,
        "Configuration loaded"
    );

    let gate = build_gate(&config)?;

    match cli.command {
        Command::Invoke { route, method } => {
            let mut body = Vec::new();
            std::io::stdin()
                .read_to_end(&mut body)
                .context("Failed to read request body")?;

            let response = handle(&gate, route.into(), &method, &body).await;
            println!("{}", response.to_json());
            info!(status = response.status, "Invocation finished");

            Ok(if response.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Prune => {
            let report = gate.prune().await;
            println!(
                "{}",
                serde_json::json!({
                    "rate_entries": report.rate_entries,
                    "tokens": report.tokens,
                })
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_gate(config: &GateConfig) -> anyhow::Result<RecoveryGate> {
    let store = store::from_config(&config.storage);

    let lookup = match &config.identity.accounts_path {
        Some(path) => DirectoryLookup::from_file(path)
            .with_context(|| format!("Failed to load account directory {}", path.display()))?,
        None => {
            warn!("No account directory configured; every identity will be unknown");
            DirectoryLookup::default()
        }
    };

    let notifier = OutboxNotifier::new(&config.delivery.outbox_dir);

    Ok(RecoveryGate::new(
        config,
        store,
        Arc::new(lookup),
        Arc::new(notifier),
        Arc::new(SystemClock),
    ))
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
