//! Rocket Reserver command-line client.
//!
//! - `rocket-reserver launches` - list upcoming launches
//! - `rocket-reserver launch <id>` - show one launch
//! - `rocket-reserver book <id>` - book a seat, or cancel a booked one
//! - `rocket-reserver login <email>` / `logout` / `status`
//! - `rocket-reserver watch` - print a line whenever anyone books a trip

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rocket_credentials::{CredentialStore, FileCredentialStore};
use rocket_graphql::{GraphqlClient, PageLimit, WsProtocol};
use rocket_reserver::{
    Alert, ConfigOverrides, LaunchDetailFlow, LaunchPager, ReserverConfig, ReserverError, Session,
    load_all_launches, render, watch_trips,
};
use serde::Serialize;
use tokio::sync::mpsc;

/// Browse rocket launches and book seats.
#[derive(Parser)]
#[command(name = "rocket-reserver")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Config file (TOML).
    #[arg(long, global = true, env = "ROCKET_RESERVER_CONFIG")]
    config: Option<PathBuf>,

    /// GraphQL HTTP endpoint.
    #[arg(long, global = true, env = "ROCKET_RESERVER_ENDPOINT")]
    endpoint: Option<String>,

    /// WebSocket URL for subscriptions.
    #[arg(long, global = true, env = "ROCKET_RESERVER_SUBSCRIPTION_URL")]
    subscription_url: Option<String>,

    /// Subscription protocol: graphql-ws or graphql-transport-ws.
    #[arg(long, global = true, env = "ROCKET_RESERVER_WS_PROTOCOL")]
    ws_protocol: Option<WsProtocol>,

    /// Where the login token is kept.
    #[arg(long, global = true, env = "ROCKET_RESERVER_CREDENTIALS")]
    credential_file: Option<PathBuf>,

    /// HTTP timeout in seconds.
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, env = "ROCKET_RESERVER_LOG")]
    log_level: Option<String>,

    /// Write logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    /// Log redacted request and response bodies.
    #[arg(long, global = true)]
    trace_bodies: bool,

    /// Print results as JSON instead of text.
    #[arg(long, global = true)]
    json: bool,
}

impl GlobalArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            endpoint: self.endpoint.clone(),
            subscription_url: self.subscription_url.clone(),
            ws_protocol: self.ws_protocol,
            credential_file: self.credential_file.clone(),
            timeout_secs: self.timeout_secs,
            log_level: self.log_level.clone(),
            json_logs: self.json_logs,
            trace_bodies: self.trace_bodies,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List launches.
    Launches {
        /// Number of pages to load.
        #[arg(long, default_value_t = 1)]
        pages: usize,

        /// Load every page.
        #[arg(long, conflicts_with = "pages")]
        all: bool,

        /// Stop after this many launches (with --all).
        #[arg(long, requires = "all")]
        limit: Option<usize>,
    },

    /// Show one launch.
    Launch {
        /// Launch id.
        id: String,

        /// Bypass the response cache.
        #[arg(long)]
        reload: bool,
    },

    /// Book a seat on a launch, or cancel it when already booked.
    Book {
        /// Launch id.
        id: String,
    },

    /// Log in with an email address.
    Login {
        /// Email address.
        email: String,
    },

    /// Forget the stored login.
    Logout,

    /// Show whether a login is stored.
    Status,

    /// Print a line whenever anyone books a trip.
    Watch {
        /// Exit after this many notifications.
        #[arg(long)]
        count: Option<usize>,
    },

    /// Print the effective configuration.
    Config,
}

#[derive(Clone, Copy)]
struct Output {
    json: bool,
}

impl Output {
    fn print<T: Serialize>(self, value: &T, text: impl FnOnce() -> String) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            print!("{}", text());
        }
        Ok(())
    }

    fn alerts(self, alerts: &[Alert]) -> Result<()> {
        if alerts.is_empty() {
            return Ok(());
        }
        self.print(&alerts, || alerts.iter().map(render::alert).collect())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ReserverConfig::discover(cli.global.config.as_deref())?
        .with_overrides(cli.global.overrides())?;
    rocket_telemetry::init_telemetry(config.telemetry())?;

    let output = Output {
        json: cli.global.json,
    };
    if matches!(cli.command, Commands::Config) {
        if output.json {
            println!("{}", serde_json::to_string_pretty(&config)?);
        } else {
            print!("{}", toml::to_string_pretty(&config)?);
        }
        return Ok(());
    }

    let credential_path = config.credential_path();
    let store: Arc<dyn CredentialStore> = Arc::new(FileCredentialStore::new(&credential_path));
    let client = config.build_client(Arc::clone(&store))?;
    let session = Session::new(client.clone(), store);
    tracing::debug!(
        endpoint = %client.endpoint(),
        credentials = %credential_path.display(),
        "client ready"
    );

    let result = run(cli.command, &client, &session, output).await;
    let metrics = client.metrics();
    tracing::debug!(
        requests = metrics.requests_total,
        retried = metrics.requests_retried,
        cache_hits = metrics.cache_hits,
        "done"
    );
    result.map_err(|err| {
        let login_required = matches!(
            err.downcast_ref::<ReserverError>(),
            Some(ReserverError::LoginRequired)
        );
        if login_required {
            err.context("run `rocket-reserver login <email>` first")
        } else {
            err
        }
    })
}

async fn run(
    command: Commands,
    client: &GraphqlClient,
    session: &Session,
    output: Output,
) -> Result<()> {
    match command {
        Commands::Launches { pages, all, limit } => {
            if all {
                let launches = load_all_launches(client, limit.map(PageLimit::new)).await?;
                return output.print(&launches, || render::launch_list(&launches, false));
            }
            let mut pager = LaunchPager::new(client.clone());
            let mut alerts = Vec::new();
            for _ in 0..pages.max(1) {
                if !pager.has_more() {
                    break;
                }
                alerts.extend(pager.load_more().await?.alerts);
            }
            output.print(&pager.launches(), || {
                render::launch_list(pager.launches(), pager.has_more())
            })?;
            output.alerts(&alerts)
        }
        Commands::Launch { id, reload } => {
            let mut flow = LaunchDetailFlow::new(client.clone(), session.clone(), id);
            let alerts = flow.load(reload).await?;
            if let Some(launch) = flow.launch() {
                output.print(launch, || render::launch_detail(launch))?;
            }
            output.alerts(&alerts)
        }
        Commands::Book { id } => {
            let mut flow = LaunchDetailFlow::new(client.clone(), session.clone(), id);
            let alerts = flow.book_or_cancel().await?;
            output.alerts(&alerts)?;
            if let Some(launch) = flow.launch() {
                output.print(launch, || render::launch_detail(launch))?;
            }
            Ok(())
        }
        Commands::Login { email } => {
            session
                .login(&email)
                .await
                .with_context(|| format!("login as {} failed", email.trim()))?;
            println!("Logged in as {}.", email.trim());
            Ok(())
        }
        Commands::Logout => {
            if session.logout()? {
                println!("Logged out.");
            } else {
                println!("Not logged in.");
            }
            Ok(())
        }
        Commands::Status => {
            if session.is_logged_in()? {
                println!("Logged in.");
            } else {
                println!("Not logged in.");
            }
            Ok(())
        }
        Commands::Watch { count } => watch(client, count, output).await,
        Commands::Config => Ok(()),
    }
}

async fn watch(client: &GraphqlClient, count: Option<usize>, output: Output) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = watch_trips(client, move |event| {
        let _ = tx.send(event);
    })
    .await?;
    eprintln!("Watching for bookings; press Ctrl-C to stop.");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut seen = 0;
    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                let message = event.message();
                output.print(&serde_json::json!({ "message": message }), || format!("{message}\n"))?;
                seen += 1;
                if count.is_some_and(|count| seen >= count) {
                    break;
                }
            }
            _ = &mut ctrl_c => break,
        }
    }
    handle.cancel();
    Ok(())
}
