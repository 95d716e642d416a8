//! Testograph: result-funnel engine and admin reporting service.
//!
//! `serve` runs the HTTP API; `simulate` drives one visitor through the
//! funnel on a manual clock and prints the final view.

use clap::{Parser, Subcommand};
use std::sync::Arc;
use testograph_api::ApiServer;
use testograph_content::{GuideStore, OutlineGenerator};
use testograph_core::config::AppConfig;
use testograph_core::types::QuizCategory;
use testograph_funnel::persistence::UserData;
use testograph_funnel::{
    FileStorage, FunnelEvent, FunnelOrchestrator, FunnelStorage, ManualClock, MemoryStorage, Step,
};
use testograph_reporting::seed::seed_demo_data;
use testograph_reporting::{QuizFlowReport, QuizFlowStore};
use tracing::{error, info, warn};

/// Demo sessions seeded per quiz category.
const DEMO_SESSIONS_PER_CATEGORY: usize = 120;

#[derive(Parser, Debug)]
#[command(name = "testograph")]
#[command(about = "Result-funnel engine and quiz-flow reporting service")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, global = true, env = "TESTOGRAPH__NODE_ID")]
    node_id: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default)
    Serve {
        /// Bind address (overrides config)
        #[arg(long, env = "TESTOGRAPH__API__HOST")]
        host: Option<String>,

        /// HTTP port (overrides config)
        #[arg(long, env = "TESTOGRAPH__API__HTTP_PORT")]
        http_port: Option<u16>,

        /// Seed demo quiz-flow data regardless of config
        #[arg(long, default_value_t = false)]
        seed_demo: bool,
    },
    /// Walk one visitor through the funnel and print the final view as JSON
    Simulate {
        #[arg(long)]
        category: Option<QuizCategory>,

        #[arg(long)]
        first_name: Option<String>,

        /// Offers to decline once step 8 is reached (3 ends on the free plan)
        #[arg(long, default_value_t = 0)]
        declines: u8,

        /// Click the offer on screen after declining
        #[arg(long, default_value_t = false)]
        buy: bool,

        /// Use the skip button wherever it is offered
        #[arg(long, default_value_t = false)]
        skip: bool,

        /// Persist progress under funnel.storage_dir instead of memory
        #[arg(long, default_value_t = false)]
        persist: bool,

        /// Simulated milliseconds per tick
        #[arg(long, default_value_t = 200)]
        tick_ms: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "testograph=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }

    match cli.command.unwrap_or(Command::Serve {
        host: None,
        http_port: None,
        seed_demo: false,
    }) {
        Command::Serve {
            host,
            http_port,
            seed_demo,
        } => {
            if let Some(host) = host {
                config.api.host = host;
            }
            if let Some(port) = http_port {
                config.api.http_port = port;
            }
            if seed_demo {
                config.reporting.seed_demo_data = true;
            }
            serve(config).await
        }
        Command::Simulate {
            category,
            first_name,
            declines,
            buy,
            skip,
            persist,
            tick_ms,
        } => simulate(
            &config,
            SimulateOptions {
                category,
                first_name,
                declines,
                buy,
                skip,
                persist,
                tick_ms,
            },
        ),
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    info!(
        node_id = %config.node_id,
        host = %config.api.host,
        http_port = config.api.http_port,
        metrics_port = config.metrics.port,
        "Testograph starting up"
    );

    let store = Arc::new(QuizFlowStore::new());
    if config.reporting.seed_demo_data {
        seed_demo_data(
            &store,
            chrono::Utc::now(),
            DEMO_SESSIONS_PER_CATEGORY,
            config.reporting.quiz_last_step,
            0x7e57,
        );
    }

    let report = QuizFlowReport::new(store, config.reporting.clone());
    let api_server = ApiServer::new(
        config.clone(),
        report,
        Arc::new(GuideStore::new()),
        Arc::new(OutlineGenerator),
    );

    if let Err(e) = api_server.start_metrics() {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("Testograph is ready to serve traffic");

    tokio::select! {
        result = api_server.start_http() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal, stopping gracefully");
        }
    }

    info!("Testograph shut down");
    Ok(())
}

struct SimulateOptions {
    category: Option<QuizCategory>,
    first_name: Option<String>,
    declines: u8,
    buy: bool,
    skip: bool,
    persist: bool,
    tick_ms: i64,
}

/// Ticks allowed before the walk to the offers is abandoned.
const MAX_TICKS: usize = 100_000;

fn simulate(config: &AppConfig, opts: SimulateOptions) -> anyhow::Result<()> {
    let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
    let storage: Arc<dyn FunnelStorage> = if opts.persist {
        Arc::new(FileStorage::new(&config.funnel.storage_dir))
    } else {
        Arc::new(MemoryStorage::new())
    };
    let store = Arc::new(QuizFlowStore::new());

    let mut funnel = FunnelOrchestrator::new(config, storage, clock.clone())?.with_event_sink(store.clone());
    let user_data = UserData {
        first_name: opts.first_name,
        ..UserData::default()
    };
    let mounted = funnel.mount(Some(user_data), opts.category);
    info!(
        session_id = %mounted.session_id,
        step = %mounted.step,
        restored = mounted.restored,
        "Simulated visitor mounted"
    );

    let tick_ms = opts.tick_ms.max(1);
    let mut ticks = 0;
    loop {
        let Some(state) = funnel.state() else { break };
        if state.step == Step::OFFER || !state.phase.is_live() {
            break;
        }
        if ticks >= MAX_TICKS {
            anyhow::bail!("funnel did not reach the offers after {MAX_TICKS} ticks");
        }
        if opts.skip && funnel.view().is_some_and(|v| v.can_skip) {
            funnel.dispatch(FunnelEvent::Skip);
        }
        clock.advance_ms(tick_ms);
        funnel.tick();
        ticks += 1;
    }

    for _ in 0..opts.declines {
        funnel.dispatch(FunnelEvent::Decline);
    }
    if opts.buy {
        funnel.dispatch(FunnelEvent::OfferClicked);
    }

    info!(
        ticks,
        tracked = store.step_event_count(),
        redirect = funnel.last_redirect().unwrap_or("-"),
        "Simulation finished"
    );

    let view = funnel
        .view()
        .ok_or_else(|| anyhow::anyhow!("funnel has no state to render"))?;
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}
