#![warn(clippy::all, clippy::pedantic)]

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use actix_web::{App, HttpServer, middleware, web};
use anyhow::Context;
use clap::Parser;
use pulseboard_service::database::initialize_database;
use pulseboard_service::{
    Config, CycleRunner, CycleState, EventBus, HttpProber, LibsqlTargetStore, ProbeLimiter,
    Scheduler, TargetStore, pool,
};
use tracing::{info, warn};

mod auth;
mod error;
mod routes;
mod state;

use auth::{Credentials, basic_auth};
use error::AppError;
use logger::init_tracing;
use state::AppState;

#[derive(Debug, Parser)]
#[command(version, about = "Periodic reachability checks with a live event stream")]
struct Cli {
    /// Path to the TOML config, created with defaults if missing
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let mut config = Config::from_config(cli.config.as_ref())?;
    config.apply_env()?;
    info!("{config}");

    let credentials = Credentials::from_config(&config.auth);
    if credentials.is_some() {
        info!("Basic authentication is enabled");
    } else {
        warn!(
            "Basic authentication is NOT enabled! Set ACCESS_USERNAME and ACCESS_PASSWORD to enable it."
        );
    }

    let pool = pool::open_local(&config.database.path, config.database.pool_size)
        .await
        .context("Failed to open database")?;
    {
        let conn = pool.get().await.context("Failed to get a database connection")?;
        initialize_database(&conn).await?;
    }
    let store: Arc<dyn TargetStore> = Arc::new(LibsqlTargetStore::new_from_pool(pool));

    let cycle = Arc::new(CycleState::new(config.pinger.cycle_interval()));
    let bus = Arc::new(EventBus::new(cycle.clone()));
    let prober = HttpProber::new().context("Failed to build HTTP client")?;
    let runner = Arc::new(CycleRunner::new(
        store.clone(),
        Arc::new(prober),
        ProbeLimiter::new(config.pinger.max_concurrent_probes),
        bus.clone(),
        cycle.clone(),
        config.pinger.probe_timeout(),
    ));

    let scheduler = Scheduler::new(runner);
    scheduler.start();

    let state = web::Data::new(AppState { store, bus, cycle, credentials });
    let ip: IpAddr = config.server.bind.parse()?;
    let addr = SocketAddr::new(ip, config.server.port);
    info!(%addr, "Starting HTTP server");

    run_server(addr, state).await?;

    drop(scheduler);
    info!("Server stopped");
    Ok(())
}

async fn run_server(addr: SocketAddr, state: web::Data<AppState>) -> Result<(), AppError> {
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(routes::json_config())
            .wrap(middleware::from_fn(basic_auth))
            .configure(routes::routes)
    })
    .bind(addr)?
    .run()
    .await?;

    Ok(())
}
