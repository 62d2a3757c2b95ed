use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use yuki_bot::config::Config;
use yuki_bot::db::ledger::{Ledger, PgLedger};
use yuki_bot::query::QueryClient;
use yuki_bot::{Driver, SessionService};

#[tokio::main]
async fn main() {
    // .env is optional; variables may come from the environment.
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    let pool = yuki_bot::db::pool::connect(&config.database_url)
        .expect("failed to build connection pool");
    let ledger: Arc<dyn Ledger> = Arc::new(PgLedger::new(pool));

    let (client, events) = match QueryClient::start(&config).await {
        Ok(started) => started,
        Err(err) => {
            tracing::error!(%err, host = %config.host, "could not start serverquery session");
            std::process::exit(1);
        }
    };
    let client = Arc::new(client);
    let keepalive = client.spawn_keepalive();

    tracing::info!(
        host = %config.host,
        nickname = %config.nickname,
        growth_base = config.growth_base,
        rank_groups = ?config.rank_calculator().group_range(),
        "yuki-bot configured"
    );

    let service: Arc<dyn SessionService> = client;
    let mut driver = Driver::from_config(&config, service, ledger);
    driver.run(events, shutdown_signal()).await;

    keepalive.abort();
    tracing::info!("yuki-bot stopped");
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(%err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
