use std::net::SocketAddr;
use std::sync::Arc;

use ai::OpenAiCompatibleClient;
use chat::{AppState, ChatSettings};
use config::{LogConfig, SqlChatConfig};
use db::SqliteDatabase;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(log: &LogConfig) {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => match log.level.parse::<EnvFilter>() {
            Ok(filter) => filter,
            Err(err) => {
                eprintln!(
                    "WARN: log level '{}' is not a valid tracing filter ({err}); falling back to 'info'",
                    log.level
                );
                EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    if log.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let conf = SqlChatConfig::load()?;
    init_tracing(&conf.log);
    info!(version = env!("CARGO_PKG_VERSION"), "sqlchat starting");

    let database = SqliteDatabase::connect(&conf.database.url).await?;
    if database.bootstrap(conf.database.seed_demo_data).await? {
        info!(url = %conf.database.url, "initialised new database");
    }
    for problem in database.verify_schema().await? {
        warn!(%problem, "database does not match the schema given to the model");
    }
    info!(url = %conf.database.url, "database ready");

    let model = OpenAiCompatibleClient::from_config(&conf.ai, conf.api_key()?)?;
    info!(model = %model.model(), url = %conf.ai.url, "model client ready");

    let state = Arc::new(AppState::new(
        Arc::new(model),
        Arc::new(database),
        ChatSettings::from_config(&conf),
    ));
    let app = chat::router(state);

    let addr: SocketAddr = conf.server.bind.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("sqlchat stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl-C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => warn!(error = %err, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!("shutdown signal received");
}
