use envconfig::Envconfig;
use relay_counter::config::Config;
use relay_counter::logging::init_logging;
use relay_counter::realtime::DirectoryWatcher;
use relay_counter::server::{AppState, app};
use relay_counter::store::RedisCounterStore;
use std::sync::Arc;

async fn listen(app: axum::Router, bind: String) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}

#[tokio::main]
async fn main() {
    let config = Config::init_from_env().expect("failed to load configuration from env");

    let _log_guard = init_logging(config.logging()).expect("failed to initialize logging");

    let redis = config.redis().expect("invalid redis configuration");
    let store = RedisCounterStore::new(&redis).expect("failed to create redis client");

    let watcher = DirectoryWatcher::new(config.watch(), Arc::new(store));
    let state = AppState::new(watcher, config.default_directory());

    tracing::info!(bind = %config.bind(), "starting relay-counter");

    if let Err(e) = listen(app(state.clone()), config.bind()).await {
        tracing::error!("failed to start relay-counter http server, {}", e);
    }

    let stopped = tokio::task::spawn_blocking(move || state.stop_all())
        .await
        .unwrap_or(0);
    tracing::info!(stopped, "relay-counter shut down");
}
