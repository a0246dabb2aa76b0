use {
    pix_sync::{
        AppState,
        adapters::{http::router, mangofy::MangofyGateway, utmify::UtmifyForwarder},
        config::Config,
        infra::postgres::pending_event_repo::PgPendingEventStore,
        services::{
            reconciler::Reconciler,
            sweep::{run_sweeper, sweep_once},
        },
    },
    sqlx::postgres::PgPoolOptions,
    std::{sync::Arc, time::Duration},
    tokio::{signal, sync::watch},
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::from_env().expect("invalid configuration");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(3))
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .expect("failed to build http client");

    let gateway = MangofyGateway::new(http.clone(), config.mangofy.clone())
        .expect("invalid gateway configuration");
    let forwarder = UtmifyForwarder::new(http, config.utmify.clone());

    let reconciler = Arc::new(Reconciler::new(
        Arc::new(PgPendingEventStore::new(pool)),
        Arc::new(gateway),
        Arc::new(forwarder),
    ));

    // `pix_sync sweep` runs a single pass and exits, for cron-style scheduling.
    if std::env::args().nth(1).as_deref() == Some("sweep") {
        let report = sweep_once(&reconciler, &config.sweep, chrono::Utc::now()).await;
        tracing::info!(?report, "sweep finished");
        return;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(run_sweeper(
        reconciler.clone(),
        config.sweep.clone(),
        shutdown_rx,
    ));

    let state = AppState {
        reconciler,
        webhook_secret: config.webhook_secret.clone().into(),
        poll: config.poll,
    };

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("failed to bind listener");
    tracing::info!("listening on {}", config.listen_addr);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    let _ = shutdown_tx.send(true);
    let _ = sweeper.await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl+c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
