use std::net::SocketAddr;
use std::sync::Arc;

use beskard::api;
use beskard::bus::{EventPublisher, HttpBus, MessageBus};
use beskard::clock::SystemClock;
use beskard::config::Config;
use beskard::db::{init_db, KeyedLocks, Repository};
use beskard::domain::Venue;
use beskard::lifecycle::LifecycleEngine;
use beskard::liquidation::{
    recover_in_flight, spawn_worker_pool, LiquidationContext, LiquidationQueue,
    DEFAULT_QUEUE_CAPACITY,
};
use beskard::ltv::LtvEvaluator;
use beskard::pricing::{run_price_ingest, PriceBoard};
use beskard::venue::{BlackSpireClient, MosEspaClient, VenueClient};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let port = config.port;

    // Initialize database and shared services
    let pool = match init_db(&config.database_path).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let repo = Arc::new(Repository::new(pool));
    let locks = Arc::new(KeyedLocks::new());
    let clock = Arc::new(SystemClock);
    let bus: Arc<dyn MessageBus> = Arc::new(HttpBus::new(config.bus_endpoint.clone()));
    let publisher = EventPublisher::new(bus.clone(), config.loan_events_topic.clone());
    let board = Arc::new(PriceBoard::new(clock.clone(), config.max_tick_age_seconds));

    // Price ingest: one task per venue feed
    for venue in Venue::ALL {
        tokio::spawn(run_price_ingest(
            bus.clone(),
            board.clone(),
            clock.clone(),
            venue,
        ));
    }

    // Liquidation pipeline: queue, restart scan, worker pool
    let (queue, queue_rx) = LiquidationQueue::bounded(DEFAULT_QUEUE_CAPACITY);
    let mos_espa: Arc<dyn VenueClient> = Arc::new(MosEspaClient::new(
        config.venue_a_url.clone(),
        config.venue_http_timeout_ms,
    ));
    let black_spire: Arc<dyn VenueClient> = Arc::new(BlackSpireClient::new(
        config.venue_b_url.clone(),
        config.venue_http_timeout_ms,
    ));
    let liquidation_ctx = Arc::new(LiquidationContext {
        repo: repo.clone(),
        board: board.clone(),
        publisher: publisher.clone(),
        mos_espa,
        black_spire,
        clock: clock.clone(),
        retry_cap_ms: config.venue_retry_cap_ms,
    });

    if let Err(e) = recover_in_flight(&repo, &queue).await {
        eprintln!("Failed to recover in-flight liquidations: {}", e);
        std::process::exit(1);
    }

    let process_id = uuid::Uuid::new_v4().to_string();
    spawn_worker_pool(
        liquidation_ctx,
        queue_rx,
        config.liquidation_workers,
        &process_id,
    );

    // LTV evaluator
    let evaluator = Arc::new(LtvEvaluator::new(
        repo.clone(),
        locks.clone(),
        board.clone(),
        publisher.clone(),
        queue.clone(),
        clock.clone(),
        config.activation_threshold_pct,
        config.liquidation_threshold_pct,
    ));
    tokio::spawn(evaluator.run());

    // HTTP surface
    let engine = LifecycleEngine::new(repo, locks, publisher, clock);
    let app = api::create_router(api::AppState::new(engine));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!(instance = %process_id, "Server listening on {}", addr);

    // Run server; in-flight liquidations are recovered by the next instance.
    let serve = axum::serve(listener, app).with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutdown signal received");
    });
    if let Err(e) = serve.await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
