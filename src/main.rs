use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::response::Html;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pdf2zh_server::config::AppConfig;
use pdf2zh_server::jobs::{self, JobStore};
use pdf2zh_server::{cleanup, upload, AppState};

/// Upload cap. Scanned papers run large; 100 MiB is generous headroom.
const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // .env is honored for credentials and overrides, like the CLI tool itself.
    dotenvy::dotenv().ok();

    tracing::info!("Starting pdf2zh-server...");

    let config = Arc::new(AppConfig::from_env());
    tokio::fs::create_dir_all(&config.results_dir)
        .await
        .expect("Failed to create results directory");
    tokio::fs::create_dir_all(&config.uploads_dir)
        .await
        .expect("Failed to create uploads directory");

    // Initialize broadcast channel for SSE job events
    let (tx, _rx) = tokio::sync::broadcast::channel(100);
    let (queue_tx, queue_rx) = tokio::sync::mpsc::channel(32);
    let store = JobStore::new();

    let state = AppState {
        store: store.clone(),
        config: config.clone(),
        queue: queue_tx,
        tx: tx.clone(),
    };

    // Start the translation worker in the background
    let worker_config = config.clone();
    tokio::spawn(async move {
        jobs::run_worker(store, worker_config, queue_rx, tx).await;
    });

    // Start results GC task
    let gc_config = config.clone();
    tokio::spawn(async move {
        cleanup::start_gc_task(gc_config).await;
    });

    // Build router
    let app = Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/api/translate", post(upload::translate))
        .route("/api/jobs", get(jobs::list_jobs))
        .route("/api/jobs/:id", get(jobs::get_job))
        .route("/api/events", get(sse_handler))
        .nest_service("/api/results", ServeDir::new(&config.results_dir))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);

    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

// SSE Handler
use axum::response::sse::{Event, Sse};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;

async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::info!("New SSE connection established");
    let rx = state.tx.subscribe();

    let stream = tokio_stream::wrappers::BroadcastStream::new(rx).map(|msg| match msg {
        Ok(event) => {
            let data = serde_json::to_string(&event).unwrap_or_default();
            Ok(Event::default().data(data))
        }
        Err(_lag) => {
            tracing::warn!("SSE stream lagged");
            Ok(Event::default().comment("lagged"))
        }
    });

    Sse::new(stream).keep_alive(axum::response::sse::KeepAlive::default())
}

async fn index() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
