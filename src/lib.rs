pub mod backend;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod events;
pub mod jobs;
pub mod progress;
pub mod results;
pub mod runner;
pub mod upload;

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

#[derive(Clone)]
pub struct AppState {
    pub store: jobs::JobStore,
    pub config: Arc<config::AppConfig>,
    pub queue: mpsc::Sender<jobs::QueuedJob>,
    pub tx: broadcast::Sender<events::JobEvent>,
}
