pub mod adapters;
pub mod config;
pub mod domain;
pub mod infra;
pub mod services;

use {config::PollPolicy, services::reconciler::Reconciler, std::sync::Arc};

#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<Reconciler>,
    pub webhook_secret: Arc<str>,
    pub poll: PollPolicy,
}
