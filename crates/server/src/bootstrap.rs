use std::sync::Arc;

use axum::Router;
use helpdesk_chat::deferred::DeferredTasks;
use helpdesk_chat::{
    community_dispatcher, BotSettings, ChatGateway, CommunityRepositories, GatewayRunner,
    GatewayTransport, NoopGatewayTransport, OfflineGateway,
};
use helpdesk_core::config::AppConfig;
use helpdesk_db::{JsonAllowanceRepository, JsonFeedbackRepository, JsonStore, JsonTicketRepository};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::api;

pub struct Application {
    pub config: AppConfig,
    pub listener: TcpListener,
    pub router: Router,
    pub gateway_runner: GatewayRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("could not bind dashboard listener on `{address}`: {source}")]
    Bind { address: String, source: std::io::Error },
}

/// Wires the store, repositories, chat dispatcher and HTTP listener for an
/// already-loaded config. No platform connection is made.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    bootstrap_with_chat(config, Arc::new(OfflineGateway), Arc::new(NoopGatewayTransport)).await
}

pub async fn bootstrap_with_chat(
    config: AppConfig,
    gateway: Arc<dyn ChatGateway>,
    transport: Arc<dyn GatewayTransport>,
) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        data_path = %config.storage.data_path.display(),
        "starting application bootstrap"
    );

    let store = Arc::new(JsonStore::new(&config.storage.data_path));
    match store.inspect().await {
        Ok(document) => info!(
            event_name = "system.bootstrap.store_loaded",
            correlation_id = "bootstrap",
            feedback_records = document.feedback.len(),
            tickets = document.tickets.len(),
            "data store loaded"
        ),
        Err(error) => warn!(
            event_name = "system.bootstrap.store_unreadable",
            correlation_id = "bootstrap",
            error = %error,
            "data store unreadable; starting from an empty document"
        ),
    }
    if !config.server.static_dir.is_dir() {
        warn!(
            event_name = "system.bootstrap.static_dir_missing",
            correlation_id = "bootstrap",
            static_dir = %config.server.static_dir.display(),
            "static directory not found; dashboard pages will 404"
        );
    }

    let feedback = Arc::new(JsonFeedbackRepository::new(store.clone()));
    let dispatcher = community_dispatcher(
        gateway,
        CommunityRepositories {
            feedback: feedback.clone(),
            allowances: Arc::new(JsonAllowanceRepository::new(store.clone())),
            tickets: Arc::new(JsonTicketRepository::new(store)),
        },
        Arc::new(BotSettings::from_config(&config)),
        DeferredTasks::new(),
    );
    info!(
        event_name = "system.bootstrap.dispatcher_ready",
        correlation_id = "bootstrap",
        handlers = dispatcher.handler_count(),
        "chat dispatcher initialized"
    );

    let address = config.listen_address();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| BootstrapError::Bind { address: address.clone(), source })?;

    Ok(Application {
        router: api::router(feedback, &config.server.static_dir),
        config,
        listener,
        gateway_runner: GatewayRunner::new(transport, dispatcher),
    })
}
