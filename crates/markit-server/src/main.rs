mod api;
mod middleware;
mod scheduler;

use std::{sync::Arc, time::Duration};

use markit_agents::{
    BriefService, ChatOrchestrator, ChatService, InMemorySessionStore, SessionStore,
};
use markit_airtable::{AirtableClient, RecordStore};
use markit_llm::{ImageProvider, OpenAiClient, Provider};
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(markit_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let prompts = Arc::new(markit_core::load_prompts(&config.prompts_path)?);
    tracing::info!(
        version = %prompts.version,
        fanout_tasks = prompts.fanout.len(),
        sub_agents = prompts.sub_agents.len(),
        "prompt set loaded"
    );

    let openai = Arc::new(
        OpenAiClient::with_base_url(
            &config.openai_api_key,
            &config.model,
            &config.image_model,
            config.provider_timeout_secs,
            &config.openai_base_url,
        )?
        .with_retries(config.provider_max_retries, config.provider_backoff_base_ms),
    );
    let provider: Arc<dyn Provider> = openai.clone();
    let images: Option<Arc<dyn ImageProvider>> = if config.images_enabled {
        Some(openai)
    } else {
        None
    };

    let store: Option<Arc<dyn RecordStore>> = match &config.airtable {
        Some(airtable) => Some(Arc::new(AirtableClient::new(
            &airtable.api_key,
            &airtable.base_id,
            &airtable.table,
            airtable.timeout_secs,
        )?)),
        None => {
            tracing::warn!("AIRTABLE_API_KEY/AIRTABLE_BASE_ID not set; briefs will not be persisted");
            None
        }
    };

    let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new(
        Duration::from_secs(config.session_ttl_secs),
    ));
    let _scheduler =
        scheduler::build_scheduler(Arc::clone(&sessions), &config.session_sweep_cron).await?;

    let orchestrator = Arc::new(ChatOrchestrator::standard(
        Arc::clone(&provider),
        Arc::clone(&prompts),
        images,
    ));
    let state = AppState {
        brief: BriefService::new(provider, store.clone(), Arc::clone(&prompts)),
        chat: ChatService::new(orchestrator, sessions, store, prompts),
    };

    let auth = AuthState::from_env(matches!(
        config.env,
        markit_core::Environment::Development
    ))?;
    let app = build_app(state, auth, default_rate_limit_state());

    tracing::info!(
        bind_addr = %config.bind_addr,
        env = %config.env,
        model = %config.model,
        "markit server listening"
    );
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
