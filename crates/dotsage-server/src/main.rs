// DotSage server entry point.
//
// Startup sequence:
// 1. Initialize tracing
// 2. Load config (copying defaults on first run)
// 3. Open the question ledger
// 4. Build the LLM client and answer service
// 5. Spawn the ledger event feed
// 6. Serve the HTTP API until Ctrl+C / SIGTERM

use std::sync::Arc;

use anyhow::Context;
use dotsage_core::config;
use dotsage_core::feed::EventFeed;
use dotsage_core::ledger::QuestionLedger;
use dotsage_llm::client::LlmClient;
use dotsage_llm::AnswerService;
use dotsage_server::AppState;
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("DotSage starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: model={}, public_url={}",
        config.llm.model, config.server.public_url
    );

    // 3. Open the ledger
    let ledger = QuestionLedger::open(&config.database.path).context("failed to open ledger")?;
    info!(
        "Ledger opened at {} ({} questions)",
        config.database.path,
        ledger.count()?
    );

    // 4. LLM client and answer service
    let llm_client = LlmClient::from_config(&config);
    match &llm_client {
        LlmClient::Active(client) => info!("LLM client initialized (model {})", client.model()),
        LlmClient::Disabled => info!("LLM client disabled (no API key)"),
    }
    let answerer = Arc::new(AnswerService::new(llm_client));

    let host = config.server.host.clone();
    let port = config.server.port;
    let feed_port = config.feed.port;
    let state = AppState::new(config, ledger, answerer);

    // 5. Spawn the event feed (port 0 disables it)
    let feed_handle = if feed_port == 0 {
        info!("Event feed disabled");
        None
    } else {
        let feed = EventFeed::bind(&format!("{host}:{feed_port}"))
            .await
            .with_context(|| format!("failed to bind event feed on port {feed_port}"))?;
        let events = state.events.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = feed.run(events).await {
                error!("Event feed error: {e:#}");
            }
        }))
    };

    // 6. Serve the API
    let listener = TcpListener::bind(format!("{host}:{port}"))
        .await
        .with_context(|| format!("failed to bind HTTP listener on port {port}"))?;
    info!("DotSage backend listening on http://{}", listener.local_addr()?);

    dotsage_server::serve(listener, state).await?;

    // The feed loops forever.
    if let Some(handle) = feed_handle {
        handle.abort();
    }

    info!("DotSage shut down cleanly");
    Ok(())
}

/// Log to stdout, filtered by `RUST_LOG` (default `dotsage=info,warn`).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("dotsage=info,warn")),
        )
        .with_target(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
