use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;

use grantbuddy::agent::{Agent, AgentDeps};
use grantbuddy::channels::CliChannel;
use grantbuddy::config::{AppConfig, load_system_prompt};
use grantbuddy::document::PlainTextIngestor;
use grantbuddy::llm::{LlmBackend, LlmConfig, create_gateway, create_search};
use grantbuddy::store::{LibSqlBackend, TranscriptLog};
use grantbuddy::wizard::StageMachine;

/// Initialize tracing. Logs go to a daily file when `log_dir` is set, since
/// the CLI owns the terminal; otherwise to stderr.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "grantbuddy.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; real environment variables still apply.
    let _ = dotenvy::dotenv();

    let config = AppConfig::from_env().context("Failed to read configuration")?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    let system_prompt = load_system_prompt(&config.instructions_path).await;

    // ── LLM ──────────────────────────────────────────────────────────────
    let gateway = create_gateway(&LlmConfig {
        backend: LlmBackend::Gemini,
        api_key: config.google_api_key.clone(),
        request_timeout: config.request_timeout,
    })
    .context("Failed to create Gemini client")?;

    let search = create_search(config.perplexity_api_key.as_ref(), config.request_timeout)
        .context("Failed to create search client")?;

    // ── Transcript log ───────────────────────────────────────────────────
    let log: Option<Arc<dyn TranscriptLog>> = match &config.db_path {
        Some(path) => {
            let backend = LibSqlBackend::new_local(path)
                .await
                .with_context(|| format!("Failed to open database at {}", path.display()))?;
            Some(Arc::new(backend))
        }
        None => None,
    };

    eprintln!("📝 Grantbuddy v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Model: {} (temperature {})",
        config.model,
        config.temperature.value()
    );
    eprintln!(
        "   Web lookup: {}",
        if search.is_some() { "enabled" } else { "disabled" }
    );
    match &config.db_path {
        Some(path) => eprintln!("   History: {}", path.display()),
        None => eprintln!("   History: not saved"),
    }
    eprintln!("   Type a message and press Enter. /help for commands, /quit to exit.\n");

    // ── Agent ────────────────────────────────────────────────────────────
    let deps = AgentDeps {
        gateway,
        log,
        search,
        ingestor: Arc::new(PlainTextIngestor),
        machine: Arc::new(StageMachine::grant_proposal()?),
        system_prompt,
        session_config: config.session_config(),
        request_timeout: config.request_timeout,
    };

    let agent = Agent::new(deps, Arc::new(CliChannel::new()));
    agent.run().await?;

    Ok(())
}
