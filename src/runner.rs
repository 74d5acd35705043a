use std::path::PathBuf;

use log::info;
use url::Url;

use crate::browser::{Session, SessionOptions};
use crate::error::Result;
use crate::memory::Memory;
use crate::strategies::juice_shop::{JuiceShopStrategy, ShopperProfile};
use crate::strategies::{AgentContext, LlmConfig, Strategy};
use crate::trace::metadata;
use crate::trace::writer::ActionLogger;

pub struct RunOptions {
    pub base_url: Url,
    pub headless: bool,
    pub model: String,
    pub temperature: f64,
    pub log_file: PathBuf,
    pub snapshot_dir: PathBuf,
    pub no_sandbox: bool,
}

pub struct SmokeOptions {
    pub base_url: Url,
    pub headless: bool,
    pub steps: usize,
    pub snapshot: bool,
    pub log_file: PathBuf,
    pub snapshot_dir: PathBuf,
    pub no_sandbox: bool,
}

fn session_options(
    headless: bool,
    no_sandbox: bool,
    snapshot_dir: PathBuf,
) -> SessionOptions {
    SessionOptions {
        headless,
        no_sandbox,
        snapshot_dir,
        ..SessionOptions::default()
    }
}

/// Walk the storefront playbook end-to-end. The action log is flushed on
/// every exit path, and the browser is torn down even when a step fails.
pub async fn run_storefront(options: RunOptions) -> Result<()> {
    let llm = LlmConfig::from_env(options.model.clone(), options.temperature)?;
    info!("driving storefront at {}", options.base_url);

    let logger = ActionLogger::to_stderr(options.log_file.clone());
    let context = AgentContext {
        base_url: options.base_url.clone(),
        headless: options.headless,
        llm,
        logger: logger.clone(),
        memory: Memory::new(),
    };
    let profile = ShopperProfile::random(&mut rand::rng());
    let mut strategy = JuiceShopStrategy::new(context, profile);
    let mut session = Session::new(
        session_options(options.headless, options.no_sandbox, options.snapshot_dir),
        logger.clone(),
    );

    logger
        .scoped(async {
            session.open().await?;
            let result = strategy.run(&mut session).await;
            let closed = session.close().await;
            if let (Err(_), Err(close_error)) = (&result, &closed) {
                log::error!("teardown after failed run also failed: {}", close_error);
            }
            result.and(closed)
        })
        .await?;

    info!(
        "storefront walk complete, {} decisions remembered",
        strategy.context().memory.len()
    );
    Ok(())
}

/// Lightweight visit to an arbitrary URL: land, optionally snapshot, follow
/// a bounded number of outbound links.
pub async fn run_smoke(options: SmokeOptions) -> Result<()> {
    info!("smoke test against {}", options.base_url);

    let logger = ActionLogger::to_stderr(options.log_file.clone());
    let mut session = Session::new(
        session_options(
            options.headless,
            options.no_sandbox,
            options.snapshot_dir.clone(),
        ),
        logger.clone(),
    );

    logger
        .scoped(async {
            session.open().await?;
            let result = smoke_walk(&session, &logger, &options).await;
            let closed = session.close().await;
            result.and(closed)
        })
        .await
}

async fn smoke_walk(
    session: &Session,
    logger: &ActionLogger,
    options: &SmokeOptions,
) -> Result<()> {
    session.goto(options.base_url.as_str()).await?;
    if options.snapshot {
        session.snapshot_dom("smoke_landing").await?;
    }
    let links = session.links().await?;
    info!("found {} outbound links", links.len());
    for (index, href) in links.iter().take(options.steps).enumerate() {
        let url = session.current_url().await;
        logger
            .record("follow_link", &url, metadata([("target", href.as_str())]))
            .await;
        session.goto(href).await?;
        if options.snapshot {
            session
                .snapshot_dom(&format!("smoke_step_{}", index + 1))
                .await?;
        }
    }
    Ok(())
}
