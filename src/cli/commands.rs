//! Command handlers for the httpkit CLI
//!
//! This module implements the command handlers that connect CLI arguments
//! to the request engine.

use std::time::Instant;

use futures::future::join_all;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::app::cache::{format_bytes, DiskCache};
use crate::app::dispatch::ResponseEvent;
use crate::app::manager::{
    interrupt_channel, next_interrupt, HttpManager, InterruptListener, ManagerConfig,
};
use crate::app::models::Request;
use crate::cli::{CacheAction, CacheArgs, FetchArgs, GlobalArgs};
use crate::config::AppConfig;
use crate::constants::http;
use crate::errors::{AppError, Result};

/// Outcome of one fetched request, as observed through its events
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FetchOutcome {
    pub url: String,
    /// Last status delivered with a success or failure
    pub status: Option<i32>,
    pub bytes: usize,
    /// Served from the fresh cache without a network call
    pub from_cache: bool,
    pub retries: u32,
    pub error: Option<String>,
    pub cancelled: bool,
}

impl FetchOutcome {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Default::default()
        }
    }

    /// Fold one event into the outcome
    pub fn record(&mut self, event: &ResponseEvent) {
        match event {
            ResponseEvent::Success { status, body, .. } => {
                self.status = Some(*status);
                self.bytes = body.len();
                self.from_cache = *status == http::STATUS_LOCAL;
                self.error = None;
            }
            ResponseEvent::Failure { status, error, .. } => {
                self.status = Some(*status);
                self.error = Some(error.to_string());
            }
            ResponseEvent::Retry(attempt) => self.retries = *attempt,
            ResponseEvent::Cancelled => self.cancelled = true,
            ResponseEvent::Started | ResponseEvent::CacheHit { .. } | ResponseEvent::Finished => {}
        }
    }

    pub fn is_success(&self) -> bool {
        !self.cancelled && self.error.is_none() && self.status.is_some()
    }

    fn describe(&self) -> String {
        if self.cancelled {
            return format!("⏹️  {} cancelled", self.url);
        }
        match (&self.error, self.status) {
            (Some(error), Some(status)) if status > 0 => {
                format!("❌ {} -> {} ({})", self.url, status, error)
            }
            (Some(error), _) => format!("❌ {} -> {}", self.url, error),
            (None, Some(status)) => {
                let source = if self.from_cache { "cache" } else { "network" };
                let retries = if self.retries > 0 {
                    format!(", {} retries", self.retries)
                } else {
                    String::new()
                };
                format!(
                    "✅ {} -> {} ({}, {}{})",
                    self.url,
                    status,
                    format_bytes(self.bytes as u64),
                    source,
                    retries
                )
            }
            (None, None) => format!("❔ {} -> no response", self.url),
        }
    }
}

/// Build the engine configuration from the file config and global flags
pub fn manager_config(global: &GlobalArgs, config: &AppConfig) -> Result<ManagerConfig> {
    let mut config = config.clone();
    if let Some(dir) = &global.cache_dir {
        config.cache.cache_root = Some(dir.clone());
    }
    config.to_runtime_config()
}

/// Handle the fetch command
///
/// Performs every request concurrently and prints one line per request as
/// it completes. Ctrl-C cancels everything still in flight.
pub async fn handle_fetch(args: FetchArgs, global: &GlobalArgs, config: &AppConfig) -> Result<()> {
    args.validate().map_err(AppError::generic)?;

    let start_time = Instant::now();
    let manager = HttpManager::new(manager_config(global, config)?)?;
    if let Err(e) = manager.wait_for_cache().await {
        warn!("Fetching without cache: {}", e);
    }

    let (interrupt_tx, interrupt_rx) = interrupt_channel();
    let listener = InterruptListener::new(interrupt_tx).spawn();

    info!(
        "Fetching {} urls ({} requests)",
        args.urls.len(),
        args.request_count()
    );

    let mut pending = Vec::with_capacity(args.request_count());
    for url in &args.urls {
        for _ in 0..args.repeat {
            let request = build_request(url, &args);
            let (handle, events) = manager.perform_request_with_events(request);
            debug!("Request {} queued for {}", handle.id(), url);
            pending.push(collect_outcome(url.clone(), events, global.quiet));
        }
    }

    let all = join_all(pending);
    tokio::pin!(all);
    let outcomes = tokio::select! {
        outcomes = &mut all => outcomes,
        Some(interrupt) = next_interrupt(interrupt_rx) => {
            let cancelled = manager.cancel_all_requests();
            println!("⏹️  {}: cancelled {} requests", interrupt, cancelled);
            all.await
        }
    };
    listener.abort();

    let stats = manager.stats().await;
    manager.shutdown().await;

    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
    let from_cache = outcomes.iter().filter(|o| o.from_cache).count();
    if !global.quiet {
        println!();
        println!(
            "📊 {} of {} requests succeeded ({} from cache) in {:.2?}",
            succeeded,
            outcomes.len(),
            from_cache,
            start_time.elapsed()
        );
        if global.verbose || global.very_verbose {
            println!("{}", stats.summary());
        }
    }

    let failed = outcomes.len() - succeeded;
    if failed > 0 {
        return Err(AppError::generic(format!(
            "{} of {} requests did not succeed",
            failed,
            outcomes.len()
        )));
    }
    Ok(())
}

fn build_request(url: &str, args: &FetchArgs) -> Request {
    let mut request = Request::get(url)
        .with_priority(args.priority.into())
        .with_cache(!args.no_cache);
    if let Some(tag) = &args.tag {
        request = request.with_tag(tag.clone());
    }
    if let Some(retries) = args.max_retries {
        request = request.with_max_retries(retries);
    }
    request
}

/// Drain one request's events until it settles
async fn collect_outcome(
    url: String,
    mut events: UnboundedReceiver<ResponseEvent>,
    quiet: bool,
) -> FetchOutcome {
    let mut outcome = FetchOutcome::new(&url);
    while let Some(event) = events.recv().await {
        outcome.record(&event);
        if let ResponseEvent::Retry(attempt) = event {
            debug!("{} retry #{}", url, attempt);
        }
        if matches!(event, ResponseEvent::Finished | ResponseEvent::Cancelled) {
            break;
        }
    }
    if !quiet {
        println!("{}", outcome.describe());
    }
    outcome
}

/// Handle cache management commands
pub async fn handle_cache(args: CacheArgs, global: &GlobalArgs, config: &AppConfig) -> Result<()> {
    let runtime = manager_config(global, config)?;
    let Some(cache_config) = runtime.cache else {
        println!("💾 Disk cache is disabled in the configuration");
        return Ok(());
    };

    let cache = DiskCache::new(cache_config)?;
    cache.initialize().await?;

    match args.action {
        CacheAction::Info => handle_cache_info(&cache).await,
        CacheAction::Clear => handle_cache_clear(&cache).await?,
    }

    cache.close().await;
    Ok(())
}

/// Handle cache info display
async fn handle_cache_info(cache: &DiskCache) {
    let stats = cache.stats().await;

    println!("💾 Cache Information");
    println!("===================");
    println!("Location: {}", stats.directory.display());
    println!("Entries: {}", stats.entry_count);
    println!(
        "Size: {} of {} ({:.1}%)",
        stats.format_cache_size(),
        stats.format_max_size(),
        stats.usage_percentage()
    );
}

/// Handle cache clearing
async fn handle_cache_clear(cache: &DiskCache) -> Result<()> {
    let before = cache.stats().await;
    cache.clear().await?;

    println!("🧹 Cache Cleared");
    println!("===============");
    println!(
        "Removed {} entries ({})",
        before.entry_count,
        before.format_cache_size()
    );
    Ok(())
}
