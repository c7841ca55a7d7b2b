//! Command-line argument parsing for httpkit
//!
//! This module defines the CLI structure using clap derive macros: fetching
//! URLs through the request engine and inspecting or clearing the disk cache.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::app::models::Priority;

/// httpkit - prioritised, cached HTTP fetching
#[derive(Parser, Debug)]
#[command(
    name = "httpkit",
    version,
    about = "Fetch URLs through a prioritised, deduplicating, cached request engine",
    long_about = "Fetches URLs on a bounded priority worker pool. Concurrent fetches of the same URL
share one network call, responses are kept in a TTL-aware disk cache, and Ctrl-C cancels
every in-flight request."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (trace level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - only errors are logged
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Cache directory path
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch one or more URLs
    Fetch(FetchArgs),

    /// Disk cache management
    Cache(CacheArgs),
}

/// Arguments for the fetch command
#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// URLs to fetch
    #[arg(value_name = "URL", required = true)]
    pub urls: Vec<String>,

    /// Request every URL this many times concurrently
    #[arg(short, long, default_value = "1")]
    pub repeat: usize,

    /// Tag the requests belong to
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Scheduling priority
    #[arg(short, long, value_enum, default_value = "normal")]
    pub priority: PriorityArg,

    /// Bypass the disk cache
    #[arg(long)]
    pub no_cache: bool,

    /// Retries after the first attempt
    #[arg(long)]
    pub max_retries: Option<u32>,
}

/// Request priority as accepted on the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityArg {
    Low,
    Normal,
    High,
    Immediate,
}

impl From<PriorityArg> for Priority {
    fn from(arg: PriorityArg) -> Self {
        match arg {
            PriorityArg::Low => Priority::Low,
            PriorityArg::Normal => Priority::Normal,
            PriorityArg::High => Priority::High,
            PriorityArg::Immediate => Priority::Immediate,
        }
    }
}

/// Arguments for cache management
#[derive(Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache management actions
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show cache statistics and information
    Info,

    /// Remove every cached response
    Clear,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Log level directive, falling back to the configured level
    pub fn log_level(&self, configured: &str) -> String {
        if self.global.quiet {
            "error".to_string()
        } else if self.global.very_verbose {
            "trace".to_string()
        } else if self.global.verbose {
            "debug".to_string()
        } else {
            configured.to_string()
        }
    }
}

impl FetchArgs {
    /// Check argument consistency
    pub fn validate(&self) -> Result<(), String> {
        if self.repeat == 0 {
            return Err("--repeat must be greater than 0".to_string());
        }
        if let Some(url) = self.urls.iter().find(|u| u.trim().is_empty()) {
            return Err(format!("Invalid empty URL '{}'", url));
        }
        Ok(())
    }

    /// Total number of requests this invocation performs
    pub fn request_count(&self) -> usize {
        self.urls.len() * self.repeat
    }
}
