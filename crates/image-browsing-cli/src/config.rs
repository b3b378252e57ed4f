//! Command-line arguments and runtime configuration

use crate::error::{CliError, Result};
use clap::{Parser, Subcommand};
use image_browsing_cache::CacheConfig;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "image-browsing", version, about = "Browse image-browsing folders through the listing cache")]
pub struct Cli {
    /// Base URL of the host application
    #[arg(long, env = "IMAGE_BROWSING_URL", default_value = "http://127.0.0.1:8188")]
    pub url: String,

    /// Request timeout in seconds
    #[arg(long, env = "IMAGE_BROWSING_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    /// Directory holding cached listings and visit history between runs
    #[arg(long, env = "IMAGE_BROWSING_STATE_DIR", default_value = "./.image-browsing")]
    pub state_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List a folder, served from cache when fresh
    Ls {
        #[arg(default_value = "/")]
        path: String,
        /// Skip the cache and read from the server
        #[arg(long)]
        refresh: bool,
    },
    /// Print a folder tree, loading each level with one batch request
    Tree {
        #[arg(default_value = "/")]
        path: String,
        #[arg(long, default_value_t = 2)]
        depth: usize,
    },
    /// Create a folder
    Mkdir { folder: String, name: String },
    /// Upload a local file into a folder
    Upload {
        folder: String,
        file: PathBuf,
        /// Name on the server, defaults to the local file name
        #[arg(long)]
        name: Option<String>,
    },
    /// Delete entries from a folder
    Rm {
        folder: String,
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Move entries into another folder
    Mv {
        #[arg(long)]
        to: String,
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Rename an entry in place
    Rename { path: String, new_name: String },
    /// Show visited folders
    History {
        /// Show the N most visited folders instead of the most recent ones
        #[arg(long)]
        frequent: Option<usize>,
    },
    /// Print cache and prefetch statistics as JSON
    Stats,
    /// Drop every cached listing
    Clear,
}

/// Resolved configuration for one run
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub state_dir: PathBuf,
    pub cache: CacheConfig,
}

impl CliConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let base_url = cli.url.trim_end_matches('/').to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(CliError::Config(format!(
                "URL must start with http:// or https://, got {}",
                cli.url
            )));
        }

        if cli.timeout_secs == 0 {
            return Err(CliError::Config("timeout must be positive".to_string()));
        }

        Ok(Self {
            base_url,
            timeout: Duration::from_secs(cli.timeout_secs),
            state_dir: cli.state_dir.clone(),
            cache: CacheConfig::from_env(),
        })
    }
}
