//! image-browsing - command-line folder browser
//!
//! Talks to the host application's `/image-browsing/*` routes through the
//! listing cache. Listings and visit history are kept in a state directory,
//! so a folder opened in one run is served from cache by the next.

mod commands;
mod config;
mod error;

use crate::config::{Cli, CliConfig};
use crate::error::Result;
use clap::Parser;
use image_browsing_cache::{FileStore, NavigationEvent, Navigator};
use image_browsing_client::BrowsingClient;
use std::sync::Arc;
use tracing::{debug, error};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("image_browsing=info".parse()?)
        .add_directive("image_browsing_cache=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    };

    let cli = Cli::parse();
    let config = CliConfig::from_cli(&cli)?;
    debug!("Server: {}", config.base_url);
    debug!("State dir: {:?}", config.state_dir);

    let storage = FileStore::new(&config.state_dir, config.cache.storage_quota_bytes)?;
    let client = BrowsingClient::with_timeout(&config.base_url, config.timeout)?;
    let navigator = Navigator::new(config.cache, Arc::new(client), Arc::new(storage));

    let mut events = navigator.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            log_event(&event);
        }
    });

    if let Err(e) = commands::run(&navigator, cli.command).await {
        error!("{}", e);
        return Err(e);
    }

    let stats = navigator.stats();
    debug!(
        entries = stats.entries,
        hits = stats.hits,
        misses = stats.misses,
        "Done"
    );
    Ok(())
}

/// Trace navigation events. Failures are reported once, by the command that hit them.
fn log_event(event: &NavigationEvent) {
    match event {
        NavigationEvent::Loading { epoch, path } => {
            debug!(epoch, path = %path, "Loading");
        }
        NavigationEvent::ListingUpdated {
            epoch,
            path,
            listing,
            source,
        } => {
            debug!(epoch, path = %path, entries = listing.len(), ?source, "Listing updated");
        }
        NavigationEvent::Failed { epoch, path, error } => {
            debug!(epoch, path = %path, error = %error, "Navigation failed");
        }
    }
}
