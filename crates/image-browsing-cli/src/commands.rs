//! Subcommand handlers

use crate::config::Command;
use crate::error::{CliError, Result};
use image_browsing_cache::path;
use image_browsing_cache::{
    folder_paths, Listing, ListingSource, Navigation, NavigationEvent, Navigator,
};
use serde::Serialize;
use std::path::Path;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::info;

pub async fn run(navigator: &Navigator, command: Command) -> Result<()> {
    match command {
        Command::Ls { path, refresh } => ls(navigator, &path, refresh).await,
        Command::Tree { path, depth } => tree(navigator, &path, depth).await,
        Command::Mkdir { folder, name } => {
            navigator.create_folder(&folder, &name).await?;
            info!(folder = %folder, name = %name, "Created folder");
            Ok(())
        }
        Command::Upload { folder, file, name } => upload(navigator, &folder, &file, name).await,
        Command::Rm { folder, names } => {
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            navigator.delete(&folder, &names).await?;
            info!(folder = %folder, count = names.len(), "Deleted entries");
            Ok(())
        }
        Command::Mv { to, paths } => {
            let paths: Vec<&str> = paths.iter().map(String::as_str).collect();
            navigator.move_entries(&paths, &to).await?;
            info!(target = %to, count = paths.len(), "Moved entries");
            Ok(())
        }
        Command::Rename { path, new_name } => {
            navigator.rename(&path, &new_name).await?;
            info!(path = %path, new_name = %new_name, "Renamed entry");
            Ok(())
        }
        Command::History { frequent } => {
            history(navigator, frequent);
            Ok(())
        }
        Command::Stats => stats(navigator),
        Command::Clear => {
            navigator.clear_cache();
            info!("Cleared listing cache");
            Ok(())
        }
    }
}

async fn ls(navigator: &Navigator, folder: &str, refresh: bool) -> Result<()> {
    let mut events = navigator.subscribe();

    let navigation = if refresh {
        navigator.force_refresh(folder).await?
    } else {
        navigator.goto(folder).await?
    };
    if let Navigation::Rendered {
        listing, source, ..
    } = &navigation
    {
        print_listing(listing, *source);
    }

    // A cached listing is revalidated in the background; show the newer one if it changed
    navigator.settled().await;
    loop {
        match events.try_recv() {
            Ok(NavigationEvent::ListingUpdated {
                listing,
                source: ListingSource::Revalidated,
                ..
            }) => {
                println!();
                print_listing(&listing, ListingSource::Revalidated);
            }
            Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }

    // Let prefetched neighbours reach the state directory for the next run
    navigator.prefetch_idle().await;
    Ok(())
}

fn print_listing(listing: &Listing, source: ListingSource) {
    println!("({})", source_label(source));
    for entry in listing.iter() {
        if entry.is_folder() {
            println!("{:>12}  {}/", "-", entry.name);
        } else {
            println!("{:>12}  {}", entry.size, entry.name);
        }
    }
}

fn source_label(source: ListingSource) -> &'static str {
    match source {
        ListingSource::Cache => "cached",
        ListingSource::Network => "fetched",
        ListingSource::Revalidated => "updated",
        ListingSource::Optimistic => "pending",
    }
}

async fn tree(navigator: &Navigator, root: &str, depth: usize) -> Result<()> {
    let root = path::normalize(root)?;

    let mut level = vec![root.clone()];
    for current_depth in 0..=depth {
        if level.is_empty() {
            break;
        }
        let paths: Vec<&str> = level.iter().map(String::as_str).collect();
        navigator.preload(&paths).await?;

        if current_depth == depth {
            break;
        }
        let mut next = Vec::new();
        for folder in &level {
            if let Some(listing) = navigator.cached(folder)? {
                next.extend(folder_paths(folder, &listing));
            }
        }
        level = next;
    }

    println!("{}", root);
    print_tree(navigator, &root, 1, depth)
}

fn print_tree(navigator: &Navigator, folder: &str, indent: usize, depth: usize) -> Result<()> {
    let Some(listing) = navigator.cached(folder)? else {
        return Ok(());
    };

    for entry in listing.iter() {
        let pad = "  ".repeat(indent);
        if entry.is_folder() {
            println!("{}{}/", pad, entry.name);
            if indent <= depth {
                print_tree(navigator, &path::join(folder, &entry.name), indent + 1, depth)?;
            }
        } else {
            println!("{}{}", pad, entry.name);
        }
    }
    Ok(())
}

async fn upload(
    navigator: &Navigator,
    folder: &str,
    file: &Path,
    name: Option<String>,
) -> Result<()> {
    let name = match name {
        Some(name) => name,
        None => file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| CliError::Config(format!("{} has no file name", file.display())))?,
    };

    let contents = tokio::fs::read(file).await?;
    let size = contents.len();
    navigator.upload(folder, &name, contents).await?;
    info!(folder = %folder, name = %name, size, "Uploaded file");
    Ok(())
}

fn history(navigator: &Navigator, frequent: Option<usize>) {
    match frequent {
        Some(limit) => {
            for folder in navigator.frequent_folders(limit) {
                println!("{}", folder);
            }
        }
        None => {
            for record in navigator.history() {
                println!("{:>5}  {}", record.visit_count, record.path);
            }
        }
    }
}

#[derive(Serialize)]
struct StatsReport {
    store: image_browsing_cache::StoreStats,
    prefetch: image_browsing_cache::PrefetchStats,
    history_entries: usize,
}

fn stats(navigator: &Navigator) -> Result<()> {
    let report = StatsReport {
        store: navigator.stats(),
        prefetch: navigator.prefetch_stats(),
        history_entries: navigator.history().len(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

