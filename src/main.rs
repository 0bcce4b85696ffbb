/*!
 * Copyright (c) 2026 Ming Lyu, aka mingcheng
 *
 * This source code is licensed under the MIT License,
 * which is located in the LICENSE file in the source tree's root directory.
 *
 * File: main.rs
 * Author: mingcheng <mingcheng@apache.org>
 * File Created: 2026-03-09 10:21:44
 *
 * Modified By: mingcheng <mingcheng@apache.org>
 * Last Modified: 2026-03-16 18:03:10
 */

mod config;
mod dispatch;
mod error;
mod imap_session;
mod message;
mod traits;
mod watcher;

use clap::Parser;
use config::AppConfig;
use dispatch::Handler;
use imap_session::ImapMailSource;
use log::{error, info, warn};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::signal;
use watcher::MailWatcher;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long)]
    config: Option<String>,
}

fn initialize_logger(config: &AppConfig) {
    let mut builder = env_logger::Builder::new();

    if let Some(level) = &config.log_level {
        builder.parse_filters(level);
    } else if let Ok(env_level) = std::env::var("RUST_LOG") {
        builder.parse_filters(&env_level);
    } else {
        builder.filter_level(log::LevelFilter::Info);
    }

    if config.quiet {
        builder.target(env_logger::Target::Pipe(Box::new(std::io::sink())));
    }

    builder.init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match args.config {
        Some(path) => AppConfig::new_from_file(&path),
        None => AppConfig::new(),
    }
    .unwrap_or_else(|e| {
        eprintln!("Failed to load config: {:?}", e);
        if let Ok(path) = std::env::current_dir() {
            eprintln!("Current search path: {:?}", path);
        }
        eprintln!("Please create a `config.toml` or set APP_... environment variables, or specify a config file with --config.");
        std::process::exit(1);
    });

    initialize_logger(&config);

    info!(
        "Starting Mail Watcher for {} ({})",
        config.mailbox.username, config.mailbox.host
    );

    let poll_interval = Duration::from_secs(config.mailbox.poll_interval_seconds.max(1));
    let source = ImapMailSource::new(config.mailbox.clone());

    // New messages are handed back to this runtime; the poll loop thread
    // never runs handler code itself.
    let handler = Handler::scheduled(Handle::current(), |uid, message| async move {
        info!(
            "message {uid} from {}: {} ({} byte body)",
            message.sender,
            message.subject,
            message.body.len()
        );
        Ok(())
    });

    let watcher = MailWatcher::new(Box::new(source), handler, poll_interval);
    let handle = watcher.spawn()?;

    match signal::ctrl_c().await {
        Ok(()) => warn!("Shutdown signal received (Ctrl+C). Stopping watcher..."),
        Err(err) => error!("Unable to listen for shutdown signal: {}", err),
    }

    // stop() joins the watcher thread, so keep it off the async runtime
    tokio::task::spawn_blocking(move || handle.stop()).await?;

    info!("Watcher stopped. Goodbye!");
    Ok(())
}
