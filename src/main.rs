mod api;
mod app;
mod cache;
mod commands;
mod config;
mod event;
mod logging;
mod mutation;
mod query;
mod router;
mod ui;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use router::Route;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "evdesk")]
#[command(about = "A terminal UI for browsing and editing events")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/evdesk/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Base URL of the events API
  #[arg(short, long)]
  url: Option<String>,

  /// Route to open, e.g. /events/42/edit
  #[arg(short, long, default_value = "/events")]
  route: String,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;

  // Override API URL if specified on command line
  if let Some(url) = args.url {
    config.api.url = url;
  }

  let route = Route::parse(&args.route).ok_or_else(|| eyre!("Unknown route: {}", args.route))?;

  // Flushes buffered log lines on drop
  let _log_guard = logging::init(&config.logging)?;

  // Initialize and run the app
  let mut app = app::App::new(config, route)?;
  app.run().await?;

  Ok(())
}
