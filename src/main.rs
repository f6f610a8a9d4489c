use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use swrq::config::Config;
use swrq::{QueryClient, Resource};

#[derive(Parser, Debug)]
#[command(name = "swrq")]
#[command(about = "Fetch JSON endpoints through a stale-while-revalidate cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./swrq.yaml or $XDG_CONFIG_HOME/swrq/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Base URI prepended to every endpoint, overriding the config file
  #[arg(short, long)]
  base_uri: Option<String>,

  /// Re-fetch every endpoint at this interval, in seconds, until Ctrl-C
  #[arg(short, long)]
  watch: Option<u64>,

  /// Endpoints to fetch, e.g. /users/1
  #[arg(required = true)]
  endpoints: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_logging()?;

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  // Override base URI if specified on command line
  let config = if let Some(base_uri) = args.base_uri {
    Config { base_uri, ..config }
  } else {
    config
  };

  let query_config = config
    .to_query_config(Config::get_token().as_deref())
    .with_on_error(|state, err| warn!(endpoint = state.endpoint.as_str(), error = %err, "fetch failed"))
    .with_on_loading_slow(|state| warn!(endpoint = state.endpoint.as_str(), "still loading"));
  let client = QueryClient::new(query_config);

  let resources: Vec<Resource> = args.endpoints.iter().map(|e| client.query(e.as_str())).collect();

  fetch_and_print(&resources).await?;

  let Some(secs) = args.watch else {
    return Ok(());
  };

  let mut interval = tokio::time::interval(Duration::from_secs(secs.max(1)));
  // The first tick completes immediately
  interval.tick().await;
  loop {
    tokio::select! {
      _ = interval.tick() => fetch_and_print(&resources).await?,
      _ = tokio::signal::ctrl_c() => {
        info!("interrupted, exiting");
        break;
      }
    }
  }

  Ok(())
}

async fn fetch_and_print(resources: &[Resource]) -> Result<()> {
  join_all(resources.iter().map(|r| r.fetch())).await;
  for resource in resources {
    println!("{}", serde_json::to_string_pretty(&resource.snapshot())?);
  }
  Ok(())
}

/// Log to a file in the user data directory so stdout stays pure JSON.
fn init_logging() -> Result<WorkerGuard> {
  let log_dir = dirs::data_dir()
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("swrq");
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let appender = tracing_appender::rolling::never(&log_dir, "swrq.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_env("SWRQ_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}
