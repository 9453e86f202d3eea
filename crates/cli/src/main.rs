mod page_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    pageplus_browser::{LoadedMarker, WaitAfter, config},
    tracing::{debug, info},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use crate::page_commands::InterceptMode;

#[derive(Parser)]
#[command(name = "pageplus", about = "Open pages and capture the JSON they fetch")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery of pageplus.{toml,json}).
    #[arg(long, global = true, env = "PAGEPLUS_CONFIG")]
    config: Option<PathBuf>,

    /// Show the browser window.
    #[arg(long, global = true, default_value_t = false)]
    headed: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a page and print the JSON of a call it makes.
    Intercept {
        #[arg(value_parser = parse_url)]
        page_url: String,
        /// Substring of the URL of the call to capture.
        json_url_subpart: String,
        /// Polling budget in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
        #[arg(long)]
        max_refresh: Option<u32>,
        /// Fixed-budget polling without refresh.
        #[arg(long, conflicts_with = "expect_more")]
        legacy: bool,
        /// Keep listening past this many erroneous payloads.
        #[arg(long)]
        expect_more: Option<u32>,
    },
    /// Fetch a JSON endpoint through the browser.
    Request {
        #[arg(value_parser = parse_url)]
        json_url: String,
    },
    /// Navigate to a page and print its final URL.
    Open {
        #[arg(value_parser = parse_url)]
        url: String,
        /// Element that must be visible once loaded.
        #[arg(long)]
        marker: Option<String>,
        /// Use the marker as a CSS selector verbatim.
        #[arg(long, default_value_t = false)]
        strict: bool,
        /// Delay after navigation, in milliseconds.
        #[arg(long, default_value_t = 2000)]
        wait_ms: u64,
    },
    /// Print the effective configuration.
    Config,
}

/// Accept only absolute URLs, keeping them as typed.
fn parse_url(raw: &str) -> Result<String, String> {
    url::Url::parse(raw)
        .map(|_| raw.to_string())
        .map_err(|e| format!("invalid URL `{raw}`: {e}"))
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_telemetry(&cli);

    debug!(version = env!("CARGO_PKG_VERSION"), "pageplus starting");

    let mut config = match cli.config {
        Some(ref path) => config::load_config(path)?,
        None => config::discover_and_load(),
    };
    if cli.headed {
        config.launch.headless = false;
    }

    match cli.command {
        Commands::Intercept {
            page_url,
            json_url_subpart,
            timeout_ms,
            max_refresh,
            legacy,
            expect_more,
        } => {
            let mode = match (legacy, expect_more) {
                (true, _) => InterceptMode::Legacy,
                (false, Some(expect_more)) => InterceptMode::Multiple { expect_more },
                (false, None) => InterceptMode::Polling,
            };
            info!(page_url, json_url_subpart, "intercepting json");
            page_commands::intercept(
                &config,
                &page_url,
                &json_url_subpart,
                mode,
                timeout_ms,
                max_refresh,
            )
            .await
        },
        Commands::Request { json_url } => {
            info!(json_url, "requesting json");
            page_commands::request(&config, &json_url).await
        },
        Commands::Open {
            url,
            marker,
            strict,
            wait_ms,
        } => {
            let marker = match marker {
                Some(m) => LoadedMarker::selector(m).strict(strict),
                None => LoadedMarker::default(),
            };
            page_commands::open(&config.launch, &url, marker, WaitAfter::fixed(wait_ms)).await
        },
        Commands::Config => page_commands::show_config(&config),
    }
}
