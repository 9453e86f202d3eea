//! Handlers for the page-driving subcommands.

use std::time::Duration;

use {
    anyhow::Result,
    pageplus_browser::{
        BrowserError, BrowserPage, InterceptOptions, InterceptResult, LaunchOptions, LoadedMarker,
        PagePlusConfig, WaitAfter, catch_timeout, check_for_loaded_marker, intercept_json,
        intercept_json_legacy, intercept_json_multiple, request_json, wait_after_execution,
        with_page,
    },
    tracing::info,
};

/// Which interception loop to run.
pub enum InterceptMode {
    Polling,
    Legacy,
    Multiple { expect_more: u32 },
}

pub async fn intercept(
    config: &PagePlusConfig,
    page_url: &str,
    json_url_subpart: &str,
    mode: InterceptMode,
    timeout_ms: Option<u64>,
    max_refresh: Option<u32>,
) -> Result<()> {
    let mut options = InterceptOptions::from(&config.intercept);
    if let Some(ms) = timeout_ms {
        options.timeout = Duration::from_millis(ms);
    }
    if let Some(n) = max_refresh {
        options.max_refresh = n;
    }

    let launch = &config.launch;
    let result = match mode {
        InterceptMode::Polling => {
            intercept_json(launch, page_url, json_url_subpart, &options).await?
        },
        InterceptMode::Legacy => {
            intercept_json_legacy(launch, page_url, json_url_subpart, &options).await?
        },
        InterceptMode::Multiple { expect_more } => {
            let options = options.expect_more(expect_more);
            intercept_json_multiple(launch, page_url, json_url_subpart, &options).await?
        },
    };
    print_result(&result)
}

pub async fn request(config: &PagePlusConfig, json_url: &str) -> Result<()> {
    let options = InterceptOptions::from(&config.intercept);
    let result = request_json(&config.launch, json_url, &options).await?;
    print_result(&result)
}

/// Navigate, wait for the marker and the post-navigation delay, then print
/// where the page ended up.
pub async fn open(
    launch: &LaunchOptions,
    url: &str,
    marker: LoadedMarker,
    wait: WaitAfter,
) -> Result<()> {
    let goto_timeout = Duration::from_millis(launch.navigation_timeout_ms);
    let final_url = with_page(launch, |page| async move {
        catch_timeout(
            "open",
            "page did not finish loading",
            anyhow::Error::msg,
            async {
                let navigate = wait_after_execution(&page, &wait, page.goto(url, goto_timeout));
                check_for_loaded_marker(&page, &marker, navigate).await??;
                Ok::<_, BrowserError>(page.current_url().await)
            },
        )
        .await
    })
    .await??;

    info!(url, final_url = final_url.as_deref(), "page loaded");
    println!("{}", final_url.as_deref().unwrap_or(url));
    Ok(())
}

pub fn show_config(config: &PagePlusConfig) -> Result<()> {
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

fn print_result(result: &InterceptResult) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}
