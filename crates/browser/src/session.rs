//! Opening a configured browser, context and page.

use std::{future::Future, path::PathBuf, time::Duration};

use {
    chromiumoxide::{
        Browser, BrowserConfig as CdpBrowserConfig,
        cdp::browser_protocol::{
            browser::{SetDownloadBehaviorBehavior, SetDownloadBehaviorParams},
            network::{CookieParam, TimeSinceEpoch},
            page::AddScriptToEvaluateOnNewDocumentParams,
        },
        handler::viewport::Viewport,
    },
    futures::StreamExt,
    tokio::task::JoinHandle,
    tracing::{debug, info, warn},
};

use crate::{
    detect,
    error::BrowserError,
    page::{BrowserPage, CdpPage},
    types::{BrowserKind, CookieSpec, LaunchOptions},
};

/// Hides the automation flag from page scripts.
const WEBDRIVER_INIT_SCRIPT: &str = r#"
    navigator.webdriver = false
    Object.defineProperty(navigator, 'webdriver', {
        get: () => false
    })
"#;

/// A launched browser with one configured page.
///
/// Call [`PageSession::close`] when done; dropping the session kills the
/// browser without a graceful shutdown.
pub struct PageSession {
    browser: Browser,
    page: CdpPage,
    handler: JoinHandle<()>,
    router: Option<JoinHandle<()>>,
}

impl PageSession {
    pub fn page(&self) -> &CdpPage {
        &self.page
    }

    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    /// Close the page, then the browser.
    pub async fn close(mut self) -> Result<(), BrowserError> {
        if let Some(router) = self.router.take() {
            router.abort();
        }
        if let Err(e) = self.page.close().await {
            debug!(error = %e, "page already closed");
        }

        self.browser.close().await?;
        if let Err(e) = self.browser.wait().await {
            warn!(error = %e, "failed to reap browser process");
        }
        self.handler.abort();

        info!("closed browser session");
        Ok(())
    }
}

/// Open a new browser page configured by `options`.
pub async fn open_new_page(options: &LaunchOptions) -> Result<PageSession, BrowserError> {
    if options.browser != BrowserKind::Chromium {
        return Err(BrowserError::UnsupportedBrowser(format!(
            "{} cannot be driven over CDP, use chromium",
            options.browser
        )));
    }

    debug!(
        headless = options.headless,
        proxy = options.proxy.as_ref().map(|p| p.server.as_str()),
        "open a browser"
    );

    let config = browser_config(options)?;
    let (mut browser, mut handler) = Browser::launch(config).await.map_err(|e| {
        let install_hint = detect::install_instructions();
        BrowserError::LaunchFailed(format!("browser launch failed: {e}\n\n{install_hint}"))
    })?;

    let handler = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            debug!(?event, "browser event");
        }
    });

    match configure(&browser, options).await {
        Ok((page, router)) => {
            info!(browser = %options.browser, headless = options.headless, "opened new page");
            Ok(PageSession {
                browser,
                page,
                handler,
                router,
            })
        },
        Err(e) => {
            if let Err(close_err) = browser.close().await {
                debug!(error = %close_err, "browser already gone after failed setup");
            }
            handler.abort();
            Err(e)
        },
    }
}

/// Apply context settings (downloads, init script, cookies) and routing.
async fn configure(
    browser: &Browser,
    options: &LaunchOptions,
) -> Result<(CdpPage, Option<JoinHandle<()>>), BrowserError> {
    debug!(
        accept_downloads = options.accept_downloads,
        cookies = options.cookies.len(),
        "open a browser context"
    );

    let behavior = if options.accept_downloads {
        SetDownloadBehaviorBehavior::Allow
    } else {
        SetDownloadBehaviorBehavior::Deny
    };
    let mut downloads = SetDownloadBehaviorParams::new(behavior);
    if options.accept_downloads {
        downloads.download_path = options.download_dir.clone();
    }
    browser.execute(downloads).await?;

    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

    page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
        WEBDRIVER_INIT_SCRIPT,
    ))
    .await?;

    if !options.cookies.is_empty() {
        let cookies = options
            .cookies
            .iter()
            .map(cookie_param)
            .collect::<Result<Vec<_>, _>>()?;
        page.set_cookies(cookies).await?;
    }

    let blocker = options.block_resources.blocker();
    debug!(
        blocked = ?blocker.as_ref().map(|b| b.blocked_types()),
        "open a new page"
    );
    let router = match blocker {
        Some(blocker) => Some(blocker.install(&page).await?),
        None => None,
    };

    Ok((CdpPage::new(page), router))
}

fn browser_config(options: &LaunchOptions) -> Result<CdpBrowserConfig, BrowserError> {
    let executable = require_browser(detect::find_browser(options.chrome_path.as_deref()))?;

    let mut builder = CdpBrowserConfig::builder();

    // chromiumoxide runs headless unless asked for a window
    if !options.headless {
        builder = builder.with_head();
    }

    builder = builder
        .chrome_executable(executable)
        .viewport(Viewport {
            width: options.viewport_width,
            height: options.viewport_height,
            device_scale_factor: None,
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .request_timeout(Duration::from_millis(options.navigation_timeout_ms));

    for arg in launch_args(options) {
        builder = builder.arg(arg);
    }

    builder
        .build()
        .map_err(|e| BrowserError::LaunchFailed(format!("failed to build browser config: {e}")))
}

fn require_browser(found: Option<PathBuf>) -> Result<PathBuf, BrowserError> {
    found.ok_or_else(|| {
        BrowserError::BrowserNotAvailable(format!(
            "Chrome/Chromium not found.\n\n{}",
            detect::install_instructions()
        ))
    })
}

/// Chrome arguments derived from the options.
fn launch_args(options: &LaunchOptions) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(ref proxy) = options.proxy {
        args.push(format!("--proxy-server={}", proxy.server));
        if let Some(ref bypass) = proxy.bypass {
            args.push(format!("--proxy-bypass-list={bypass}"));
        }
        if proxy.username.is_some() {
            warn!(
                server = %proxy.server,
                "proxy credentials are not forwarded; embed them in the proxy or use an authenticating relay"
            );
        }
    }

    if let Some(ref ua) = options.user_agent {
        args.push(format!("--user-agent={ua}"));
    }

    args.extend(options.chrome_args.iter().cloned());

    args.extend(
        [
            "--disable-gpu",
            "--disable-dev-shm-usage",
            "--no-sandbox",
            "--disable-blink-features=AutomationControlled",
        ]
        .map(String::from),
    );

    args
}

fn cookie_param(cookie: &CookieSpec) -> Result<CookieParam, BrowserError> {
    let mut builder = CookieParam::builder()
        .name(cookie.name.clone())
        .value(cookie.value.clone())
        .secure(cookie.secure)
        .http_only(cookie.http_only);

    if let Some(ref url) = cookie.url {
        builder = builder.url(url.clone());
    }
    if let Some(ref domain) = cookie.domain {
        builder = builder.domain(domain.clone());
    }
    if let Some(ref path) = cookie.path {
        builder = builder.path(path.clone());
    }
    if let Some(expires) = cookie.expires {
        builder = builder.expires(TimeSinceEpoch::new(expires));
    }

    builder
        .build()
        .map_err(|e| BrowserError::InvalidAction(format!("invalid cookie `{}`: {e}", cookie.name)))
}

/// Run `f` with a freshly opened page, then close the page and browser.
///
/// ```ignore
/// let title = with_page(&LaunchOptions::default(), |page| async move {
///     page.goto("https://example.com", Duration::from_secs(30)).await?;
///     Ok::<_, BrowserError>(page.current_url().await)
/// })
/// .await??;
/// ```
pub async fn with_page<T, F, Fut>(options: &LaunchOptions, f: F) -> Result<T, BrowserError>
where
    F: FnOnce(CdpPage) -> Fut,
    Fut: Future<Output = T>,
{
    let session = open_new_page(options).await?;
    let output = f(session.page().clone()).await;

    if let Err(e) = session.close().await {
        warn!(error = %e, "failed to close browser session");
    }

    Ok(output)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::types::ProxyConfig};

    #[tokio::test]
    async fn firefox_is_rejected_before_launch() {
        let options = LaunchOptions {
            browser: BrowserKind::Firefox,
            ..Default::default()
        };
        let err = open_new_page(&options).await.err().unwrap();
        assert!(matches!(err, BrowserError::UnsupportedBrowser(_)));
    }

    #[tokio::test]
    async fn with_page_propagates_launch_failure() {
        let options = LaunchOptions {
            browser: BrowserKind::Firefox,
            ..Default::default()
        };
        let result = with_page(&options, |_page| async { 42 }).await;
        assert!(result.is_err());
    }

    #[test]
    fn proxy_and_user_agent_become_args() {
        let options = LaunchOptions {
            user_agent: Some("pageplus-test".into()),
            chrome_args: vec!["--lang=fr".into()],
            ..Default::default()
        }
        .with_proxy(ProxyConfig {
            server: "http://proxy.local:3128".into(),
            bypass: Some("localhost".into()),
            ..Default::default()
        });

        let args = launch_args(&options);
        assert!(args.contains(&"--proxy-server=http://proxy.local:3128".to_string()));
        assert!(args.contains(&"--proxy-bypass-list=localhost".to_string()));
        assert!(args.contains(&"--user-agent=pageplus-test".to_string()));
        assert!(args.contains(&"--lang=fr".to_string()));
    }

    #[test]
    fn missing_executable_is_reported() {
        let err = require_browser(None).unwrap_err();
        assert!(matches!(err, BrowserError::BrowserNotAvailable(_)));
        assert!(err.to_string().contains("Chrome/Chromium not found"));

        let path = PathBuf::from("/usr/bin/chromium");
        assert_eq!(require_browser(Some(path.clone())).unwrap(), path);
    }

    #[test]
    fn no_proxy_args_by_default() {
        let args = launch_args(&LaunchOptions::default());
        assert!(!args.iter().any(|a| a.starts_with("--proxy-server")));
    }

    #[test]
    fn cookie_spec_converts() {
        let cookie = cookie_param(&CookieSpec {
            name: "session".into(),
            value: "abc".into(),
            domain: Some(".example.com".into()),
            path: Some("/".into()),
            secure: true,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(cookie.name, "session");
        assert_eq!(cookie.value, "abc");
        assert_eq!(cookie.domain.as_deref(), Some(".example.com"));
        assert_eq!(cookie.secure, Some(true));
    }
}
