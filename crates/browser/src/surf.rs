//! Wrappers that sequence page actions: post-action waits, load markers and
//! timeout translation.

use std::{future::Future, time::Duration};

use {
    rand::Rng,
    tokio::time::Instant,
    tracing::debug,
};

use crate::{error::BrowserError, page::BrowserPage};

/// Interval between two visibility checks of a marker.
const MARKER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Pause inserted after an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitAfter {
    pub wait_ms: u64,
    /// Draw the actual wait from a 15% band around `wait_ms`.
    pub randomized: bool,
}

impl Default for WaitAfter {
    fn default() -> Self {
        Self {
            wait_ms: 2000,
            randomized: true,
        }
    }
}

impl WaitAfter {
    pub fn fixed(wait_ms: u64) -> Self {
        Self {
            wait_ms,
            randomized: false,
        }
    }

    /// Same jitter setting, different base wait.
    pub fn wait_ms(self, wait_ms: u64) -> Self {
        Self { wait_ms, ..self }
    }

    /// Inclusive bounds of the randomized wait.
    pub fn bounds(&self) -> (u64, u64) {
        let low = (self.wait_ms as f64 * 0.85 + 0.5) as u64;
        let high = (self.wait_ms as f64 * 1.15 + 0.5) as u64;
        (low, high)
    }

    /// The wait to apply for one call.
    pub fn duration(&self) -> Duration {
        if !self.randomized {
            return Duration::from_millis(self.wait_ms);
        }
        let (low, high) = self.bounds();
        Duration::from_millis(rand::rng().random_range(low..=high))
    }
}

/// Run `action`, then let `page` idle for the configured wait.
pub async fn wait_after_execution<P, T, Fut>(page: &P, wait: &WaitAfter, action: Fut) -> T
where
    P: BrowserPage + ?Sized,
    Fut: Future<Output = T>,
{
    let output = action.await;
    let pause = wait.duration();
    debug!(wait_ms = pause.as_millis() as u64, "waiting after execution");
    page.wait_for_timeout(pause).await;
    output
}

/// Element whose visibility tells that the page has loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    /// Class-like selector; gets a leading `.` unless strict.
    Selector(String),
    /// Ready-made CSS selector, used verbatim.
    Locator(String),
}

/// When the marker is checked relative to the action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MarkerPhase {
    Before,
    #[default]
    After,
}

#[derive(Debug, Clone)]
pub struct LoadedMarker {
    pub marker: Option<Marker>,
    /// Use a [`Marker::Selector`] as given, without the `.` prefix.
    pub strict: bool,
    pub load_message: Option<String>,
    pub timeout: Duration,
    pub phase: MarkerPhase,
}

impl Default for LoadedMarker {
    fn default() -> Self {
        Self {
            marker: None,
            strict: false,
            load_message: None,
            timeout: Duration::from_millis(10000),
            phase: MarkerPhase::After,
        }
    }
}

impl LoadedMarker {
    pub fn selector(marker: impl Into<String>) -> Self {
        Self {
            marker: Some(Marker::Selector(marker.into())),
            ..Default::default()
        }
    }

    pub fn locator(css: impl Into<String>) -> Self {
        Self {
            marker: Some(Marker::Locator(css.into())),
            ..Default::default()
        }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn load_message(mut self, message: impl Into<String>) -> Self {
        self.load_message = Some(message.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn phase(mut self, phase: MarkerPhase) -> Self {
        self.phase = phase;
        self
    }

    /// The CSS selector to wait for, if any.
    pub fn css(&self) -> Option<String> {
        match self.marker.as_ref()? {
            Marker::Selector(s) if !self.strict && !s.starts_with('.') => Some(format!(".{s}")),
            Marker::Selector(s) | Marker::Locator(s) => Some(s.clone()),
        }
    }

    /// Block until the marker is visible or the timeout elapses.
    pub async fn wait_for<P>(&self, page: &P) -> Result<(), BrowserError>
    where
        P: BrowserPage + ?Sized,
    {
        let Some(selector) = self.css() else {
            return Ok(());
        };

        let deadline = Instant::now() + self.timeout;
        loop {
            if page.is_visible(&selector).await? {
                debug!(
                    selector,
                    "{}",
                    self.load_message.as_deref().unwrap_or("loaded marker visible")
                );
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout(format!(
                    "marker `{selector}` not visible after {}ms",
                    self.timeout.as_millis()
                )));
            }
            page.wait_for_timeout(MARKER_POLL_INTERVAL).await;
        }
    }
}

/// Run `action` and require the marker to be visible, before or after it.
pub async fn check_for_loaded_marker<P, T, Fut>(
    page: &P,
    marker: &LoadedMarker,
    action: Fut,
) -> Result<T, BrowserError>
where
    P: BrowserPage + ?Sized,
    Fut: Future<Output = T>,
{
    if marker.phase == MarkerPhase::Before {
        marker.wait_for(page).await?;
        return Ok(action.await);
    }

    let output = action.await;
    marker.wait_for(page).await?;
    Ok(output)
}

/// Run `action`, turning a [`BrowserError::Timeout`] into the caller's error.
///
/// `make_error` receives `"[{name}] {message}:\n{timeout}"`. Other errors
/// go through `From<BrowserError>`.
pub async fn catch_timeout<T, E, F, Fut>(
    name: &str,
    message: &str,
    make_error: F,
    action: Fut,
) -> Result<T, E>
where
    F: FnOnce(String) -> E,
    E: From<BrowserError>,
    Fut: Future<Output = Result<T, BrowserError>>,
{
    match action.await {
        Ok(output) => Ok(output),
        Err(BrowserError::Timeout(detail)) => {
            Err(make_error(format!("[{name}] {message}:\n{detail}")))
        },
        Err(other) => Err(other.into()),
    }
}
