//! The page surface used by the helpers, and its CDP implementation.

use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use {
    async_trait::async_trait,
    base64::{Engine, engine::general_purpose::STANDARD as BASE64},
    chromiumoxide::{
        Page,
        cdp::browser_protocol::network::{
            EventLoadingFailed, EventLoadingFinished, EventResponseReceived,
            GetResponseBodyParams, RequestId,
        },
    },
    futures::{Stream, StreamExt, channel::mpsc, stream::BoxStream},
    tracing::debug,
};

use crate::error::BrowserError;

/// A network response observed on a page, delivered once its body is
/// available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResponse {
    pub url: String,
    pub status: i64,
    /// Opaque id passed back to [`BrowserPage::response_body`].
    pub request_id: String,
}

pub type ResponseStream = BoxStream<'static, PageResponse>;

/// What the decorator and interception layers need from a page.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Navigate and wait for the load, failing with
    /// [`BrowserError::Timeout`] once `timeout` elapses.
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), BrowserError>;

    /// Let the page run for `duration`.
    async fn wait_for_timeout(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Subscribe to responses from now on.
    async fn responses(&self) -> Result<ResponseStream, BrowserError>;

    async fn response_body(&self, request_id: &str) -> Result<String, BrowserError>;

    /// Whether an element matching `selector` is currently visible.
    async fn is_visible(&self, selector: &str) -> Result<bool, BrowserError>;

    async fn current_url(&self) -> Option<String>;

    async fn close(&self) -> Result<(), BrowserError>;
}

/// A `Network.responseReceived` event, reduced to what pairing needs.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ReceivedResponse {
    request_id: String,
    url: String,
    status: i64,
}

/// Emit each response once its request has finished loading.
///
/// A body can only be fetched after `loadingFinished`. Received events are
/// polled first; a finish seen before its response is remembered until the
/// response shows up. Failed requests are forgotten.
async fn pair_responses<R, F, L>(
    mut received: R,
    mut finished: F,
    mut failed: L,
    tx: mpsc::UnboundedSender<PageResponse>,
) where
    R: Stream<Item = ReceivedResponse> + Unpin,
    F: Stream<Item = String> + Unpin,
    L: Stream<Item = String> + Unpin,
{
    let mut pending: HashMap<String, (String, i64)> = HashMap::new();
    let mut finished_early: HashSet<String> = HashSet::new();

    loop {
        let ready = tokio::select! {
            biased;
            Some(response) = received.next() => {
                if finished_early.remove(&response.request_id) {
                    Some(PageResponse {
                        url: response.url,
                        status: response.status,
                        request_id: response.request_id,
                    })
                } else {
                    pending.insert(response.request_id, (response.url, response.status));
                    None
                }
            },
            Some(request_id) = finished.next() => match pending.remove(&request_id) {
                Some((url, status)) => Some(PageResponse { url, status, request_id }),
                None => {
                    finished_early.insert(request_id);
                    None
                },
            },
            Some(request_id) = failed.next() => {
                pending.remove(&request_id);
                None
            },
            else => break,
        };

        if let Some(response) = ready
            && tx.unbounded_send(response).is_err()
        {
            break;
        }
    }
}

/// [`BrowserPage`] backed by a chromiumoxide page.
#[derive(Debug, Clone)]
pub struct CdpPage {
    page: Page,
}

impl CdpPage {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// The underlying chromiumoxide page, for anything not covered here.
    pub fn inner(&self) -> &Page {
        &self.page
    }
}

#[async_trait]
impl BrowserPage for CdpPage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => match BrowserError::from(e) {
                BrowserError::Timeout(msg) => Err(BrowserError::Timeout(msg)),
                other => Err(BrowserError::NavigationFailed(other.to_string())),
            },
            Err(_) => Err(BrowserError::Timeout(format!(
                "navigating to {url} exceeded {}ms",
                timeout.as_millis()
            ))),
        }
    }

    async fn responses(&self) -> Result<ResponseStream, BrowserError> {
        let received = self
            .page
            .event_listener::<EventResponseReceived>()
            .await?
            .map(|event| ReceivedResponse {
                request_id: event.request_id.inner().clone(),
                url: event.response.url.clone(),
                status: event.response.status,
            });
        let finished = self
            .page
            .event_listener::<EventLoadingFinished>()
            .await?
            .map(|event| event.request_id.inner().clone());
        let failed = self
            .page
            .event_listener::<EventLoadingFailed>()
            .await?
            .map(|event| event.request_id.inner().clone());

        let (tx, rx) = mpsc::unbounded();
        tokio::spawn(async move {
            pair_responses(received, finished, failed, tx).await;
            debug!("response listener exited");
        });

        Ok(rx.boxed())
    }

    async fn response_body(&self, request_id: &str) -> Result<String, BrowserError> {
        let resp = self
            .page
            .execute(GetResponseBodyParams::new(RequestId::new(request_id)))
            .await?;
        if resp.result.base64_encoded {
            let bytes = BASE64
                .decode(resp.result.body.as_bytes())
                .map_err(|e| BrowserError::Cdp(format!("invalid base64 body: {e}")))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        } else {
            Ok(resp.result.body)
        }
    }

    async fn is_visible(&self, selector: &str) -> Result<bool, BrowserError> {
        let selector = serde_json::to_string(selector)
            .map_err(|e| BrowserError::InvalidAction(e.to_string()))?;
        let js = format!(
            r#"(() => {{
                const el = document.querySelector({selector});
                if (!el) return false;
                const style = window.getComputedStyle(el);
                const rect = el.getBoundingClientRect();
                return style.visibility !== 'hidden'
                    && style.display !== 'none'
                    && (rect.width > 0 || rect.height > 0);
            }})()"#
        );

        self.page
            .evaluate(js.as_str())
            .await
            .map_err(|e| BrowserError::JsEvalFailed(e.to_string()))?
            .into_value()
            .map_err(|e| BrowserError::JsEvalFailed(format!("{e:?}")))
    }

    async fn current_url(&self) -> Option<String> {
        self.page.url().await.ok().flatten()
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.page.clone().close().await?;
        Ok(())
    }
}
