//! In-memory [`BrowserPage`] driven by scripted navigations.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    futures::{StreamExt, channel::mpsc},
    tokio::time::Instant,
};

use crate::{
    error::BrowserError,
    page::{BrowserPage, PageResponse, ResponseStream},
};

enum Outcome {
    Loaded,
    TimedOut,
    Failed(String),
}

/// What one `goto` does: its outcome and the responses it triggers.
pub(crate) struct Navigation {
    outcome: Outcome,
    responses: Vec<(String, String, Duration)>,
}

impl Navigation {
    pub(crate) fn ok() -> Self {
        Self {
            outcome: Outcome::Loaded,
            responses: Vec::new(),
        }
    }

    pub(crate) fn timeout() -> Self {
        Self {
            outcome: Outcome::TimedOut,
            ..Self::ok()
        }
    }

    pub(crate) fn fail(reason: &str) -> Self {
        Self {
            outcome: Outcome::Failed(reason.to_string()),
            ..Self::ok()
        }
    }

    pub(crate) fn respond(self, url: &str, body: &str) -> Self {
        self.respond_after(url, body, Duration::ZERO)
    }

    pub(crate) fn respond_after(mut self, url: &str, body: &str, delay: Duration) -> Self {
        self.responses
            .push((url.to_string(), body.to_string(), delay));
        self
    }
}

pub(crate) struct FakePage {
    tx: mpsc::UnboundedSender<PageResponse>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<PageResponse>>>,
    bodies: Mutex<HashMap<String, String>>,
    navigations: Mutex<VecDeque<Navigation>>,
    visible: Mutex<Vec<(String, Instant)>>,
    goto_calls: AtomicUsize,
    next_id: AtomicUsize,
}

impl FakePage {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::unbounded();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            bodies: Mutex::new(HashMap::new()),
            navigations: Mutex::new(VecDeque::new()),
            visible: Mutex::new(Vec::new()),
            goto_calls: AtomicUsize::new(0),
            next_id: AtomicUsize::new(0),
        }
    }

    /// Queue the behaviour of the next unscripted `goto`.
    pub(crate) fn on_goto(&self, navigation: Navigation) {
        self.navigations.lock().unwrap().push_back(navigation);
    }

    /// Make `selector` visible once `delay` has elapsed.
    pub(crate) fn show_after(&self, selector: &str, delay: Duration) {
        self.visible
            .lock()
            .unwrap()
            .push((selector.to_string(), Instant::now() + delay));
    }

    pub(crate) fn goto_calls(&self) -> usize {
        self.goto_calls.load(Ordering::SeqCst)
    }

    /// Record a response body without emitting the response.
    pub(crate) fn register(&self, url: &str, body: &str) -> PageResponse {
        let request_id = format!("req-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.bodies
            .lock()
            .unwrap()
            .insert(request_id.clone(), body.to_string());
        PageResponse {
            url: url.to_string(),
            status: 200,
            request_id,
        }
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn goto(&self, url: &str, _timeout: Duration) -> Result<(), BrowserError> {
        self.goto_calls.fetch_add(1, Ordering::SeqCst);
        let navigation = self
            .navigations
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(Navigation::ok);

        for (response_url, body, delay) in navigation.responses {
            let response = self.register(&response_url, &body);
            if delay.is_zero() {
                let _ = self.tx.unbounded_send(response);
            } else {
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.unbounded_send(response);
                });
            }
        }

        match navigation.outcome {
            Outcome::Loaded => Ok(()),
            Outcome::TimedOut => Err(BrowserError::Timeout(format!("navigating to {url}"))),
            Outcome::Failed(reason) => Err(BrowserError::NavigationFailed(reason)),
        }
    }

    async fn responses(&self) -> Result<ResponseStream, BrowserError> {
        self.rx
            .lock()
            .unwrap()
            .take()
            .map(StreamExt::boxed)
            .ok_or_else(|| BrowserError::InvalidAction("already listening".into()))
    }

    async fn response_body(&self, request_id: &str) -> Result<String, BrowserError> {
        self.bodies
            .lock()
            .unwrap()
            .get(request_id)
            .cloned()
            .ok_or_else(|| BrowserError::Cdp(format!("no body for {request_id}")))
    }

    async fn is_visible(&self, selector: &str) -> Result<bool, BrowserError> {
        let now = Instant::now();
        Ok(self
            .visible
            .lock()
            .unwrap()
            .iter()
            .any(|(s, at)| s == selector && now >= *at))
    }

    async fn current_url(&self) -> Option<String> {
        None
    }

    async fn close(&self) -> Result<(), BrowserError> {
        Ok(())
    }
}
