//! Intercepting JSON payloads a page fetches while it loads.
//!
//! A page is opened on some URL and the JSON returned by one of the calls it
//! makes (matched by URL substring) is captured. The poll loops below share a
//! single-owner [`InterceptBuffer`] with the response handler; response events
//! are dispatched in between the loop's waits, never concurrently with it.

use std::{fmt, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    futures::{FutureExt, StreamExt},
    serde_json::{Map, Value, json},
    tokio::time::Instant,
    tracing::{debug, warn},
};

use crate::{
    error::BrowserError,
    page::{BrowserPage, PageResponse, ResponseStream},
    session::with_page,
    types::{ErrorTag, InterceptResult, LaunchOptions, is_truthy},
};

/// Poll step of the legacy and multiple interceptors.
const POLL_STEP: Duration = Duration::from_millis(500);

/// Inspects a result and reports whether it is an error, possibly rewriting
/// it (e.g. tagging it [`ErrorTag::CaptchaRaised`]).
pub type ErrorDetector = Arc<dyn Fn(InterceptResult) -> (bool, InterceptResult) + Send + Sync>;

/// Reshapes the final result when no error was detected. It also sees
/// tagged results the detector let through, such as the empty-json error.
pub type ResultParser = Arc<dyn Fn(InterceptResult) -> InterceptResult + Send + Sync>;

/// What a [`CaptchaSolver`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptchaOutcome {
    /// Navigate to the page again before the next poll.
    pub ask_for_refresh: bool,
    /// The challenge is gone; wait for a fresh payload.
    pub solved: bool,
}

/// Clears a CAPTCHA shown on the page.
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    async fn solve(&self, page: &dyn BrowserPage) -> CaptchaOutcome;
}

/// Knobs shared by the interceptors.
#[derive(Clone)]
pub struct InterceptOptions {
    pub json_detect_error: Option<ErrorDetector>,
    pub json_parse_result: Option<ResultParser>,
    pub captcha_solver: Option<Arc<dyn CaptchaSolver>>,
    /// Refreshes allowed before giving up.
    pub max_refresh: u32,
    /// Polling budget, navigation included.
    pub timeout: Duration,
    pub goto_timeout: Duration,
    /// Navigation timeout of a CAPTCHA refresh.
    pub refresh_timeout: Duration,
    /// Minimum duration of one poll iteration.
    pub poll_floor: Duration,
    /// Budget of the legacy and multiple interceptors, in 500ms pairs.
    pub wait_seconds: u32,
    /// Erroneous payloads tolerated by the multiple interceptor.
    pub expect_more: u32,
}

impl Default for InterceptOptions {
    fn default() -> Self {
        Self {
            json_detect_error: None,
            json_parse_result: None,
            captcha_solver: None,
            max_refresh: 1,
            timeout: Duration::from_millis(4000),
            goto_timeout: Duration::from_millis(30000),
            refresh_timeout: Duration::from_millis(3000),
            poll_floor: Duration::from_millis(500),
            wait_seconds: 4,
            expect_more: 0,
        }
    }
}

impl fmt::Debug for InterceptOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptOptions")
            .field("json_detect_error", &self.json_detect_error.is_some())
            .field("json_parse_result", &self.json_parse_result.is_some())
            .field("captcha_solver", &self.captcha_solver.is_some())
            .field("max_refresh", &self.max_refresh)
            .field("timeout", &self.timeout)
            .field("goto_timeout", &self.goto_timeout)
            .field("refresh_timeout", &self.refresh_timeout)
            .field("poll_floor", &self.poll_floor)
            .field("wait_seconds", &self.wait_seconds)
            .field("expect_more", &self.expect_more)
            .finish()
    }
}

impl InterceptOptions {
    pub fn detect_error<F>(mut self, f: F) -> Self
    where
        F: Fn(InterceptResult) -> (bool, InterceptResult) + Send + Sync + 'static,
    {
        self.json_detect_error = Some(Arc::new(f));
        self
    }

    pub fn parse_result<F>(mut self, f: F) -> Self
    where
        F: Fn(InterceptResult) -> InterceptResult + Send + Sync + 'static,
    {
        self.json_parse_result = Some(Arc::new(f));
        self
    }

    pub fn captcha_solver(mut self, solver: Arc<dyn CaptchaSolver>) -> Self {
        self.captcha_solver = Some(solver);
        self
    }

    pub fn max_refresh(mut self, max_refresh: u32) -> Self {
        self.max_refresh = max_refresh;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn wait_seconds(mut self, wait_seconds: u32) -> Self {
        self.wait_seconds = wait_seconds;
        self
    }

    pub fn expect_more(mut self, expect_more: u32) -> Self {
        self.expect_more = expect_more;
        self
    }

    fn detect(&self, result: InterceptResult) -> (bool, InterceptResult) {
        match &self.json_detect_error {
            Some(detect) => detect(result),
            None => (false, result),
        }
    }

    /// Apply the parser unless the detector flagged an error.
    fn parse_if_valid(&self, is_error: bool, result: InterceptResult) -> InterceptResult {
        match &self.json_parse_result {
            Some(parse) if !is_error => parse(result),
            _ => result,
        }
    }
}

/// Latest payload captured from the page.
#[derive(Debug, Default)]
pub struct InterceptBuffer {
    captured: Option<InterceptResult>,
}

impl InterceptBuffer {
    /// Record a payload. One carrying a truthy `error` member is stored as
    /// an [`ErrorTag::Intercept`] result.
    pub fn store(&mut self, payload: Value) {
        let captured = match payload.get("error") {
            Some(err) if is_truthy(err) => {
                let message = err
                    .as_str()
                    .map(String::from)
                    .unwrap_or_else(|| err.to_string());
                InterceptResult::error(ErrorTag::Intercept, message)
            },
            _ => InterceptResult::success(payload),
        };
        self.captured = Some(captured);
    }

    pub fn current(&self) -> Option<&InterceptResult> {
        self.captured.as_ref()
    }

    pub fn take(&mut self) -> Option<InterceptResult> {
        self.captured.take()
    }

    pub fn clear(&mut self) {
        self.captured = None;
    }

    /// Nothing captured, or a success with no data.
    pub fn is_empty(&self) -> bool {
        self.captured.as_ref().is_none_or(is_empty_capture)
    }
}

fn is_empty_capture(captured: &InterceptResult) -> bool {
    captured.is_success() && !is_truthy(&captured.data)
}

/// Feeds responses whose URL contains a substring into a buffer.
#[derive(Debug, Clone)]
pub struct ResponseHandler {
    json_url_subpart: String,
}

impl ResponseHandler {
    pub fn new(json_url_subpart: impl Into<String>) -> Self {
        Self {
            json_url_subpart: json_url_subpart.into(),
        }
    }

    pub fn matches(&self, url: &str) -> bool {
        url.contains(&self.json_url_subpart)
    }

    /// Returns whether the response was captured.
    pub async fn handle(
        &self,
        page: &dyn BrowserPage,
        response: &PageResponse,
        buffer: &mut InterceptBuffer,
    ) -> bool {
        if !self.matches(&response.url) {
            return false;
        }

        let parsed = match page.response_body(&response.request_id).await {
            Ok(body) => serde_json::from_str::<Value>(&body).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        let payload = parsed.unwrap_or_else(|e| {
            json!({ "error": format!("exception when trying to intercept:{e}") })
        });

        debug!(url = %response.url, status = response.status, "intercepted json response");
        buffer.store(payload);
        true
    }
}

/// A page subscribed to its responses, with the capture buffer.
struct Interception<'a> {
    page: &'a dyn BrowserPage,
    responses: ResponseStream,
    handler: ResponseHandler,
    buffer: InterceptBuffer,
}

impl<'a> Interception<'a> {
    async fn start(
        page: &'a dyn BrowserPage,
        json_url_subpart: &str,
    ) -> Result<Self, BrowserError> {
        Ok(Self {
            page,
            responses: page.responses().await?,
            handler: ResponseHandler::new(json_url_subpart),
            buffer: InterceptBuffer::default(),
        })
    }

    /// Handle every response already delivered.
    async fn dispatch_pending(&mut self) {
        while let Some(Some(response)) = self.responses.next().now_or_never() {
            self.handler
                .handle(self.page, &response, &mut self.buffer)
                .await;
        }
    }

    /// Wait for `duration`, handling responses as they arrive.
    async fn pump(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                next = self.responses.next() => match next {
                    Some(response) => {
                        self.handler
                            .handle(self.page, &response, &mut self.buffer)
                            .await;
                    },
                    None => {
                        tokio::time::sleep_until(deadline).await;
                        break;
                    },
                },
            }
        }
    }
}

fn listen_failed(e: BrowserError) -> InterceptResult {
    InterceptResult::error(
        ErrorTag::Intercept,
        format!("failed to listen for responses: {e}"),
    )
}

/// Open `page_url` on `page` and wait for the JSON of a call whose URL
/// contains `json_url_subpart`.
///
/// Polls until a non-empty payload is captured or the time/refresh budget is
/// spent. A detector tagging [`ErrorTag::CaptchaRaised`] triggers the
/// CAPTCHA solver, which may refresh the page.
pub async fn intercept_json_on(
    page: &dyn BrowserPage,
    page_url: &str,
    json_url_subpart: &str,
    options: &InterceptOptions,
) -> InterceptResult {
    let mut interception = match Interception::start(page, json_url_subpart).await {
        Ok(i) => i,
        Err(e) => return listen_failed(e),
    };

    let start = Instant::now();
    if let Err(e) = page.goto(page_url, options.goto_timeout).await {
        warn!(url = page_url, error = %e, "navigation failed, polling for intercepted json anyway");
    }
    let mut time_spent = start.elapsed();

    let mut nb_refresh = 0;
    let mut captcha_to_solve = false;
    let mut is_error = false;
    let mut result = InterceptResult::empty();

    while time_spent <= options.timeout && nb_refresh < options.max_refresh {
        let iteration = Instant::now();

        interception.dispatch_pending().await;
        debug!(
            time_spent_ms = time_spent.as_millis() as u64,
            captured = interception.buffer.current().is_some(),
            "polling intercepted json"
        );

        let captured = interception
            .buffer
            .current()
            .cloned()
            .unwrap_or_else(|| InterceptResult::success(Value::Object(Map::new())));
        (is_error, result) = options.detect(captured);

        if interception.buffer.is_empty() {
            result = InterceptResult::empty();
        } else if result.has_error(&ErrorTag::CaptchaRaised) {
            captcha_to_solve = true;
        } else {
            break;
        }

        if captcha_to_solve && let Some(solver) = &options.captcha_solver {
            let outcome = solver.solve(page).await;
            if outcome.solved {
                captcha_to_solve = false;
                interception.buffer.clear();
                result = InterceptResult::empty();
            }
            if outcome.ask_for_refresh {
                nb_refresh += 1;
                debug!(nb_refresh, "refresh");
                if let Err(e) = page.goto(page_url, options.refresh_timeout).await {
                    debug!(error = %e, "refresh navigation failed");
                }
            }
        }

        let elapsed = iteration.elapsed();
        if elapsed < options.poll_floor {
            interception.pump(options.poll_floor - elapsed).await;
        }
        time_spent += iteration.elapsed();
    }

    options.parse_if_valid(is_error, result)
}

/// Fixed-budget variant: `wait_seconds * 2` polls of 500ms, no refresh.
///
/// Navigation failures end the interception with
/// [`ErrorTag::Timeout`] or [`ErrorTag::Goto`].
pub async fn intercept_json_legacy_on(
    page: &dyn BrowserPage,
    page_url: &str,
    json_url_subpart: &str,
    options: &InterceptOptions,
) -> InterceptResult {
    let mut interception = match Interception::start(page, json_url_subpart).await {
        Ok(i) => i,
        Err(e) => return listen_failed(e),
    };

    match page.goto(page_url, options.goto_timeout).await {
        Ok(()) => {},
        Err(e @ BrowserError::Timeout(_)) => {
            return InterceptResult::error(ErrorTag::Timeout, e.to_string());
        },
        Err(e) => return InterceptResult::error(ErrorTag::Goto, e.to_string()),
    }

    let mut result = InterceptResult::empty();
    for _ in 0..options.wait_seconds * 2 {
        interception.pump(POLL_STEP).await;
        if let Some(captured) = interception.buffer.current()
            && !is_empty_capture(captured)
        {
            result = captured.clone();
            break;
        }
        debug!("no json intercepted yet");
    }

    let (is_error, result) = options.detect(result);
    options.parse_if_valid(is_error, result)
}

/// Like [`intercept_json_legacy_on`], but keeps listening past erroneous
/// payloads: up to `expect_more` of them are discarded while waiting for a
/// valid one. A navigation timeout is tolerated.
pub async fn intercept_json_multiple_on(
    page: &dyn BrowserPage,
    page_url: &str,
    json_url_subpart: &str,
    options: &InterceptOptions,
) -> InterceptResult {
    let mut interception = match Interception::start(page, json_url_subpart).await {
        Ok(i) => i,
        Err(e) => return listen_failed(e),
    };

    match page.goto(page_url, options.goto_timeout).await {
        Ok(()) => {},
        Err(e @ BrowserError::Timeout(_)) => {
            debug!(error = %e, "navigation timed out, still listening");
        },
        Err(e) => return InterceptResult::error(ErrorTag::Goto, e.to_string()),
    }

    let mut is_error = true;
    let mut result = InterceptResult::empty();
    let mut expect_more = options.expect_more;

    for _ in 0..options.wait_seconds * 2 {
        interception.pump(POLL_STEP).await;

        let Some(captured) = interception.buffer.take() else {
            continue;
        };
        if is_empty_capture(&captured) {
            continue;
        }

        is_error = !captured.is_success();
        result = captured;
        if options.json_detect_error.is_some() {
            (is_error, result) = options.detect(result);
        }

        if !is_error || expect_more == 0 {
            break;
        }
        expect_more -= 1;
        debug!(expect_more, "erroneous payload, waiting for another");
    }

    options.parse_if_valid(is_error, result)
}

/// Fetch a JSON endpoint by opening it in the page and capturing its own
/// response.
pub async fn request_json_on(
    page: &dyn BrowserPage,
    json_url: &str,
    options: &InterceptOptions,
) -> InterceptResult {
    intercept_json_on(page, json_url, json_url, options).await
}

/// [`intercept_json_on`] on a page opened with `launch`.
pub async fn intercept_json(
    launch: &LaunchOptions,
    page_url: &str,
    json_url_subpart: &str,
    options: &InterceptOptions,
) -> Result<InterceptResult, BrowserError> {
    with_page(launch, |page| async move {
        intercept_json_on(&page, page_url, json_url_subpart, options).await
    })
    .await
}

/// [`intercept_json_legacy_on`] on a page opened with `launch`.
pub async fn intercept_json_legacy(
    launch: &LaunchOptions,
    page_url: &str,
    json_url_subpart: &str,
    options: &InterceptOptions,
) -> Result<InterceptResult, BrowserError> {
    with_page(launch, |page| async move {
        intercept_json_legacy_on(&page, page_url, json_url_subpart, options).await
    })
    .await
}

/// [`intercept_json_multiple_on`] on a page opened with `launch`.
pub async fn intercept_json_multiple(
    launch: &LaunchOptions,
    page_url: &str,
    json_url_subpart: &str,
    options: &InterceptOptions,
) -> Result<InterceptResult, BrowserError> {
    with_page(launch, |page| async move {
        intercept_json_multiple_on(&page, page_url, json_url_subpart, options).await
    })
    .await
}

/// [`request_json_on`] on a page opened with `launch`.
pub async fn request_json(
    launch: &LaunchOptions,
    json_url: &str,
    options: &InterceptOptions,
) -> Result<InterceptResult, BrowserError> {
    with_page(launch, |page| async move {
        request_json_on(&page, json_url, options).await
    })
    .await
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::testing::{FakePage, Navigation},
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    const SITE: &str = "https://jsonplaceholder.typicode.com";
    const POSTS: &str = "https://jsonplaceholder.typicode.com/posts/1";

    fn captcha_detector(result: InterceptResult) -> (bool, InterceptResult) {
        if result.data.get("captcha").is_some_and(is_truthy) {
            (
                true,
                InterceptResult::error(ErrorTag::CaptchaRaised, "captcha wall"),
            )
        } else {
            (false, result)
        }
    }

    fn status_detector(result: InterceptResult) -> (bool, InterceptResult) {
        if result.data.get("status") == Some(&json!("error")) {
            (true, InterceptResult::error(ErrorTag::Other("ApiError".into()), "status=error"))
        } else {
            (false, result)
        }
    }

    struct RefreshingSolver {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CaptchaSolver for RefreshingSolver {
        async fn solve(&self, _page: &dyn BrowserPage) -> CaptchaOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            CaptchaOutcome {
                ask_for_refresh: true,
                solved: true,
            }
        }
    }

    #[test]
    fn buffer_stores_valid_payload() {
        let mut buffer = InterceptBuffer::default();
        buffer.store(json!({"data": {"test_key": "test_value"}}));
        assert_eq!(
            buffer.current(),
            Some(&InterceptResult::success(
                json!({"data": {"test_key": "test_value"}})
            ))
        );
        assert!(!buffer.is_empty());
    }

    #[test]
    fn buffer_wraps_erroring_payload() {
        let mut buffer = InterceptBuffer::default();
        buffer.store(json!({"data": {}, "error": "Error message"}));
        assert_eq!(
            serde_json::to_value(buffer.current().unwrap()).unwrap(),
            json!({
                "error": "PlaywrightInterceptError",
                "error_message": "Error message",
                "data": {},
            })
        );
        assert!(!buffer.is_empty());
    }

    #[test]
    fn buffer_treats_falsy_error_as_clean() {
        let mut buffer = InterceptBuffer::default();
        buffer.store(json!({"error": null, "items": [1]}));
        assert!(buffer.current().unwrap().is_success());

        buffer.store(json!({}));
        assert!(buffer.is_empty());
        buffer.clear();
        assert!(buffer.current().is_none());
    }

    #[tokio::test]
    async fn handler_captures_matching_response() {
        let page = FakePage::new();
        let response = page.register(POSTS, r#"{"id": 1}"#);
        let mut buffer = InterceptBuffer::default();

        let handler = ResponseHandler::new("/posts/1");
        assert!(handler.handle(&page, &response, &mut buffer).await);
        assert_eq!(buffer.current().unwrap().data, json!({"id": 1}));
    }

    #[tokio::test]
    async fn handler_ignores_other_urls() {
        let page = FakePage::new();
        let response = page.register(POSTS, r#"{"id": 1}"#);
        let mut buffer = InterceptBuffer::default();

        let handler = ResponseHandler::new("/posts/2");
        assert!(!handler.handle(&page, &response, &mut buffer).await);
        assert!(buffer.current().is_none());
    }

    #[tokio::test]
    async fn handler_records_parse_failures() {
        let page = FakePage::new();
        let response = page.register(POSTS, "<html>not json</html>");
        let mut buffer = InterceptBuffer::default();

        ResponseHandler::new("/posts/1")
            .handle(&page, &response, &mut buffer)
            .await;
        let captured = buffer.current().unwrap();
        assert!(captured.has_error(&ErrorTag::Intercept));
        assert!(
            captured
                .error_message
                .as_deref()
                .unwrap()
                .starts_with("exception when trying to intercept:")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn intercepts_valid_json() {
        let page = FakePage::new();
        page.on_goto(Navigation::ok().respond(SITE, "<html></html>").respond(POSTS, r#"{"key": "value"}"#));

        let result = intercept_json_on(&page, SITE, "/posts/1", &InterceptOptions::default()).await;
        assert_eq!(result, InterceptResult::success(json!({"key": "value"})));
        assert_eq!(page.goto_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn late_response_is_picked_up_while_polling() {
        let page = FakePage::new();
        page.on_goto(Navigation::ok().respond_after(
            POSTS,
            r#"{"key": "late"}"#,
            Duration::from_millis(1300),
        ));

        let start = Instant::now();
        let result = intercept_json_on(&page, SITE, "/posts/1", &InterceptOptions::default()).await;
        assert_eq!(result.data, json!({"key": "late"}));
        assert!(start.elapsed() >= Duration::from_millis(1300));
        assert!(start.elapsed() < Duration::from_millis(4000));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_budget_returns_empty_error() {
        let page = FakePage::new();
        page.on_goto(Navigation::ok().respond("https://jsonplaceholder.typicode.com/posts/2", "{}"));

        let start = Instant::now();
        let result = intercept_json_on(&page, SITE, "/posts/1", &InterceptOptions::default()).await;
        assert_eq!(result, InterceptResult::empty());
        assert!(start.elapsed() > Duration::from_millis(4000));
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_failure_is_not_fatal() {
        let page = FakePage::new();
        page.on_goto(Navigation::timeout().respond(POSTS, r#"{"key": "value"}"#));

        let result = intercept_json_on(&page, SITE, "/posts/1", &InterceptOptions::default()).await;
        assert!(result.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_refresh_budget_skips_polling() {
        let page = FakePage::new();
        page.on_goto(Navigation::ok().respond(POSTS, r#"{"key": "value"}"#));

        let options = InterceptOptions::default().max_refresh(0);
        let result = intercept_json_on(&page, SITE, "/posts/1", &options).await;
        assert_eq!(result, InterceptResult::empty());
    }

    #[tokio::test(start_paused = true)]
    async fn captcha_is_solved_and_page_refreshed() {
        let page = FakePage::new();
        page.on_goto(Navigation::ok().respond(POSTS, r#"{"captcha": true}"#));
        page.on_goto(Navigation::ok().respond(POSTS, r#"{"key": "value"}"#));

        let solver = Arc::new(RefreshingSolver {
            calls: AtomicUsize::new(0),
        });
        let options = InterceptOptions::default()
            .detect_error(captcha_detector)
            .captcha_solver(solver.clone())
            .max_refresh(2);

        let result = intercept_json_on(&page, SITE, "/posts/1", &options).await;
        assert_eq!(result, InterceptResult::success(json!({"key": "value"})));
        assert_eq!(solver.calls.load(Ordering::SeqCst), 1);
        assert_eq!(page.goto_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unsolved_captcha_skips_the_parser() {
        let page = FakePage::new();
        page.on_goto(Navigation::ok().respond(POSTS, r#"{"captcha": true}"#));

        let parsed = Arc::new(AtomicUsize::new(0));
        let counter = parsed.clone();
        let options = InterceptOptions::default()
            .detect_error(captcha_detector)
            .parse_result(move |r| {
                counter.fetch_add(1, Ordering::SeqCst);
                r
            });

        let result = intercept_json_on(&page, SITE, "/posts/1", &options).await;
        assert!(result.has_error(&ErrorTag::CaptchaRaised));
        assert_eq!(parsed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn parser_reshapes_valid_result() {
        let page = FakePage::new();
        page.on_goto(Navigation::ok().respond(POSTS, r#"{"items": [1, 2, 3]}"#));

        let options = InterceptOptions::default().parse_result(|mut r| {
            let count = r.data["items"].as_array().map_or(0, Vec::len);
            r.data = json!({ "count": count });
            r
        });

        let result = intercept_json_on(&page, SITE, "/posts/1", &options).await;
        assert_eq!(result.data, json!({"count": 3}));
    }

    #[tokio::test(start_paused = true)]
    async fn parser_sees_exhausted_budget() {
        let page = FakePage::new();
        page.on_goto(Navigation::ok());

        let parsed = Arc::new(AtomicUsize::new(0));
        let counter = parsed.clone();
        let options = InterceptOptions::default().parse_result(move |r| {
            counter.fetch_add(1, Ordering::SeqCst);
            r
        });

        let result = intercept_json_on(&page, SITE, "/posts/1", &options).await;
        assert_eq!(result, InterceptResult::empty());
        assert_eq!(parsed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn legacy_parser_sees_empty_result() {
        let page = FakePage::new();
        page.on_goto(Navigation::ok());

        let options = InterceptOptions::default()
            .wait_seconds(1)
            .parse_result(|mut r| {
                r.data = json!({"parsed": true});
                r
            });

        let result = intercept_json_legacy_on(&page, SITE, "/posts/1", &options).await;
        assert!(result.has_error(&ErrorTag::Intercept));
        assert_eq!(result.data, json!({"parsed": true}));
    }

    #[tokio::test(start_paused = true)]
    async fn request_json_matches_its_own_url() {
        let page = FakePage::new();
        page.on_goto(Navigation::ok().respond(POSTS, r#"{"id": 1}"#));

        let result = request_json_on(&page, POSTS, &InterceptOptions::default()).await;
        assert_eq!(result.data, json!({"id": 1}));
    }

    #[tokio::test(start_paused = true)]
    async fn legacy_reports_navigation_timeout() {
        let page = FakePage::new();
        page.on_goto(Navigation::timeout());

        let result =
            intercept_json_legacy_on(&page, SITE, "/posts/1", &InterceptOptions::default()).await;
        assert!(result.has_error(&ErrorTag::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn legacy_reports_navigation_failure() {
        let page = FakePage::new();
        page.on_goto(Navigation::fail("net::ERR_NAME_NOT_RESOLVED"));

        let result =
            intercept_json_legacy_on(&page, SITE, "/posts/1", &InterceptOptions::default()).await;
        assert!(result.has_error(&ErrorTag::Goto));
        assert!(
            result
                .error_message
                .unwrap()
                .contains("ERR_NAME_NOT_RESOLVED")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn legacy_gives_up_after_wait_seconds() {
        let page = FakePage::new();
        page.on_goto(Navigation::ok());

        let start = Instant::now();
        let options = InterceptOptions::default().wait_seconds(2);
        let result = intercept_json_legacy_on(&page, SITE, "/posts/1", &options).await;
        assert_eq!(result, InterceptResult::empty());
        assert!(start.elapsed() >= Duration::from_millis(2000));
        assert!(start.elapsed() < Duration::from_millis(2500));
    }

    #[tokio::test(start_paused = true)]
    async fn legacy_returns_first_payload() {
        let page = FakePage::new();
        page.on_goto(Navigation::ok().respond(POSTS, r#"{"key": "value"}"#));

        let result =
            intercept_json_legacy_on(&page, SITE, "/posts/1", &InterceptOptions::default()).await;
        assert_eq!(result, InterceptResult::success(json!({"key": "value"})));
    }

    #[tokio::test(start_paused = true)]
    async fn multiple_skips_erroneous_payloads() {
        let page = FakePage::new();
        page.on_goto(
            Navigation::ok()
                .respond(POSTS, r#"{"status": "error"}"#)
                .respond_after(POSTS, r#"{"status": "ok"}"#, Duration::from_millis(1200)),
        );

        let options = InterceptOptions::default()
            .detect_error(status_detector)
            .expect_more(1);
        let result = intercept_json_multiple_on(&page, SITE, "/posts/1", &options).await;
        assert_eq!(result, InterceptResult::success(json!({"status": "ok"})));
    }

    #[tokio::test(start_paused = true)]
    async fn multiple_stops_when_no_more_expected() {
        let page = FakePage::new();
        page.on_goto(
            Navigation::ok()
                .respond(POSTS, r#"{"status": "error"}"#)
                .respond_after(POSTS, r#"{"status": "ok"}"#, Duration::from_millis(1200)),
        );

        let options = InterceptOptions::default().detect_error(status_detector);
        let result = intercept_json_multiple_on(&page, SITE, "/posts/1", &options).await;
        assert_eq!(result.error, Some(ErrorTag::Other("ApiError".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn multiple_tolerates_navigation_timeout() {
        let page = FakePage::new();
        page.on_goto(Navigation::timeout().respond(POSTS, r#"{"key": "value"}"#));

        let result =
            intercept_json_multiple_on(&page, SITE, "/posts/1", &InterceptOptions::default())
                .await;
        assert!(result.is_success());

        let failing = FakePage::new();
        failing.on_goto(Navigation::fail("net::ERR_CONNECTION_REFUSED"));
        let result =
            intercept_json_multiple_on(&failing, SITE, "/posts/1", &InterceptOptions::default())
                .await;
        assert!(result.has_error(&ErrorTag::Goto));
    }
}
