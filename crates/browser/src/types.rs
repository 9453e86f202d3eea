//! Launch options and the uniform interception result record.

use std::fmt;

use {
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

use crate::blocker::BlockResources;

/// Which browser engine to launch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chromium,
    /// Accepted in configuration, rejected at launch: CDP drives Chromium only.
    Firefox,
}

impl fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chromium => write!(f, "chromium"),
            Self::Firefox => write!(f, "firefox"),
        }
    }
}

/// Proxy used by every request of the launched browser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// e.g. `http://proxy.local:3128` or `socks5://127.0.0.1:1080`.
    pub server: String,
    /// Comma separated hosts that skip the proxy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bypass: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// A cookie imported into the browser context before the first navigation.
///
/// Either `url` or `domain` must be set for the browser to accept it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CookieSpec {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

/// How to open a browser, its context and its page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchOptions {
    pub browser: BrowserKind,
    pub headless: bool,
    pub proxy: Option<ProxyConfig>,
    pub accept_downloads: bool,
    /// Directory for accepted downloads (browser default if unset).
    pub download_dir: Option<String>,
    pub block_resources: BlockResources,
    pub cookies: Vec<CookieSpec>,
    /// Path to Chrome/Chromium binary (auto-detected if not set).
    pub chrome_path: Option<String>,
    /// Additional Chrome arguments.
    pub chrome_args: Vec<String>,
    pub user_agent: Option<String>,
    /// CDP request timeout in milliseconds.
    pub navigation_timeout_ms: u64,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            browser: BrowserKind::Chromium,
            headless: true,
            proxy: None,
            accept_downloads: true,
            download_dir: None,
            block_resources: BlockResources::default(),
            cookies: Vec::new(),
            chrome_path: None,
            chrome_args: Vec::new(),
            user_agent: None,
            navigation_timeout_ms: 30000,
            viewport_width: 1280,
            viewport_height: 800,
        }
    }
}

impl LaunchOptions {
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_cookies(mut self, cookies: Vec<CookieSpec>) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn block_resources(mut self, block: BlockResources) -> Self {
        self.block_resources = block;
        self
    }

    pub fn accept_downloads(mut self, accept: bool) -> Self {
        self.accept_downloads = accept;
        self
    }
}

/// Tag carried in [`InterceptResult::error`].
///
/// Serialised as the plain strings downstream consumers match on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorTag {
    /// Navigation did not finish in time.
    Timeout,
    /// Navigation failed for another reason.
    Goto,
    /// Nothing usable was intercepted.
    Intercept,
    /// Raised by an error detector to ask for the CAPTCHA path.
    CaptchaRaised,
    /// Any caller-defined tag.
    Other(String),
}

impl ErrorTag {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Timeout => "PlaywrightTimeoutError",
            Self::Goto => "PlaywrightGotoError",
            Self::Intercept => "PlaywrightInterceptError",
            Self::CaptchaRaised => "CaptchaRaisedError",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for ErrorTag {
    fn from(s: String) -> Self {
        match s.as_str() {
            "PlaywrightTimeoutError" => Self::Timeout,
            "PlaywrightGotoError" => Self::Goto,
            "PlaywrightInterceptError" => Self::Intercept,
            "CaptchaRaisedError" => Self::CaptchaRaised,
            _ => Self::Other(s),
        }
    }
}

impl From<ErrorTag> for String {
    fn from(tag: ErrorTag) -> Self {
        tag.as_str().to_string()
    }
}

impl fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) const EMPTY_JSON_MESSAGE: &str =
    "An empty json was collected after calling the hidden API.";

/// Uniform record returned by every interception function.
///
/// `error == None` means success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterceptResult {
    pub error: Option<ErrorTag>,
    pub error_message: Option<String>,
    pub data: Value,
}

impl InterceptResult {
    pub fn success(data: Value) -> Self {
        Self {
            error: None,
            error_message: None,
            data,
        }
    }

    pub fn error(tag: ErrorTag, message: impl Into<String>) -> Self {
        Self {
            error: Some(tag),
            error_message: Some(message.into()),
            data: Value::Object(Map::new()),
        }
    }

    /// The error returned when no JSON has been intercepted yet.
    pub fn empty() -> Self {
        Self::error(ErrorTag::Intercept, EMPTY_JSON_MESSAGE)
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn has_error(&self, tag: &ErrorTag) -> bool {
        self.error.as_ref() == Some(tag)
    }
}

/// Truthiness of a JSON value: null, false, zero and empty containers are
/// falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
