//! Convenience layer over a CDP-driven Chromium for scraping pages and the
//! JSON they fetch.
//!
//! # Features
//!
//! - **session**: open a browser, context and page configured in one call
//!   (proxy, cookies, downloads, webdriver masking, resource blocking)
//! - **surf**: post-action waits, load markers and timeout translation
//! - **blocker**: abort requests by resource type
//! - **intercept**: capture the JSON a page fetches, with retry, refresh and
//!   CAPTCHA hooks
//! - **config**: `pageplus.{toml,json}` discovery
//!
//! # Example
//!
//! ```ignore
//! use pageplus_browser::{InterceptOptions, LaunchOptions, intercept_json};
//!
//! let result = intercept_json(
//!     &LaunchOptions::default(),
//!     "https://jsonplaceholder.typicode.com",
//!     "/posts/1",
//!     &InterceptOptions::default(),
//! )
//! .await?;
//!
//! if result.is_success() {
//!     println!("{}", result.data);
//! }
//! ```

pub mod blocker;
pub mod config;
pub mod detect;
pub mod error;
pub mod intercept;
pub mod page;
pub mod session;
pub mod surf;
pub mod types;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod testing;

pub use {
    blocker::{BlockResources, ResourceBlocker, RouteDecision},
    config::{InterceptSettings, PagePlusConfig},
    error::BrowserError,
    intercept::{
        CaptchaOutcome, CaptchaSolver, InterceptBuffer, InterceptOptions, ResponseHandler,
        intercept_json, intercept_json_legacy, intercept_json_legacy_on, intercept_json_multiple,
        intercept_json_multiple_on, intercept_json_on, request_json, request_json_on,
    },
    page::{BrowserPage, CdpPage, PageResponse},
    session::{PageSession, open_new_page, with_page},
    surf::{
        LoadedMarker, Marker, MarkerPhase, WaitAfter, catch_timeout, check_for_loaded_marker,
        wait_after_execution,
    },
    types::{BrowserKind, CookieSpec, ErrorTag, InterceptResult, LaunchOptions, ProxyConfig},
};
