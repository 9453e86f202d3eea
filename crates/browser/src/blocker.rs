//! Request routing that aborts unwanted resource types.

use std::collections::HashSet;

use {
    chromiumoxide::{
        Page,
        cdp::browser_protocol::{
            fetch::{
                ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams,
                RequestPattern,
            },
            network::{ErrorReason, ResourceType},
        },
    },
    futures::StreamExt,
    serde::{Deserialize, Serialize},
    tokio::task::JoinHandle,
    tracing::debug,
};

use crate::error::BrowserError;

/// Resource types blocked when blocking is simply switched on.
pub const DEFAULT_BLOCKED_RESOURCES: &[&str] = &["stylesheet", "image", "font", "svg"];

/// Which resource types a page should refuse to load.
///
/// Written in configuration as `true`, `false` or a list of type names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BlockResourcesRepr", into = "BlockResourcesRepr")]
pub enum BlockResources {
    /// Block [`DEFAULT_BLOCKED_RESOURCES`].
    #[default]
    All,
    Nothing,
    Types(Vec<String>),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum BlockResourcesRepr {
    Flag(bool),
    List(Vec<String>),
}

impl From<BlockResourcesRepr> for BlockResources {
    fn from(repr: BlockResourcesRepr) -> Self {
        match repr {
            BlockResourcesRepr::Flag(true) => Self::All,
            BlockResourcesRepr::Flag(false) => Self::Nothing,
            BlockResourcesRepr::List(types) => Self::Types(types),
        }
    }
}

impl From<BlockResources> for BlockResourcesRepr {
    fn from(block: BlockResources) -> Self {
        match block {
            BlockResources::All => Self::Flag(true),
            BlockResources::Nothing => Self::Flag(false),
            BlockResources::Types(types) => Self::List(types),
        }
    }
}

impl BlockResources {
    /// The concrete type names to block; empty when blocking is off.
    pub fn resolve(&self) -> Vec<String> {
        match self {
            Self::All => DEFAULT_BLOCKED_RESOURCES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            Self::Nothing => Vec::new(),
            Self::Types(types) => types.clone(),
        }
    }

    /// A blocker for these types, or `None` when nothing is blocked.
    pub fn blocker(&self) -> Option<ResourceBlocker> {
        let types = self.resolve();
        (!types.is_empty()).then(|| ResourceBlocker::new(types))
    }
}

/// What to do with an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Abort,
    Continue,
}

/// Route handler classifying requests by resource type.
#[derive(Debug, Clone)]
pub struct ResourceBlocker {
    blocked: HashSet<String>,
}

impl ResourceBlocker {
    pub fn new<I, S>(resources_to_block: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            blocked: resources_to_block
                .into_iter()
                .map(|s| s.into().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn decide(&self, resource_type: &str) -> RouteDecision {
        if self.blocked.contains(&resource_type.to_ascii_lowercase()) {
            RouteDecision::Abort
        } else {
            RouteDecision::Continue
        }
    }

    pub fn blocked_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.blocked.iter().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Route every request of `page` through this blocker.
    ///
    /// The listener is registered before the Fetch domain is enabled so no
    /// paused request is missed. Abort the returned task to stop routing.
    pub async fn install(self, page: &Page) -> Result<JoinHandle<()>, BrowserError> {
        let mut paused = page.event_listener::<EventRequestPaused>().await?;

        let enable = EnableParams::builder()
            .patterns(vec![RequestPattern::builder().url_pattern("*").build()])
            .build();
        page.execute(enable).await?;

        let page = page.clone();
        Ok(tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let resource_type = resource_type_name(&event.resource_type);
                let outcome = match self.decide(resource_type) {
                    RouteDecision::Abort => page
                        .execute(FailRequestParams::new(
                            event.request_id.clone(),
                            ErrorReason::BlockedByClient,
                        ))
                        .await
                        .map(|_| ()),
                    RouteDecision::Continue => page
                        .execute(ContinueRequestParams::new(event.request_id.clone()))
                        .await
                        .map(|_| ()),
                };
                if let Err(e) = outcome {
                    debug!(resource_type, error = %e, "block_resources was correctly canceled");
                }
            }
        }))
    }
}

/// Lowercase name of a CDP resource type, as used in block lists.
pub fn resource_type_name(resource_type: &ResourceType) -> &'static str {
    match resource_type {
        ResourceType::Document => "document",
        ResourceType::Stylesheet => "stylesheet",
        ResourceType::Image => "image",
        ResourceType::Media => "media",
        ResourceType::Font => "font",
        ResourceType::Script => "script",
        ResourceType::TextTrack => "texttrack",
        ResourceType::Xhr => "xhr",
        ResourceType::Fetch => "fetch",
        ResourceType::EventSource => "eventsource",
        ResourceType::WebSocket => "websocket",
        ResourceType::Manifest => "manifest",
        _ => "other",
    }
}
