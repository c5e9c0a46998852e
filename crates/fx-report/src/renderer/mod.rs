//! Renderer abstraction for scripted page interaction.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over
//! the browser engine (currently Chromium via chromiumoxide). The acquisition
//! sequencer only ever talks to these traits.

pub mod chromium;
pub mod script;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// How an element on the page is found.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Locator {
    /// CSS selector, first match.
    Css(String),
    /// XPath expression, first match in document order.
    XPath(String),
    /// An `<a>` whose trimmed text equals the value.
    LinkText(String),
    /// Element id.
    Id(String),
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(s) => write!(f, "css={s}"),
            Self::XPath(s) => write!(f, "xpath={s}"),
            Self::LinkText(s) => write!(f, "link={s}"),
            Self::Id(s) => write!(f, "id={s}"),
        }
    }
}

/// Condition an element has to satisfy before it is acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Readiness {
    /// Attached to the DOM.
    Present,
    /// Attached, rendered with a non-empty box, and not disabled.
    Clickable,
}

/// A browser engine that can open page sessions.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(self: Box<Self>) -> Result<()>;
}

/// A single live page session.
///
/// Primitives are single attempts. Waiting and timeouts are layered on top
/// by [`crate::automation::PageAutomation`].
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Check once whether the located element satisfies `readiness`.
    async fn probe(&self, locator: &Locator, readiness: Readiness) -> Result<bool>;
    /// Click the located element.
    async fn click(&mut self, locator: &Locator) -> Result<()>;
    /// Clear the located input and type `text` into it.
    async fn fill(&mut self, locator: &Locator, text: &str) -> Result<()>;
    /// Get the current URL.
    async fn get_url(&self) -> Result<String>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;
}
