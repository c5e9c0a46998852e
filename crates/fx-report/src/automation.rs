//! Bounded-wait click/fill over a live [`RenderContext`].
//!
//! Each operation polls the element's readiness until it holds or the
//! timeout elapses, then performs one primitive. Failures come back as
//! [`InteractionError`] tagged with the caller's description; nothing here
//! aborts the caller.

use crate::error::InteractionError;
use crate::renderer::{Locator, Readiness, RenderContext};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Default interval between readiness probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Wraps a page session with per-call timeouts.
pub struct PageAutomation<'a> {
    context: &'a mut dyn RenderContext,
    poll_interval: Duration,
}

impl<'a> PageAutomation<'a> {
    pub fn new(context: &'a mut dyn RenderContext) -> Self {
        Self {
            context,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Wait up to `timeout` for the element to become clickable, then click it.
    pub async fn click(
        &mut self,
        locator: &Locator,
        description: &str,
        timeout: Duration,
    ) -> Result<(), InteractionError> {
        self.wait_for(locator, Readiness::Clickable, description, timeout)
            .await?;
        self.context
            .click(locator)
            .await
            .map_err(|e| action_error(description, locator, e))?;
        debug!(%locator, description, "clicked");
        Ok(())
    }

    /// Wait up to `timeout` for the element to exist, clear it and type `text`.
    pub async fn fill(
        &mut self,
        locator: &Locator,
        text: &str,
        description: &str,
        timeout: Duration,
    ) -> Result<(), InteractionError> {
        self.wait_for(locator, Readiness::Present, description, timeout)
            .await?;
        self.context
            .fill(locator, text)
            .await
            .map_err(|e| action_error(description, locator, e))?;
        debug!(%locator, description, text, "filled");
        Ok(())
    }

    async fn wait_for(
        &self,
        locator: &Locator,
        readiness: Readiness,
        description: &str,
        timeout: Duration,
    ) -> Result<(), InteractionError> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut last_error = None;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            // A probe that hangs must not outlive the step's own budget.
            let probe = tokio::time::timeout(
                remaining.max(Duration::from_millis(1)),
                self.context.probe(locator, readiness),
            )
            .await;
            match probe {
                Ok(Ok(true)) => return Ok(()),
                Ok(Ok(false)) => {}
                Ok(Err(e)) => last_error = Some(format!("{e:#}")),
                Err(_) => last_error = Some("probe timed out".to_string()),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(InteractionError::Timeout {
                    description: description.to_string(),
                    locator: locator.clone(),
                    waited: started.elapsed(),
                    last_error,
                });
            }
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
        }
    }
}

fn action_error(description: &str, locator: &Locator, error: anyhow::Error) -> InteractionError {
    InteractionError::Action {
        description: description.to_string(),
        locator: locator.clone(),
        reason: format!("{error:#}"),
    }
}
