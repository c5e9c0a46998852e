//! Scripted acquisition of the rate exports.
//!
//! One browser session is opened, the portal landing page loaded, and the
//! step script from [`script`] run once per instrument. Each pass ends by
//! looking up the file the browser downloaded for that instrument. Step
//! failures never abort the run: they are recorded per step and, depending
//! on [`FailurePolicy`], may cut the current pass short.

pub mod script;

pub use script::{script, Criticality, Step, StepAction, StepKind, StepScope};

use crate::automation::{PageAutomation, DEFAULT_POLL_INTERVAL};
use crate::error::{AcquisitionError, InteractionError};
use crate::instrument::Instrument;
use crate::renderer::{RenderContext, Renderer};
use crate::window::DateWindow;
use crate::workdir;
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Landing page of the exchange portal.
pub const DEFAULT_PORTAL_URL: &str = "https://www.moex.com";

pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after the landing page has loaded.
pub const LANDING_SETTLE: Duration = Duration::from_secs(2);

const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest accepted settle multiplier.
pub const MAX_SETTLE_SCALE: f64 = 100.0;

/// What a failed required step does to the rest of its pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
pub enum FailurePolicy {
    /// Keep going with the next step.
    #[default]
    Continue,
    /// Skip the remaining steps of this pass. Later passes still run.
    AbortPass,
}

#[derive(Debug, Clone)]
pub struct SequencerOptions {
    pub portal_url: String,
    /// Where the browser saves downloads.
    pub download_dir: PathBuf,
    pub step_timeout: Duration,
    pub poll_interval: Duration,
    /// Multiplier for every settle delay. `0` disables them.
    pub settle_scale: f64,
    pub landing_settle: Duration,
    pub navigation_timeout: Duration,
    pub failure_policy: FailurePolicy,
}

impl Default for SequencerOptions {
    fn default() -> Self {
        Self {
            portal_url: DEFAULT_PORTAL_URL.to_string(),
            download_dir: PathBuf::from("data"),
            step_timeout: DEFAULT_STEP_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            settle_scale: 1.0,
            landing_settle: LANDING_SETTLE,
            navigation_timeout: NAVIGATION_TIMEOUT,
            failure_policy: FailurePolicy::Continue,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepStatus {
    Done,
    Failed(InteractionError),
    /// Not attempted because an earlier required step failed.
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub step: StepKind,
    pub criticality: Criticality,
    pub status: StepStatus,
}

/// Result of one instrument's pass.
#[derive(Debug, Clone)]
pub struct PassReport {
    pub instrument: Instrument,
    pub outcomes: Vec<StepOutcome>,
    /// The downloaded export, if one appeared.
    pub download: Option<PathBuf>,
}

impl PassReport {
    /// True when a required step failed.
    pub fn is_degraded(&self) -> bool {
        self.outcomes.iter().any(|o| {
            o.criticality == Criticality::Required && matches!(o.status, StepStatus::Failed(_))
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = &InteractionError> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            StepStatus::Failed(e) => Some(e),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct AcquisitionReport {
    pub passes: Vec<PassReport>,
}

impl AcquisitionReport {
    pub fn download_for(&self, marker: &str) -> Option<&Path> {
        self.passes
            .iter()
            .find(|p| p.instrument.marker == marker)
            .and_then(|p| p.download.as_deref())
    }

    pub fn degraded_passes(&self) -> usize {
        self.passes.iter().filter(|p| p.is_degraded()).count()
    }
}

/// Runs the step script for each instrument over one browser session.
pub struct AcquisitionSequencer {
    options: SequencerOptions,
}

impl AcquisitionSequencer {
    pub fn new(options: SequencerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SequencerOptions {
        &self.options
    }

    /// Acquire one export per instrument, in order.
    ///
    /// The page and the renderer are closed on every path out of this
    /// function, including a panic while driving the page.
    pub async fn run(
        &self,
        renderer: Box<dyn Renderer>,
        window: &DateWindow,
        instruments: &[Instrument],
    ) -> Result<AcquisitionReport, AcquisitionError> {
        let mut context = match renderer.new_context().await {
            Ok(context) => context,
            Err(e) => {
                shutdown(renderer).await;
                return Err(AcquisitionError::Session(e));
            }
        };

        let driven = AssertUnwindSafe(self.drive(context.as_mut(), window, instruments))
            .catch_unwind()
            .await;

        if let Err(e) = context.close().await {
            warn!("closing page failed: {e:#}");
        }
        shutdown(renderer).await;

        match driven {
            Ok(result) => result,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(reason, "acquisition panicked");
                Err(AcquisitionError::Aborted(reason))
            }
        }
    }

    async fn drive(
        &self,
        context: &mut dyn RenderContext,
        window: &DateWindow,
        instruments: &[Instrument],
    ) -> Result<AcquisitionReport, AcquisitionError> {
        let url = &self.options.portal_url;
        let timeout_ms = self.options.navigation_timeout.as_millis() as u64;
        let landed = context
            .navigate(url, timeout_ms)
            .await
            .map_err(|source| AcquisitionError::Navigation {
                url: url.clone(),
                source,
            })?;
        info!(
            url = %landed.final_url,
            load_time_ms = landed.load_time_ms,
            %window,
            "portal loaded"
        );
        self.settle(self.options.landing_settle).await;

        let mut report = AcquisitionReport::default();
        for (pass, instrument) in instruments.iter().enumerate() {
            let pass_report = self.run_pass(context, pass, instrument, window).await;
            report.passes.push(pass_report);
        }
        Ok(report)
    }

    async fn run_pass(
        &self,
        context: &mut dyn RenderContext,
        pass: usize,
        instrument: &Instrument,
        window: &DateWindow,
    ) -> PassReport {
        info!(pass = pass + 1, %instrument, "acquisition pass started");
        let timeout = self.options.step_timeout;
        let mut page = PageAutomation::new(context).with_poll_interval(self.options.poll_interval);
        let mut outcomes = Vec::new();
        let mut aborted = false;

        for step in script(instrument, window) {
            if !step.runs_on_pass(pass) {
                continue;
            }
            if aborted {
                outcomes.push(StepOutcome {
                    step: step.kind,
                    criticality: step.criticality,
                    status: StepStatus::Skipped,
                });
                continue;
            }

            let result = match &step.action {
                StepAction::Click(locator) => page.click(locator, &step.description, timeout).await,
                StepAction::Fill { locator, text } => {
                    page.fill(locator, text, &step.description, timeout).await
                }
            };

            let status = match result {
                Ok(()) => {
                    debug!(step = ?step.kind, "step done");
                    self.settle(step.settle).await;
                    StepStatus::Done
                }
                Err(e) => {
                    match step.criticality {
                        Criticality::Advisory => warn!(step = ?step.kind, "{e}"),
                        Criticality::Required => {
                            error!(step = ?step.kind, %instrument, "{e}");
                            aborted = self.options.failure_policy == FailurePolicy::AbortPass;
                        }
                    }
                    StepStatus::Failed(e)
                }
            };
            outcomes.push(StepOutcome {
                step: step.kind,
                criticality: step.criticality,
                status,
            });
        }

        let download = workdir::locate_download(&self.options.download_dir, &instrument.marker);
        match &download {
            Some(path) => info!(%instrument, path = %path.display(), "export downloaded"),
            None => warn!(
                %instrument,
                dir = %self.options.download_dir.display(),
                "no export found for this pass"
            ),
        }

        PassReport {
            instrument: instrument.clone(),
            outcomes,
            download,
        }
    }

    async fn settle(&self, base: Duration) {
        if let Some(pause) = settle_duration(base, self.options.settle_scale) {
            tokio::time::sleep(pause).await;
        }
    }
}

/// `base` scaled by `scale`, capped at [`MAX_SETTLE_SCALE`]. `None` when
/// there is nothing to wait for.
fn settle_duration(base: Duration, scale: f64) -> Option<Duration> {
    if !(scale.is_finite() && scale > 0.0) || base.is_zero() {
        return None;
    }
    Duration::try_from_secs_f64(base.as_secs_f64() * scale.min(MAX_SETTLE_SCALE)).ok()
}

async fn shutdown(renderer: Box<dyn Renderer>) {
    match renderer.shutdown().await {
        Ok(()) => debug!("browser shut down"),
        Err(e) => warn!("browser shutdown failed: {e:#}"),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::{Locator, NavigationResult, Readiness};
    use crate::window::previous_month_window;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Journal {
        navigations: Vec<String>,
        clicks: Vec<Locator>,
        fills: Vec<(Locator, String)>,
        closed: bool,
        shut_down: bool,
    }

    #[derive(Clone, Default)]
    struct Behaviour {
        fail_navigation: bool,
        /// Locators that never become ready.
        missing: Vec<Locator>,
        /// Clicking this locator panics.
        panic_on: Option<Locator>,
    }

    struct FakeRenderer {
        journal: Arc<Mutex<Journal>>,
        behaviour: Behaviour,
    }

    struct FakePage {
        journal: Arc<Mutex<Journal>>,
        behaviour: Behaviour,
    }

    #[async_trait]
    impl Renderer for FakeRenderer {
        async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
            Ok(Box::new(FakePage {
                journal: self.journal.clone(),
                behaviour: self.behaviour.clone(),
            }))
        }
        async fn shutdown(self: Box<Self>) -> Result<()> {
            self.journal.lock().unwrap().shut_down = true;
            Ok(())
        }
    }

    #[async_trait]
    impl RenderContext for FakePage {
        async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<NavigationResult> {
            if self.behaviour.fail_navigation {
                bail!("net::ERR_NAME_NOT_RESOLVED");
            }
            self.journal.lock().unwrap().navigations.push(url.to_string());
            Ok(NavigationResult {
                final_url: url.to_string(),
                load_time_ms: 5,
            })
        }
        async fn probe(&self, locator: &Locator, _readiness: Readiness) -> Result<bool> {
            Ok(!self.behaviour.missing.contains(locator))
        }
        async fn click(&mut self, locator: &Locator) -> Result<()> {
            if self.behaviour.panic_on.as_ref() == Some(locator) {
                panic!("renderer crashed");
            }
            self.journal.lock().unwrap().clicks.push(locator.clone());
            Ok(())
        }
        async fn fill(&mut self, locator: &Locator, text: &str) -> Result<()> {
            self.journal
                .lock()
                .unwrap()
                .fills
                .push((locator.clone(), text.to_string()));
            Ok(())
        }
        async fn get_url(&self) -> Result<String> {
            Ok(DEFAULT_PORTAL_URL.to_string())
        }
        async fn close(self: Box<Self>) -> Result<()> {
            self.journal.lock().unwrap().closed = true;
            Ok(())
        }
    }

    fn fake(behaviour: Behaviour) -> (Box<dyn Renderer>, Arc<Mutex<Journal>>) {
        let journal = Arc::new(Mutex::new(Journal::default()));
        (
            Box::new(FakeRenderer {
                journal: journal.clone(),
                behaviour,
            }),
            journal,
        )
    }

    fn sequencer(dir: &Path, policy: FailurePolicy) -> AcquisitionSequencer {
        AcquisitionSequencer::new(SequencerOptions {
            download_dir: dir.to_path_buf(),
            step_timeout: Duration::from_millis(20),
            poll_interval: Duration::from_millis(2),
            settle_scale: 0.0,
            failure_policy: policy,
            ..SequencerOptions::default()
        })
    }

    fn window() -> DateWindow {
        previous_month_window(NaiveDate::from_ymd_opt(2024, 10, 16).unwrap())
    }

    fn pair() -> Vec<Instrument> {
        vec![Instrument::usd_rub(), Instrument::jpy_rub()]
    }

    fn selector_of(instrument: &Instrument) -> Locator {
        script(instrument, &window())
            .into_iter()
            .find(|s| s.kind == StepKind::SelectInstrument)
            .map(|s| s.action.locator().clone())
            .unwrap()
    }

    #[test]
    fn test_settle_duration() {
        let base = Duration::from_secs(2);
        assert_eq!(settle_duration(base, 1.0), Some(base));
        assert_eq!(settle_duration(base, 0.5), Some(Duration::from_secs(1)));
        assert_eq!(settle_duration(base, 0.0), None);
        assert_eq!(settle_duration(base, f64::NAN), None);
        assert_eq!(settle_duration(Duration::ZERO, 3.0), None);
        assert_eq!(settle_duration(base, 1e300), Some(Duration::from_secs(200)));
    }

    #[tokio::test]
    async fn test_two_passes_share_one_session() {
        let dir = tempfile::tempdir().unwrap();
        let (renderer, journal) = fake(Behaviour::default());
        let report = sequencer(dir.path(), FailurePolicy::Continue)
            .run(renderer, &window(), &pair())
            .await
            .unwrap();

        assert_eq!(report.passes.len(), 2);
        let first: Vec<StepKind> = report.passes[0].outcomes.iter().map(|o| o.step).collect();
        let second: Vec<StepKind> = report.passes[1].outcomes.iter().map(|o| o.step).collect();
        assert_eq!(first.len(), 11);
        assert_eq!(
            second,
            [
                StepKind::OpenInstrumentSelector,
                StepKind::SelectInstrument,
                StepKind::FillStartDate,
                StepKind::FillEndDate,
                StepKind::SubmitQuery,
                StepKind::ExportXml,
            ]
        );
        assert!(report
            .passes
            .iter()
            .flat_map(|p| &p.outcomes)
            .all(|o| o.status == StepStatus::Done));

        let journal = journal.lock().unwrap();
        assert_eq!(journal.navigations, [DEFAULT_PORTAL_URL]);
        assert_eq!(journal.clicks.len(), 9 + 4);
        let fills: Vec<&str> = journal.fills.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(fills, ["01.09.2024", "30.09.2024", "01.09.2024", "30.09.2024"]);
        assert!(journal.closed && journal.shut_down);
    }

    #[tokio::test]
    async fn test_finds_downloads_by_marker() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("rates_USD_RUB.xml"), "<document/>").unwrap();
        let (renderer, _) = fake(Behaviour::default());
        let report = sequencer(dir.path(), FailurePolicy::Continue)
            .run(renderer, &window(), &pair())
            .await
            .unwrap();
        assert_eq!(
            report.download_for("USD_RUB"),
            Some(dir.path().join("rates_USD_RUB.xml").as_path())
        );
        assert_eq!(report.download_for("JPY_RUB"), None);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_pass_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let usd_selector = selector_of(&Instrument::usd_rub());
        let (renderer, journal) = fake(Behaviour {
            missing: vec![
                Locator::XPath(
                    r#"//span[@class="new-ui-button__label" and text()="Принять"]"#.into(),
                ),
                usd_selector.clone(),
            ],
            ..Behaviour::default()
        });
        let report = sequencer(dir.path(), FailurePolicy::Continue)
            .run(renderer, &window(), &pair())
            .await
            .unwrap();

        let first = &report.passes[0];
        assert!(first.is_degraded());
        assert_eq!(first.failures().count(), 2);
        assert!(matches!(first.outcomes[0].status, StepStatus::Failed(_)));
        assert_eq!(first.outcomes[0].criticality, Criticality::Advisory);
        assert_eq!(first.outcomes[10].status, StepStatus::Done);
        assert!(!report.passes[1].is_degraded());
        assert_eq!(report.degraded_passes(), 1);
        assert!(!journal.lock().unwrap().clicks.contains(&usd_selector));
    }

    #[tokio::test]
    async fn test_advisory_failure_is_not_degraded() {
        let dir = tempfile::tempdir().unwrap();
        let (renderer, _) = fake(Behaviour {
            missing: vec![Locator::XPath(
                r#"//a[@class="btn2 btn2-primary" and text()="Согласен"]"#.into(),
            )],
            ..Behaviour::default()
        });
        let report = sequencer(dir.path(), FailurePolicy::AbortPass)
            .run(renderer, &window(), &pair())
            .await
            .unwrap();
        assert!(!report.passes[0].is_degraded());
        assert_eq!(report.passes[0].failures().count(), 1);
        assert_eq!(report.passes[0].outcomes[10].status, StepStatus::Done);
    }

    #[tokio::test]
    async fn test_abort_pass_skips_rest_and_runs_next_pass() {
        let dir = tempfile::tempdir().unwrap();
        let (renderer, journal) = fake(Behaviour {
            missing: vec![selector_of(&Instrument::usd_rub())],
            ..Behaviour::default()
        });
        let report = sequencer(dir.path(), FailurePolicy::AbortPass)
            .run(renderer, &window(), &pair())
            .await
            .unwrap();

        let first = &report.passes[0];
        assert!(matches!(first.outcomes[6].status, StepStatus::Failed(_)));
        assert!(first.outcomes[7..]
            .iter()
            .all(|o| o.status == StepStatus::Skipped));
        assert!(report.passes[1]
            .outcomes
            .iter()
            .all(|o| o.status == StepStatus::Done));
        // Pass 1 filled nothing; pass 2 filled both dates.
        assert_eq!(journal.lock().unwrap().fills.len(), 2);
    }

    #[tokio::test]
    async fn test_teardown_after_navigation_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (renderer, journal) = fake(Behaviour {
            fail_navigation: true,
            ..Behaviour::default()
        });
        let err = sequencer(dir.path(), FailurePolicy::Continue)
            .run(renderer, &window(), &pair())
            .await
            .unwrap_err();
        assert!(matches!(err, AcquisitionError::Navigation { .. }));
        let journal = journal.lock().unwrap();
        assert!(journal.closed && journal.shut_down);
    }

    #[tokio::test]
    async fn test_teardown_after_panic() {
        let dir = tempfile::tempdir().unwrap();
        let (renderer, journal) = fake(Behaviour {
            panic_on: Some(Locator::Css(
                ".header__button.header-col.header-col--burger".into(),
            )),
            ..Behaviour::default()
        });
        let err = sequencer(dir.path(), FailurePolicy::Continue)
            .run(renderer, &window(), &pair())
            .await
            .unwrap_err();
        assert!(matches!(err, AcquisitionError::Aborted(ref m) if m == "renderer crashed"));
        let journal = journal.lock().unwrap();
        assert!(journal.closed && journal.shut_down);
    }
}
