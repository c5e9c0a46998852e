//! One monthly run: clean, acquire, parse, build, notify.
//!
//! Every stage logs its own failure and hands whatever it has to the next
//! stage. A run therefore always completes; [`RunSummary`] tells how far it
//! got.

use crate::acquisition::{AcquisitionReport, AcquisitionSequencer};
use crate::config::Config;
use crate::error::AcquisitionError;
use crate::instrument::Instrument;
use crate::notify::{MailTransport, Notifier};
use crate::parser::{RateFileParser, RateSeries};
use crate::renderer::Renderer;
use crate::report::{ReportBuilder, ReportFile};
use crate::window::DateWindow;
use crate::workdir;
use std::future::Future;
use std::path::Path;
use tracing::{error, info, warn};

/// What a run achieved.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub window: DateWindow,
    pub acquisition: Option<AcquisitionReport>,
    /// Rows in the written report.
    pub rows: usize,
    pub report: Option<ReportFile>,
    pub delivered: bool,
}

pub struct Pipeline<'a> {
    config: &'a Config,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Run every stage for `window`.
    ///
    /// `launch` is called after the working directory has been cleaned.
    /// Without a `mailer` the report is written but not sent.
    pub async fn run<F, Fut>(
        &self,
        window: DateWindow,
        launch: F,
        mailer: Option<&dyn MailTransport>,
    ) -> RunSummary
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Box<dyn Renderer>>>,
    {
        info!(%window, dir = %self.config.download_dir.display(), "run started");
        self.prepare_workdir();

        let acquisition = match launch().await {
            Ok(renderer) => self.acquire(renderer, &window).await,
            Err(e) => {
                error!("{}", AcquisitionError::Session(e));
                None
            }
        };

        let [a, b] = &self.config.instruments;
        let series_a = self.load(a, acquisition.as_ref());
        let series_b = self.load(b, acquisition.as_ref());
        let (report, delivered) = self.build_and_deliver(&series_a, &series_b, mailer).await;

        let summary = RunSummary {
            window,
            acquisition,
            rows: report.as_ref().map_or(0, |r| r.row_count),
            report,
            delivered,
        };
        info!(
            window = %summary.window,
            degraded_passes = summary.acquisition.as_ref().map_or(0, |a| a.degraded_passes()),
            rows = summary.rows,
            report = summary.report.is_some(),
            delivered = summary.delivered,
            "run finished"
        );
        summary
    }

    /// Build (and optionally send) a report from two existing export files.
    pub async fn report_from_files(
        &self,
        file_a: &Path,
        file_b: &Path,
        mailer: Option<&dyn MailTransport>,
    ) -> (Option<ReportFile>, bool) {
        let [a, b] = &self.config.instruments;
        let series_a = self.parse(a, Some(file_a));
        let series_b = self.parse(b, Some(file_b));
        self.build_and_deliver(&series_a, &series_b, mailer).await
    }

    fn prepare_workdir(&self) {
        match workdir::prepare(&self.config.download_dir) {
            Ok(failures) if failures.is_empty() => {}
            Ok(failures) => warn!(
                count = failures.len(),
                "some entries could not be removed from the working directory"
            ),
            Err(e) => error!("{e}"),
        }
    }

    async fn acquire(
        &self,
        renderer: Box<dyn Renderer>,
        window: &DateWindow,
    ) -> Option<AcquisitionReport> {
        let sequencer = AcquisitionSequencer::new(self.config.sequencer_options());
        match sequencer
            .run(renderer, window, &self.config.instruments)
            .await
        {
            Ok(report) => Some(report),
            Err(e) => {
                error!("{e}");
                None
            }
        }
    }

    /// Series for `instrument`, from the pass's download or a fresh lookup.
    fn load(&self, instrument: &Instrument, acquisition: Option<&AcquisitionReport>) -> RateSeries {
        let path = acquisition
            .and_then(|a| a.download_for(&instrument.marker))
            .map(Path::to_path_buf)
            .or_else(|| workdir::locate_download(&self.config.download_dir, &instrument.marker));
        self.parse(instrument, path.as_deref())
    }

    fn parse(&self, instrument: &Instrument, path: Option<&Path>) -> RateSeries {
        let Some(path) = path else {
            warn!(%instrument, "no export file, using empty series");
            return RateSeries::empty(instrument.clone());
        };
        let parser = RateFileParser::new(self.config.clearing.clone());
        match parser.parse(instrument.clone(), path) {
            Ok(series) => {
                info!(%instrument, records = series.len(), "rates parsed");
                series
            }
            Err(e) => {
                error!(%instrument, path = %path.display(), "{e}");
                RateSeries::empty(instrument.clone())
            }
        }
    }

    async fn build_and_deliver(
        &self,
        a: &RateSeries,
        b: &RateSeries,
        mailer: Option<&dyn MailTransport>,
    ) -> (Option<ReportFile>, bool) {
        let report = match ReportBuilder::new(&self.config.report_path).build(a, b) {
            Ok(report) => report,
            Err(e) => {
                error!(path = %self.config.report_path.display(), "{e}");
                return (None, false);
            }
        };

        let Some(mailer) = mailer else {
            info!(path = %report.path.display(), "delivery disabled, report kept on disk");
            return (Some(report), false);
        };
        let notifier = Notifier::new(self.config.mail.envelope(), mailer);
        let delivered = match notifier.send(&report.path, report.row_count).await {
            Ok(()) => true,
            Err(e) => {
                error!("{e}");
                false
            }
        };
        (Some(report), delivered)
    }
}
