//! Build the report from export files already on disk.

use super::{as_transport, delivery_status, smtp_mailer};
use anyhow::{bail, Result};
use fx_report::pipeline::Pipeline;
use fx_report::Config;
use std::path::Path;

pub async fn run(config: &Config, usd: &Path, jpy: &Path, send: bool) -> Result<()> {
    let mailer = if send { smtp_mailer(config) } else { None };
    let (report, delivered) = Pipeline::new(config)
        .report_from_files(usd, jpy, as_transport(&mailer))
        .await;

    let Some(report) = report else {
        bail!("report could not be written to {}", config.report_path.display());
    };
    println!("Report: {} ({} rows)", report.path.display(), report.row_count);
    if send {
        println!("Delivered: {}", delivery_status(config, send, delivered));
    }
    Ok(())
}
