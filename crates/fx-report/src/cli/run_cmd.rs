//! Full monthly run.

use super::{as_transport, delivery_status, smtp_mailer};
use anyhow::Result;
use fx_report::pipeline::Pipeline;
use fx_report::renderer::chromium::ChromiumRenderer;
use fx_report::renderer::Renderer;
use fx_report::{Config, DateWindow};

/// Acquire, build and mail the report for the previous month.
///
/// Stage failures are logged and never turn into an error here.
pub async fn run(config: &Config, send: bool) -> Result<()> {
    let mailer = if send { smtp_mailer(config) } else { None };
    let options = config.chromium_options();

    let summary = Pipeline::new(config)
        .run(
            DateWindow::today(),
            move || async move {
                let renderer = ChromiumRenderer::launch(&options).await?;
                Ok(Box::new(renderer) as Box<dyn Renderer>)
            },
            as_transport(&mailer),
        )
        .await;

    println!("Window:    {}", summary.window);
    if let Some(acquisition) = &summary.acquisition {
        for pass in &acquisition.passes {
            let state = if pass.is_degraded() { "degraded" } else { "ok" };
            match &pass.download {
                Some(path) => println!("{:<10} {state}, {}", pass.instrument.code, path.display()),
                None => println!("{:<10} {state}, no export", pass.instrument.code),
            }
        }
    } else {
        println!("Acquisition failed, see log");
    }
    match &summary.report {
        Some(report) => println!("Report:    {} ({} rows)", report.path.display(), report.row_count),
        None => println!("Report:    not written"),
    }
    println!("Delivered: {}", delivery_status(config, send, summary.delivered));
    Ok(())
}
