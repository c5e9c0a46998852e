//! Print the records of one export file as JSON.

use anyhow::{Context, Result};
use fx_report::parser::DEFAULT_CLEARING;
use fx_report::{Instrument, RateFileParser};
use std::path::Path;

pub async fn run(file: &Path, clearing: Option<&str>) -> Result<()> {
    let parser = RateFileParser::new(clearing.unwrap_or(DEFAULT_CLEARING));
    let instrument = guess_instrument(file);
    let series = parser
        .parse(instrument, file)
        .with_context(|| format!("failed to parse {}", file.display()))?;
    println!("{}", serde_json::to_string_pretty(&series)?);
    Ok(())
}

fn guess_instrument(file: &Path) -> Instrument {
    let jpy = Instrument::jpy_rub();
    let name = file.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    if name.contains(&jpy.marker) {
        jpy
    } else {
        Instrument::usd_rub()
    }
}
