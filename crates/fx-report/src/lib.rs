// Copyright 2026 fx-report Contributors
// SPDX-License-Identifier: Apache-2.0

//! fx-report library: monthly indicative rate report.
//!
//! Drives a Chromium session through the exchange portal to export the
//! USD/RUB and JPY/RUB indicative rates for the previous calendar month,
//! merges both series into a ratio table, renders it as xlsx and mails it.

pub mod acquisition;
pub mod automation;
pub mod config;
pub mod error;
pub mod instrument;
pub mod notify;
pub mod parser;
pub mod pipeline;
pub mod renderer;
pub mod report;
pub mod window;
pub mod workdir;

pub use config::Config;
pub use error::{
    AcquisitionError, ConfigError, DeliveryError, FileSystemError, InteractionError, ParseError,
    ReportError,
};
pub use instrument::Instrument;
pub use parser::{RateFileParser, RateRecord, RateSeries};
pub use window::{previous_month_window, DateWindow};
