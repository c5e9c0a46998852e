//! Error taxonomy for every pipeline stage.
//!
//! Only [`ConfigError`] is fatal to the process. Everything else is logged by
//! the pipeline and the run continues with whatever data is available.

use std::path::PathBuf;
use std::time::Duration;

use crate::renderer::Locator;

/// A page interaction that could not be completed within its timeout.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum InteractionError {
    #[error("{description}: {locator} not ready after {waited:?}{}", fmt_last(.last_error))]
    Timeout {
        description: String,
        locator: Locator,
        waited: Duration,
        last_error: Option<String>,
    },

    #[error("{description}: {locator} was ready but the action failed: {reason}")]
    Action {
        description: String,
        locator: Locator,
        reason: String,
    },
}

fn fmt_last(last: &Option<String>) -> String {
    match last {
        Some(e) => format!(" (last error: {e})"),
        None => String::new(),
    }
}

impl InteractionError {
    /// The human-readable step description the caller tagged this error with.
    pub fn description(&self) -> &str {
        match self {
            Self::Timeout { description, .. } | Self::Action { description, .. } => description,
        }
    }
}

/// Failure to read a downloaded rate file.
#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed XML: {0}")]
    Malformed(String),

    #[error("Row {row} has no `{attribute}` attribute")]
    MissingAttribute { row: usize, attribute: &'static str },

    #[error("Row {row} has an invalid rate {value:?}")]
    InvalidRate { row: usize, value: String },
}

/// Working-directory maintenance failures.
#[derive(thiserror::Error, Debug)]
pub enum FileSystemError {
    #[error("Cannot create {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot list {path}: {source}")]
    List {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Spreadsheet rendering failures.
#[derive(thiserror::Error, Debug)]
pub enum ReportError {
    #[error("Spreadsheet error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mail composition and transport failures.
#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    #[error("Mail setting `{0}` is not configured")]
    MissingSetting(&'static str),

    #[error("Invalid address {address:?}: {source}")]
    Address {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },

    #[error("Cannot build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("Cannot read attachment {path}: {source}")]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

/// Unrecoverable acquisition failures. Step failures are not in here: they
/// are recorded per step in the acquisition report.
#[derive(thiserror::Error, Debug)]
pub enum AcquisitionError {
    #[error("Browser session unavailable: {0:#}")]
    Session(anyhow::Error),

    #[error("Navigation to {url} failed: {source:#}")]
    Navigation { url: String, source: anyhow::Error },

    #[error("Acquisition aborted: {0}")]
    Aborted(String),
}

/// Invalid configuration. Fatal at startup.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Invalid portal URL {value:?}: {source}")]
    PortalUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Expected exactly two instrument markers, got {0}")]
    MarkerCount(usize),

    #[error("Invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Cannot resolve working directory: {0}")]
    CurrentDir(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_carries_description() {
        let err = InteractionError::Timeout {
            description: "open menu".into(),
            locator: Locator::Css(".burger".into()),
            waited: Duration::from_secs(10),
            last_error: Some("detached".into()),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("open menu:"));
        assert!(msg.contains(".burger"));
        assert!(msg.contains("last error: detached"));
        assert_eq!(err.description(), "open menu");
    }
}
