//! Run configuration.
//!
//! Every value resolves as: explicit override (CLI flag) > environment
//! variable > built-in default. Secrets only ever come from the first two.

use crate::acquisition::{
    FailurePolicy, SequencerOptions, DEFAULT_PORTAL_URL, DEFAULT_STEP_TIMEOUT, LANDING_SETTLE,
    MAX_SETTLE_SCALE,
};
use crate::automation::DEFAULT_POLL_INTERVAL;
use crate::error::ConfigError;
use crate::instrument::Instrument;
use crate::notify::Envelope;
use crate::parser::DEFAULT_CLEARING;
use crate::renderer::chromium::{ChromiumOptions, CHROMIUM_PATH_ENV};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DOWNLOAD_DIR_ENV: &str = "FX_REPORT_DOWNLOAD_DIR";
pub const SMTP_HOST_ENV: &str = "FX_REPORT_SMTP_HOST";
pub const SMTP_PORT_ENV: &str = "FX_REPORT_SMTP_PORT";
pub const SENDER_ENV: &str = "EMAIL";
pub const PASSWORD_ENV: &str = "EMAIL_PASSWORD";
pub const RECIPIENT_ENV: &str = "FX_REPORT_RECIPIENT";
pub const MARKERS_ENV: &str = "FX_REPORT_MARKERS";

pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
pub const DEFAULT_SMTP_PORT: u16 = 587;
pub const DEFAULT_DOWNLOAD_DIR: &str = "data";
pub const REPORT_FILE_NAME: &str = "report.xlsx";

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SmtpSecurity {
    /// Plain connection upgraded with STARTTLS (port 587).
    StartTls,
    /// TLS from the first byte (port 465).
    Tls,
}

impl SmtpSecurity {
    /// The usual mode for a submission port.
    pub fn for_port(port: u16) -> Self {
        if port == 465 {
            Self::Tls
        } else {
            Self::StartTls
        }
    }
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub security: SmtpSecurity,
    pub sender: Option<String>,
    pub password: Option<String>,
    pub recipient: Option<String>,
}

impl MailConfig {
    pub fn envelope(&self) -> Envelope {
        Envelope {
            sender: self.sender.clone(),
            recipient: self.recipient.clone(),
        }
    }

    /// Unset environment variables that delivery needs, in check order.
    pub fn missing_settings(&self) -> Vec<&'static str> {
        [
            (SENDER_ENV, &self.sender),
            (PASSWORD_ENV, &self.password),
            (RECIPIENT_ENV, &self.recipient),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| name)
        .collect()
    }

    /// Why the report cannot be mailed, or `None` when every setting is present.
    ///
    /// There is no default recipient, so a missing one is always called out.
    pub fn delivery_blocker(&self) -> Option<String> {
        let missing = self.missing_settings();
        if missing.is_empty() {
            return None;
        }
        let mut reason = format!("not configured: {}", missing.join(", "));
        if self.recipient.is_none() {
            reason.push_str(&format!(
                "; a recipient is required, set {RECIPIENT_ENV} or pass --recipient"
            ));
        }
        Some(reason)
    }
}

/// Values given explicitly, usually from command-line flags.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub download_dir: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
    pub portal_url: Option<String>,
    pub clearing: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_security: Option<SmtpSecurity>,
    pub sender: Option<String>,
    pub password: Option<String>,
    pub recipient: Option<String>,
    pub markers: Option<Vec<String>>,
    pub chrome_path: Option<PathBuf>,
    pub headless: Option<bool>,
    pub step_timeout: Option<Duration>,
    pub settle_scale: Option<f64>,
    pub failure_policy: Option<FailurePolicy>,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Absolute working directory for downloads and the report.
    pub download_dir: PathBuf,
    pub report_path: PathBuf,
    pub portal_url: Url,
    pub clearing: String,
    /// Pass order: the ratio is `instruments[0] / instruments[1]`.
    pub instruments: [Instrument; 2],
    pub mail: MailConfig,
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
    pub step_timeout: Duration,
    pub settle_scale: f64,
    pub failure_policy: FailurePolicy,
}

impl Config {
    /// Resolve against the process environment.
    pub fn resolve(overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        Self::resolve_with(overrides, |key| std::env::var(key).ok())
    }

    /// Resolve with an injectable environment lookup.
    pub fn resolve_with(
        overrides: ConfigOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let env = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let download_dir = overrides
            .download_dir
            .or_else(|| env(DOWNLOAD_DIR_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_DIR));
        let download_dir = absolutize(&download_dir)?;
        let report_path = match overrides.report_path {
            Some(path) => absolutize(&path)?,
            None => download_dir.join(REPORT_FILE_NAME),
        };

        let portal = overrides
            .portal_url
            .unwrap_or_else(|| DEFAULT_PORTAL_URL.to_string());
        let portal_url = Url::parse(&portal).map_err(|source| ConfigError::PortalUrl {
            value: portal.clone(),
            source,
        })?;

        let smtp_port = match overrides.smtp_port {
            Some(port) => port,
            None => match env(SMTP_PORT_ENV) {
                Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                    key: SMTP_PORT_ENV,
                    value: raw,
                })?,
                None => DEFAULT_SMTP_PORT,
            },
        };

        let markers = match overrides.markers {
            Some(markers) => markers,
            None => env(MARKERS_ENV)
                .map(|raw| raw.split(',').map(str::to_string).collect())
                .unwrap_or_else(|| vec!["USD_RUB".to_string(), "JPY_RUB".to_string()]),
        };
        let markers: Vec<String> = markers
            .into_iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
        let [usd_marker, jpy_marker]: [String; 2] = markers
            .try_into()
            .map_err(|m: Vec<String>| ConfigError::MarkerCount(m.len()))?;

        let settle_scale = overrides.settle_scale.unwrap_or(1.0);
        if !(0.0..=MAX_SETTLE_SCALE).contains(&settle_scale) {
            return Err(ConfigError::InvalidValue {
                key: "settle_scale",
                value: settle_scale.to_string(),
            });
        }

        Ok(Self {
            download_dir,
            report_path,
            portal_url,
            clearing: overrides
                .clearing
                .unwrap_or_else(|| DEFAULT_CLEARING.to_string()),
            instruments: [
                Instrument::usd_rub().with_marker(usd_marker),
                Instrument::jpy_rub().with_marker(jpy_marker),
            ],
            mail: MailConfig {
                smtp_host: overrides
                    .smtp_host
                    .or_else(|| env(SMTP_HOST_ENV))
                    .unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
                smtp_port,
                security: overrides
                    .smtp_security
                    .unwrap_or_else(|| SmtpSecurity::for_port(smtp_port)),
                sender: overrides.sender.or_else(|| env(SENDER_ENV)),
                password: overrides.password.or_else(|| env(PASSWORD_ENV)),
                recipient: overrides.recipient.or_else(|| env(RECIPIENT_ENV)),
            },
            chrome_path: overrides
                .chrome_path
                .or_else(|| env(CHROMIUM_PATH_ENV).map(PathBuf::from)),
            headless: overrides.headless.unwrap_or(true),
            step_timeout: overrides.step_timeout.unwrap_or(DEFAULT_STEP_TIMEOUT),
            settle_scale,
            failure_policy: overrides.failure_policy.unwrap_or_default(),
        })
    }

    pub fn chromium_options(&self) -> ChromiumOptions {
        ChromiumOptions {
            executable: self.chrome_path.clone(),
            headless: self.headless,
            download_dir: self.download_dir.clone(),
        }
    }

    pub fn sequencer_options(&self) -> SequencerOptions {
        SequencerOptions {
            portal_url: self.portal_url.to_string(),
            download_dir: self.download_dir.clone(),
            step_timeout: self.step_timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
            settle_scale: self.settle_scale,
            landing_settle: LANDING_SETTLE,
            failure_policy: self.failure_policy,
            ..SequencerOptions::default()
        }
    }
}

fn absolutize(path: &Path) -> Result<PathBuf, ConfigError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
