//! Subcommand implementations for the fx-report binary.

pub mod doctor;
pub mod parse_cmd;
pub mod report_cmd;
pub mod run_cmd;

use clap::Args;
use fx_report::acquisition::FailurePolicy;
use fx_report::config::{ConfigOverrides, SmtpSecurity};
use fx_report::notify::{MailTransport, SmtpMailer};
use fx_report::Config;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, warn};

/// Settings shared by every subcommand. Each one falls back to its
/// environment variable, then to the built-in default.
#[derive(Args, Debug, Default)]
pub struct SettingsArgs {
    /// Working directory for downloads and the report [env: FX_REPORT_DOWNLOAD_DIR]
    #[arg(long, global = true)]
    pub download_dir: Option<PathBuf>,

    /// Report output path (default: <download-dir>/report.xlsx)
    #[arg(long, global = true)]
    pub report_path: Option<PathBuf>,

    /// Portal landing page
    #[arg(long, global = true)]
    pub portal_url: Option<String>,

    /// Clearing category to keep from the exports
    #[arg(long, global = true)]
    pub clearing: Option<String>,

    /// Two file-name markers, USD first [env: FX_REPORT_MARKERS]
    #[arg(long, global = true, value_delimiter = ',')]
    pub markers: Option<Vec<String>>,

    /// SMTP server [env: FX_REPORT_SMTP_HOST]
    #[arg(long, global = true)]
    pub smtp_host: Option<String>,

    /// SMTP port [env: FX_REPORT_SMTP_PORT]
    #[arg(long, global = true)]
    pub smtp_port: Option<u16>,

    /// SMTP connection security (default: tls on 465, start-tls otherwise)
    #[arg(long, global = true, value_enum)]
    pub smtp_security: Option<SmtpSecurity>,

    /// Report recipient [env: FX_REPORT_RECIPIENT]
    #[arg(long, global = true)]
    pub recipient: Option<String>,

    /// Chromium/Chrome binary [env: FX_REPORT_CHROMIUM_PATH]
    #[arg(long, global = true)]
    pub chrome_path: Option<PathBuf>,

    /// Show the browser window
    #[arg(long, global = true)]
    pub headed: bool,

    /// Seconds to wait for each page element
    #[arg(long, global = true)]
    pub step_timeout: Option<u64>,

    /// Multiplier for the pauses between steps (0 to 100)
    #[arg(long, global = true)]
    pub settle_scale: Option<f64>,

    /// What a failed required step does to the rest of its pass
    #[arg(long, global = true, value_enum)]
    pub failure_policy: Option<FailurePolicy>,
}

impl SettingsArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            download_dir: self.download_dir.clone(),
            report_path: self.report_path.clone(),
            portal_url: self.portal_url.clone(),
            clearing: self.clearing.clone(),
            smtp_host: self.smtp_host.clone(),
            smtp_port: self.smtp_port,
            smtp_security: self.smtp_security,
            // Credentials come from the environment only.
            sender: None,
            password: None,
            recipient: self.recipient.clone(),
            markers: self.markers.clone(),
            chrome_path: self.chrome_path.clone(),
            headless: self.headed.then_some(false),
            step_timeout: self.step_timeout.map(Duration::from_secs),
            settle_scale: self.settle_scale,
            failure_policy: self.failure_policy,
        }
    }
}

/// The SMTP transport, or `None` (logged) when it cannot be set up.
pub fn smtp_mailer(config: &Config) -> Option<SmtpMailer> {
    if let Some(reason) = config.mail.delivery_blocker() {
        warn!("report will not be mailed, {reason}");
        return None;
    }
    match SmtpMailer::from_config(&config.mail) {
        Ok(mailer) => Some(mailer),
        Err(e) => {
            error!("mail delivery unavailable: {e}");
            None
        }
    }
}

pub fn as_transport(mailer: &Option<SmtpMailer>) -> Option<&dyn MailTransport> {
    mailer.as_ref().map(|m| m as &dyn MailTransport)
}

/// Value of the `Delivered:` summary line.
pub fn delivery_status(config: &Config, send: bool, delivered: bool) -> String {
    if delivered {
        return "yes".to_string();
    }
    if !send {
        return "no (sending disabled)".to_string();
    }
    match config.mail.delivery_blocker() {
        Some(reason) => format!("no ({reason})"),
        None => "no (delivery failed, see log)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fx_report::config::{PASSWORD_ENV, SENDER_ENV};

    fn config(recipient: Option<&str>) -> Config {
        Config::resolve_with(
            ConfigOverrides {
                recipient: recipient.map(String::from),
                ..ConfigOverrides::default()
            },
            |key| match key {
                SENDER_ENV => Some("reports@example.com".to_string()),
                PASSWORD_ENV => Some("secret".to_string()),
                _ => None,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_missing_recipient_is_named_in_status() {
        let config = config(None);
        let status = delivery_status(&config, true, false);
        assert!(status.starts_with("no ("), "{status}");
        assert!(status.contains("FX_REPORT_RECIPIENT"), "{status}");
        assert!(status.contains("--recipient"), "{status}");
        assert!(smtp_mailer(&config).is_none());
    }

    #[test]
    fn test_delivery_status() {
        let config = config(Some("treasury@example.com"));
        assert_eq!(delivery_status(&config, true, true), "yes");
        assert_eq!(delivery_status(&config, false, false), "no (sending disabled)");
        assert_eq!(
            delivery_status(&config, true, false),
            "no (delivery failed, see log)"
        );
        assert!(smtp_mailer(&config).is_some());
    }
}
