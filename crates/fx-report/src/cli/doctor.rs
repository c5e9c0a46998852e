//! Environment readiness check.

use anyhow::Result;
use fx_report::config::RECIPIENT_ENV;
use fx_report::renderer::chromium::find_chromium;
use fx_report::Config;
use std::path::Path;

/// Check Chromium, mail settings and the working directory.
pub async fn run(config: &Config) -> Result<()> {
    println!("fx-report doctor");
    println!("================");
    println!();
    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    let chromium = config.chrome_path.clone().or_else(find_chromium);
    let chromium_ok = match &chromium {
        Some(path) if path.exists() => {
            println!("[OK] Chromium found: {}", path.display());
            true
        }
        Some(path) => {
            println!("[!!] Configured Chromium does not exist: {}", path.display());
            false
        }
        None => {
            println!("[!!] Chromium NOT found. Install Chrome or set FX_REPORT_CHROMIUM_PATH.");
            false
        }
    };

    let dir_ok = match check_writable(&config.download_dir) {
        Ok(()) => {
            println!("[OK] Working directory writable: {}", config.download_dir.display());
            true
        }
        Err(e) => {
            println!(
                "[!!] Working directory {} not writable: {e}",
                config.download_dir.display()
            );
            false
        }
    };

    println!(
        "[--] SMTP server: {}:{} ({:?})",
        config.mail.smtp_host, config.mail.smtp_port, config.mail.security
    );
    let missing = config.mail.missing_settings();
    for name in missing {
        if name == RECIPIENT_ENV {
            println!(
                "[!!] Recipient is required: set {RECIPIENT_ENV} or pass --recipient (there is no default)"
            );
        } else {
            println!("[!!] {name} is not set; the report will not be mailed");
        }
    }
    let mail_ok = match config.mail.delivery_blocker() {
        None => {
            println!("[OK] Mail settings complete");
            true
        }
        Some(_) => false,
    };

    println!();
    if chromium_ok && dir_ok && mail_ok {
        println!("Status: READY");
    } else if chromium_ok && dir_ok {
        println!("Status: READY (report only, no delivery)");
    } else {
        println!("Status: NOT READY");
    }
    Ok(())
}

fn check_writable(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let probe = dir.join(".fx-report-doctor");
    std::fs::write(&probe, b"ok")?;
    std::fs::remove_file(&probe)
}
