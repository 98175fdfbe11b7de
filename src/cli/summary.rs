use crate::backup::retention::SweepReport;
use crate::config::AppConfig;
use console::style;

pub fn display_header() {
    println!();
    println!("{}", style("╔════════════════════════════════════════╗").cyan());
    println!("{}", style("║        PostgreSQL xz Backup            ║").cyan());
    println!("{}", style("╚════════════════════════════════════════╝").cyan());
    println!();
}

/// Prints the resolved configuration. The password is never shown.
pub fn display_summary(config: &AppConfig) {
    let db = &config.database;
    let backup = &config.backup;

    println!("{}", style("Current Configuration:").bold());
    println!("  Database: {}", style(&db.name).green());
    println!("  User: {}", db.username);
    println!("  Host: {}", db.host);
    println!("  Port: {}", db.port);
    println!("  Parallel jobs: {}", db.parallel_jobs);
    println!("  Strategy: {}", backup.strategy);
    println!(
        "  Backup directory: {}",
        style(backup.directory.display()).cyan()
    );
    println!("  Retention: {}", backup.retention);
    match &config.schedule {
        Some(period) => println!("  Schedule: every {}", period),
        None => println!("  Schedule: {}", style("Not configured").dim()),
    }
    match &config.notification {
        Some(notification) => {
            println!("  Notifications: {}", style("Enabled").green());
            println!("    Webhook host: {}", webhook_host(&notification.webhook_url));
            println!(
                "    Display name: {}",
                notification.username.as_deref().unwrap_or("-")
            );
            println!(
                "    Icon URL: {}",
                notification.avatar_url.as_deref().unwrap_or("-")
            );
        }
        None => println!("  Notifications: {}", style("Disabled").yellow()),
    }
    println!();
}

/// The webhook path carries its token, so only the host is printed.
fn webhook_host(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "-".to_string())
}

pub fn display_sweep(report: &SweepReport) {
    if report.deleted.is_empty() {
        println!("{}", style("No old backups to delete.").dim());
    } else {
        println!("{}", style("Deleted:").bold());
        for path in &report.deleted {
            println!("  - {}", path.display());
        }
    }
    for failure in &report.failures {
        println!("{} {}", style("✗").red(), failure);
    }
}
