use anyhow::Result;
use clap::Parser;
use console::style;
use strata_runtime::migrations::MigrationReport;

use super::TargetArgs;

/// Run pending migrations.
#[derive(Parser)]
pub struct MigrateCommand {
    #[command(flatten)]
    pub target: TargetArgs,
}

impl MigrateCommand {
    pub async fn execute(self) -> Result<()> {
        let strata = self.target.load()?;

        let reports = match &self.target.database {
            Some(id) => vec![strata.migrate_database(id).await?],
            None => strata.migrate().await?,
        };

        if self.target.json {
            println!("{}", serde_json::to_string_pretty(&reports)?);
            return Ok(());
        }

        println!();
        println!(
            "  {}  {} Migrations",
            style("⛁").bold(),
            style("STRATA").bold().cyan()
        );
        println!();

        for report in &reports {
            print_report(report);
        }

        let applied: usize = reports.iter().map(|r| r.applied.len()).sum();
        println!(
            "  {} {} migration(s) applied across {} database(s)",
            style("✓").green(),
            applied,
            reports.len()
        );
        println!();

        Ok(())
    }
}

fn print_report(report: &MigrationReport) {
    if report.is_noop() {
        println!(
            "  {} {} is up to date",
            style("ℹ").blue(),
            style(&report.database).cyan()
        );
        return;
    }

    println!(
        "  {} {} batch {}",
        style("→").dim(),
        style(&report.database).cyan(),
        report.batch
    );
    for name in &report.applied {
        println!("    {} {}", style("✓").green(), name);
    }
}
