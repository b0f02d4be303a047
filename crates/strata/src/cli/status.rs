use anyhow::Result;
use clap::Parser;
use console::style;
use strata_runtime::migrations::MigrationStatus;

use super::TargetArgs;

/// Show applied and pending migrations.
#[derive(Parser)]
pub struct StatusCommand {
    #[command(flatten)]
    pub target: TargetArgs,
}

impl StatusCommand {
    pub async fn execute(self) -> Result<()> {
        let strata = self.target.load()?;

        let statuses = match &self.target.database {
            Some(id) => vec![strata.status_of(id).await?],
            None => strata.status().await?,
        };

        if self.target.json {
            println!("{}", serde_json::to_string_pretty(&statuses)?);
            return Ok(());
        }

        println!();
        println!(
            "  {}  {} Migration Status",
            style("⛁").bold(),
            style("STRATA").bold().cyan()
        );
        println!();

        for status in &statuses {
            print_status(status);
        }

        Ok(())
    }
}

fn print_status(status: &MigrationStatus) {
    println!("  {}", style(&status.database).bold().cyan());

    if status.applied.is_empty() && status.pending.is_empty() {
        println!("    {} No migrations found", style("ℹ").blue());
        println!();
        return;
    }

    if !status.applied.is_empty() {
        println!("    {} Applied:", style("✓").green());
        for record in &status.applied {
            println!(
                "      {} {} {} ({})",
                style(format!("[{}]", record.batch)).dim(),
                style(&record.name).cyan(),
                style("at").dim(),
                record.applied_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }

    if !status.pending.is_empty() {
        println!("    {} Pending (batch {}):", style("○").yellow(), status.next_batch);
        for name in &status.pending {
            println!("      {} {}", style("→").dim(), style(name).yellow());
        }
    }

    println!(
        "    {} {} applied, {} pending",
        style("ℹ").blue(),
        status.applied.len(),
        status.pending.len()
    );
    println!();
}
