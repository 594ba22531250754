//! Sync command handler.
//!
//! Runs one reconciliation pass over the content directory.

use clap::Args;
use kbsync_content::{ContentManager, ProgressEvent, ProgressReporter, ReconcilePlan};
use kbsync_core::{config::AppConfig, AppResult};
use std::sync::Arc;

/// Bring the vector index in line with the content directory
#[derive(Args, Debug)]
pub struct SyncCommand {
    /// Show what would change without touching the index or record
    #[arg(long)]
    pub dry_run: bool,

    /// Suppress progress lines
    #[arg(short, long)]
    pub quiet: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SyncCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!(
            "Executing sync command for {:?}",
            config.content.content_dir
        );

        let index = kbsync_content::open_index(config).await?;
        let mut manager = ContentManager::new(&config.content, index)?;

        if self.dry_run {
            let plan = manager.preview()?;
            return self.print_plan(&plan);
        }

        if !self.quiet && !self.json {
            manager = manager.with_progress(ProgressReporter::new(Arc::new(|event: ProgressEvent| {
                eprintln!("{}", event.format_simple());
            })));
        }

        let report = manager.reconcile().await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!(
                "Synced {} documents in {:.2}s: {} added, {} deleted, {} unchanged, {} removed",
                report.scanned,
                report.duration_secs,
                report.added,
                report.deleted,
                report.unchanged,
                report.removed
            );
            println!(
                "Index ids: {} created, {} deleted",
                report.ids_created, report.ids_deleted
            );
        }

        Ok(())
    }

    fn print_plan(&self, plan: &ReconcilePlan) -> AppResult<()> {
        let deletions: Vec<&str> = plan.deletions().map(|d| d.path.as_str()).collect();
        let additions: Vec<&str> = plan.additions().map(|d| d.path.as_str()).collect();
        let removed: Vec<&str> = plan.removed.iter().map(|r| r.path.as_str()).collect();

        if self.json {
            let output = serde_json::json!({
                "dryRun": true,
                "scanned": plan.documents.len(),
                "delete": deletions,
                "add": additions,
                "removed": removed,
                "removedPolicy": plan.policy.as_str(),
                "idsToDelete": plan.delete_ids().len(),
                "unchanged": plan.unchanged(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(());
        }

        if plan.is_noop() && removed.is_empty() {
            println!("Index is up to date ({} documents)", plan.documents.len());
            return Ok(());
        }

        for path in &deletions {
            println!("delete  {}", path);
        }
        for path in &additions {
            println!("add     {}", path);
        }
        for path in &removed {
            println!("removed {} ({})", path, plan.policy.as_str());
        }
        println!(
            "{} ids to delete, {} documents to index, {} unchanged",
            plan.delete_ids().len(),
            additions.len(),
            plan.unchanged()
        );

        Ok(())
    }
}
