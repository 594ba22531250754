//! Status command handler.

use clap::Args;
use kbsync_core::{config::AppConfig, AppResult};

/// Show index and record statistics
#[derive(Args, Debug)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatusCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing status command");

        let index = kbsync_content::open_index(config).await?;
        let stats = kbsync_content::stats(config, &index)?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        } else {
            println!("Collection: {}", stats.collection);
            println!("Content:    {}", config.content.content_dir.display());
            println!("Index:      {}", config.content.index_path.display());
            println!(
                "Documents:  {} ({} valid)",
                stats.documents_count, stats.valid_count
            );
            println!("Chunks:     {}", stats.chunks_count);
            println!("Size:       {:.2} MB", stats.db_size_bytes as f64 / 1_048_576.0);
        }

        Ok(())
    }
}
