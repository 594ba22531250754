//! Search command handler.
//!
//! Queries the vector index directly, without an LLM.

use clap::Args;
use kbsync_content::VectorIndex;
use kbsync_core::{config::AppConfig, AppResult};

/// Find the chunks most similar to a query
#[derive(Args, Debug)]
pub struct SearchCommand {
    /// Query text
    pub query: String,

    /// Number of chunks to retrieve
    #[arg(short = 'k', long, default_value = "4")]
    pub top_k: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing search command (top_k={})", self.top_k);

        let index = kbsync_content::open_index(config).await?;
        let hits = index.search(&self.query, self.top_k).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&hits)?);
            return Ok(());
        }

        if hits.is_empty() {
            println!("No matching chunks");
            return Ok(());
        }

        for (rank, hit) in hits.iter().enumerate() {
            println!(
                "{}. [{:.3}] {}",
                rank + 1,
                hit.score,
                hit.source().unwrap_or("(unknown source)")
            );
            println!("   {}", preview(&hit.text, 160));
        }

        Ok(())
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
