//! `nlsql index` commands: inspect and maintain the schema segment index.
//!
//! All commands require an embedding provider except `status` and `purge`.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::retrieval::{ReindexOutcome, RetrievalService};

async fn service(config: &Config) -> Result<RetrievalService> {
    let pool = db::connect(config).await?;
    RetrievalService::from_config(config, pool)
}

fn require_embeddings(config: &Config) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }
    Ok(())
}

pub async fn run_index_status(config: &Config) -> Result<()> {
    let status = service(config).await?.status().await?;

    println!("Schema index status:");
    println!("  segments:    {}", status.segments);
    println!("  fingerprint: {}", status.current_fingerprint);
    println!(
        "  indexed:     {}",
        status.stored_fingerprint.as_deref().unwrap_or("never")
    );
    println!("  stale:       {}", if status.stale { "yes" } else { "no" });
    Ok(())
}

pub async fn run_index_sync(config: &Config) -> Result<()> {
    require_embeddings(config)?;
    match service(config).await?.reindex_if_stale().await? {
        ReindexOutcome::UpToDate => println!("Schema index is up to date."),
        ReindexOutcome::Reindexed { segments } => {
            println!("Schema changed: indexed {} segments.", segments)
        }
    }
    Ok(())
}

pub async fn run_index_rebuild(config: &Config) -> Result<()> {
    require_embeddings(config)?;
    let segments = service(config).await?.reindex().await?;
    println!("Rebuilt schema index: {} segments.", segments);
    Ok(())
}

pub async fn run_index_purge(config: &Config) -> Result<()> {
    let removed = service(config).await?.purge().await?;
    println!("Purged {} segments.", removed);
    Ok(())
}
