use std::path::PathBuf;
use std::sync::Arc;

use bearer_relay_core::config::load_config;
use bearer_relay_core::page::{RestrictedResource, RetryPolicy};

use super::start::bring_up;

pub async fn run(config_path: Option<PathBuf>, url: String, output: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    let page = bring_up(&config).await?;
    let policy = RetryPolicy::new(Arc::clone(page.container()), config.retry.marker.clone());
    let resource = RestrictedResource::new(page, url);

    let loaded = resource.load_with_retry(&policy).await?;

    match output {
        Some(path) => {
            std::fs::write(&path, &loaded.bytes)?;
            println!("Saved {} bytes to {:?}", loaded.bytes.len(), path);
        }
        None => {
            println!("Source:       {}", loaded.src);
            println!("Content-Type: {}", loaded.content_type.as_deref().unwrap_or("-"));
            println!("Size:         {} bytes", loaded.bytes.len());
        }
    }

    Ok(())
}
