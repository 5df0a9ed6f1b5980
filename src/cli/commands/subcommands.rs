use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

use crate::config::{Config, load_config};
use crate::store::{BookingStore, StoreError};
use crate::utils::atomic_write;

pub(super) async fn export(config_path: Option<&Path>, output: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let bytes = read_dataset(&config).await?;

    match output {
        Some(path) => {
            atomic_write(path, &bytes)?;
            println!("Exported {} bytes to {}", bytes.len(), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

pub(super) async fn read_dataset(config: &Config) -> Result<Vec<u8>> {
    let store = BookingStore::new(config.store.dataset_path());
    let exported = tokio::task::spawn_blocking(move || store.export_all())
        .await
        .context("export task failed")?;

    match exported {
        Ok(bytes) => Ok(bytes),
        Err(StoreError::NotFound(path)) => {
            anyhow::bail!("no bookings recorded yet ({} does not exist)", path.display())
        }
        Err(e) => Err(e.into()),
    }
}

pub(super) fn check_config(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    println!("{}", describe(&config));
    Ok(())
}

pub(super) fn describe(config: &Config) -> String {
    format!(
        "Configuration OK\n  listen:   {}:{}\n  webhook:  {:?}\n  dataset:  {}\n  services: {}\n  slot key: {}",
        config.gateway.host,
        config.gateway.port,
        config.webhook,
        config.store.dataset_path().display(),
        config.flow.service_keys.join(", "),
        config.flow.time_slot_key,
    )
}
