//! Persisted deployment manifest
//!
//! A flat JSON object mapping logical contract names to confirmed addresses,
//! written tab-indented after every change. Entries are append-only; the
//! only overwrites are an implementation pointer replaced by an upgrade and
//! a step's pending transaction hash superseded after a failed receipt. The
//! previous value is archived under `<name>@<n>`.

use crate::chain::parse_address;
use crate::error::{BridgeError, BridgeResult};

use ethers::types::Address;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Logical name to address mapping shared by every workflow in a run
pub struct DeploymentRecord {
    /// Backing file, `None` for an in-memory record
    path: Option<PathBuf>,
    entries: RwLock<BTreeMap<String, String>>,
}

impl DeploymentRecord {
    /// Read the manifest at `path`, starting empty if it does not exist yet
    pub async fn load(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                BridgeError::Manifest(format!("{:?} is not a flat JSON object: {}", path, e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No manifest at {:?}, starting a fresh deployment", path);
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        debug!("Loaded {} manifest entries from {:?}", entries.len(), path);
        Ok(Self {
            path: Some(path),
            entries: RwLock::new(entries),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub async fn get(&self, name: &str) -> Option<String> {
        self.entries.read().await.get(name).cloned()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.entries.read().await.contains_key(name)
    }

    /// Recorded address of `name`
    pub async fn address(&self, name: &str) -> BridgeResult<Address> {
        let value = self.get(name).await.ok_or_else(|| BridgeError::NotDeployed {
            name: name.to_string(),
        })?;
        parse_address(&value)
    }

    /// Append `name`, persisting before returning.
    ///
    /// Re-recording the same value is a no-op; a different value for an
    /// existing name is refused.
    pub async fn record(&self, name: &str, value: String) -> BridgeResult<()> {
        let mut entries = self.entries.write().await;

        if let Some(existing) = entries.get(name) {
            if *existing == value {
                return Ok(());
            }
            return Err(BridgeError::Manifest(format!(
                "{} is already recorded as {}, refusing to overwrite with {}",
                name, existing, value
            )));
        }

        info!("Recorded {} = {}", name, value);
        entries.insert(name.to_string(), value);
        self.persist(&entries).await
    }

    /// Overwrite `name`, archiving the previous value under `<name>@<n>`.
    ///
    /// Returns the archived value.
    pub async fn replace(&self, name: &str, value: String) -> BridgeResult<Option<String>> {
        let mut entries = self.entries.write().await;

        let previous = entries.insert(name.to_string(), value.clone());
        if let Some(old) = &previous {
            let generation = (1..)
                .find(|n| !entries.contains_key(&archive_key(name, *n)))
                .unwrap_or(1);
            entries.insert(archive_key(name, generation), old.clone());
            info!("Replaced {} = {} (was {}, archived as @{})", name, value, old, generation);
        } else {
            info!("Recorded {} = {}", name, value);
        }

        self.persist(&entries).await?;
        Ok(previous)
    }

    #[cfg(test)]
    pub async fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries.read().await.clone()
    }

    /// Write the whole map, called with the write lock held
    async fn persist(&self, entries: &BTreeMap<String, String>) -> BridgeResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        entries.serialize(&mut serializer)?;

        // Write-then-rename, readers never see a truncated manifest
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, &buffer).await?;
        tokio::fs::rename(&staging, path).await?;
        Ok(())
    }
}

fn archive_key(name: &str, generation: u32) -> String {
    format!("{}@{}", name, generation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_record_persists_tab_indented() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contractAddress.json");

        let record = DeploymentRecord::load(&path).await.unwrap();
        record
            .record("EvmSide", "0x5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a".into())
            .await
            .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n\t\"EvmSide\": \"0x5a5a"));

        let reloaded = DeploymentRecord::load(&path).await.unwrap();
        assert_eq!(
            reloaded.address("EvmSide").await.unwrap(),
            Address::repeat_byte(0x5a)
        );
    }

    #[tokio::test]
    async fn test_record_is_append_only() {
        let record = DeploymentRecord::in_memory();
        record.record("ConfluxSide", "a".into()).await.unwrap();
        record.record("ConfluxSide", "a".into()).await.unwrap();
        assert!(record.record("ConfluxSide", "b".into()).await.is_err());
        assert_eq!(record.get("ConfluxSide").await.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_replace_archives_previous_generations() {
        let record = DeploymentRecord::in_memory();
        record.record("EvmSideImpl", "v1".into()).await.unwrap();

        assert_eq!(
            record.replace("EvmSideImpl", "v2".into()).await.unwrap().as_deref(),
            Some("v1")
        );
        record.replace("EvmSideImpl", "v3".into()).await.unwrap();

        let entries = record.snapshot().await;
        assert_eq!(entries["EvmSideImpl"], "v3");
        assert_eq!(entries["EvmSideImpl@1"], "v1");
        assert_eq!(entries["EvmSideImpl@2"], "v2");
    }

    #[tokio::test]
    async fn test_concurrent_appends_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contractAddress.json");
        let record = Arc::new(DeploymentRecord::load(&path).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..16 {
            let record = record.clone();
            handles.push(tokio::spawn(async move {
                record.record(&format!("Contract{}", i), format!("0x{:040x}", i)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let reloaded = DeploymentRecord::load(&path).await.unwrap();
        assert_eq!(reloaded.snapshot().await.len(), 16);
    }

    #[tokio::test]
    async fn test_corrupt_manifest_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contractAddress.json");
        std::fs::write(&path, "[1, 2").unwrap();
        assert!(matches!(
            DeploymentRecord::load(&path).await,
            Err(BridgeError::Manifest(_))
        ));
    }
}
