//! Compiled contract artifacts
//!
//! Artifacts are the JSON files a Hardhat build leaves under
//! `<artifacts_dir>/**/<Name>.sol/<Name>.json`. Only the creation bytecode
//! is read.

use crate::error::{BridgeError, BridgeResult};

use dashmap::DashMap;
use ethers::abi::{self, Token};
use ethers::types::Bytes;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ArtifactFile {
    bytecode: String,
}

/// Lazily loaded, cached artifact lookup
pub struct ArtifactStore {
    root: PathBuf,
    bytecode: DashMap<String, Arc<Bytes>>,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            bytecode: DashMap::new(),
        }
    }

    /// Creation bytecode of `name`
    pub async fn bytecode(&self, name: &str) -> BridgeResult<Arc<Bytes>> {
        let cached = self.bytecode.get(name).map(|code| code.clone());
        if let Some(code) = cached {
            return Ok(code);
        }

        let path = find_artifact(&self.root, name)
            .await?
            .ok_or_else(|| BridgeError::Artifact {
                name: name.to_string(),
                message: format!("no {}.sol/{}.json under {:?}", name, name, self.root),
            })?;
        debug!("Loading artifact {} from {:?}", name, path);

        let text = tokio::fs::read_to_string(&path).await?;
        let file: ArtifactFile = serde_json::from_str(&text)?;
        let code = parse_bytecode(name, &file.bytecode)?;

        let code = Arc::new(code);
        self.bytecode.insert(name.to_string(), code.clone());
        Ok(code)
    }

    /// Bytecode of `name` with ABI-encoded constructor arguments appended
    pub async fn creation_code(&self, name: &str, args: &[Token]) -> BridgeResult<Bytes> {
        let code = self.bytecode(name).await?;
        let mut data = code.to_vec();
        data.extend(abi::encode(args));
        Ok(Bytes::from(data))
    }

    #[cfg(test)]
    pub fn insert(&self, name: &str, code: Bytes) {
        self.bytecode.insert(name.to_string(), Arc::new(code));
    }
}

fn parse_bytecode(name: &str, text: &str) -> BridgeResult<Bytes> {
    let raw = hex::decode(text.trim_start_matches("0x")).map_err(|e| BridgeError::Artifact {
        name: name.to_string(),
        message: format!("bytecode is not hex: {}", e),
    })?;
    if raw.is_empty() {
        // interfaces and abstract contracts compile to empty bytecode
        return Err(BridgeError::Artifact {
            name: name.to_string(),
            message: "artifact has no deployable bytecode".to_string(),
        });
    }
    Ok(Bytes::from(raw))
}

/// Depth-first search for `<name>.sol/<name>.json`, subdirectories in
/// sorted order
async fn find_artifact(root: &Path, name: &str) -> BridgeResult<Option<PathBuf>> {
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let direct = dir.join(format!("{}.sol", name)).join(format!("{}.json", name));
        if is_file(&direct).await {
            return Ok(Some(direct));
        }

        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => {}
            _ => continue,
        }

        let mut subdirs = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                subdirs.push(entry.path());
            }
        }
        subdirs.sort();
        pending.extend(subdirs.into_iter().rev());
    }
    Ok(None)
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}
