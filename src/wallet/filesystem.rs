//! Directory backed wallet
//!
//! Reads both on-disk layouts produced by the Fabric SDKs:
//! - `<root>/<label>.id` holding a single JSON document (2.x)
//! - `<root>/<label>/<label>` metadata plus a `<signingIdentity>-priv` key file (1.4)

use super::{Identity, IdentityStore};
use crate::error::{WithdrawError, WithdrawResult};

use async_trait::async_trait;
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityFile {
    credentials: Credentials,
    msp_id: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Credentials {
    certificate: String,
    private_key: String,
}

#[derive(Debug, Deserialize)]
struct LegacyUserFile {
    mspid: String,
    enrollment: LegacyEnrollment,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyEnrollment {
    signing_identity: String,
    identity: LegacyCertificate,
}

#[derive(Debug, Deserialize)]
struct LegacyCertificate {
    certificate: String,
}

/// Wallet stored as files under a root directory
#[derive(Debug, Clone)]
pub struct FileSystemWallet {
    root: PathBuf,
}

impl FileSystemWallet {
    /// Open a wallet rooted at `root`. Nothing is created on disk.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn id_file(&self, label: &str) -> PathBuf {
        self.root.join(format!("{}.id", label))
    }

    fn legacy_dir(&self, label: &str) -> PathBuf {
        self.root.join(label)
    }

    fn check_label(label: &str) -> WithdrawResult<()> {
        if label.is_empty() || label.contains(['/', '\\']) || label == "." || label == ".." {
            return Err(WithdrawError::Wallet(format!(
                "Invalid identity label: {:?}",
                label
            )));
        }
        Ok(())
    }

    async fn is_file(path: &Path) -> WithdrawResult<bool> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(WithdrawError::Wallet(format!(
                "Failed to inspect {:?}: {}",
                path, e
            ))),
        }
    }

    async fn read(path: &Path) -> WithdrawResult<String> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| WithdrawError::Wallet(format!("Failed to read {:?}: {}", path, e)))
    }

    async fn load_id_file(&self, label: &str, path: &Path) -> WithdrawResult<Identity> {
        let content = Self::read(path).await?;
        let file: IdentityFile = serde_json::from_str(&content).map_err(|e| {
            WithdrawError::Wallet(format!("Malformed identity file {:?}: {}", path, e))
        })?;

        if let Some(kind) = file.kind.as_deref() {
            if kind != "X.509" {
                return Err(WithdrawError::Wallet(format!(
                    "Unsupported identity type {} for {}",
                    kind, label
                )));
            }
        }

        Ok(Identity {
            label: label.to_string(),
            msp_id: file.msp_id,
            certificate: file.credentials.certificate,
            private_key: file.credentials.private_key,
        })
    }

    async fn load_legacy(&self, label: &str, path: &Path) -> WithdrawResult<Identity> {
        let content = Self::read(path).await?;
        let file: LegacyUserFile = serde_json::from_str(&content).map_err(|e| {
            WithdrawError::Wallet(format!("Malformed identity file {:?}: {}", path, e))
        })?;

        let key_path = self
            .legacy_dir(label)
            .join(format!("{}-priv", file.enrollment.signing_identity));
        let private_key = Self::read(&key_path).await?;

        Ok(Identity {
            label: label.to_string(),
            msp_id: file.mspid,
            certificate: file.enrollment.identity.certificate,
            private_key,
        })
    }
}

#[async_trait]
impl IdentityStore for FileSystemWallet {
    async fn exists(&self, label: &str) -> WithdrawResult<bool> {
        Self::check_label(label)?;

        if Self::is_file(&self.id_file(label)).await? {
            return Ok(true);
        }
        Self::is_file(&self.legacy_dir(label).join(label)).await
    }

    async fn get(&self, label: &str) -> WithdrawResult<Option<Identity>> {
        Self::check_label(label)?;

        let id_file = self.id_file(label);
        if Self::is_file(&id_file).await? {
            debug!("Loading identity {} from {:?}", label, id_file);
            return self.load_id_file(label, &id_file).await.map(Some);
        }

        let legacy_file = self.legacy_dir(label).join(label);
        if Self::is_file(&legacy_file).await? {
            debug!("Loading legacy identity {} from {:?}", label, legacy_file);
            return self.load_legacy(label, &legacy_file).await.map(Some);
        }

        Ok(None)
    }

    fn location(&self) -> String {
        self.root.display().to_string()
    }
}
