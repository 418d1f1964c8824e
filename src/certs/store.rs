//! On-disk certificate store.
//!
//! A cold-start hint only: the in-memory cache is authoritative, and a missing or
//! unreadable file just means the authority is asked again.

use std::io;
use std::path::{Path, PathBuf};

use crate::certs::authority::IssuedCertificate;

/// Directory of `<hostname>.json` files.
#[derive(Debug, Clone)]
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Hostnames reaching the store are canonical switchboard keys, so they are safe
    /// file names.
    fn path_for(&self, hostname: &str) -> PathBuf {
        self.dir.join(format!("{hostname}.json"))
    }

    /// Load the stored certificate for `hostname`, if any.
    pub async fn load(&self, hostname: &str) -> io::Result<Option<IssuedCertificate>> {
        let bytes = match tokio::fs::read(self.path_for(hostname)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let issued = serde_json::from_slice(&bytes)?;
        Ok(Some(issued))
    }

    /// Persist `issued`, replacing any previous file atomically.
    pub async fn save(&self, hostname: &str, issued: &IssuedCertificate) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(hostname);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(issued)?;

        tokio::fs::write(&tmp, bytes).await?;
        restrict_permissions(&tmp).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::debug!(hostname, path = ?path, "Certificate saved to store");
        Ok(())
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}
