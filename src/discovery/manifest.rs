use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use super::paths::{self, Browser, Scope};
use crate::error::{HostError, Result};

/// A native messaging host manifest, as installed by the desktop application.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub path: PathBuf,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_origins: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_extensions: Option<Vec<String>>,
}

impl Manifest {
    /// Absolute path of the host executable.
    ///
    /// Windows resolves a relative `path` against the manifest's directory; everywhere
    /// else it must already be absolute.
    pub fn executable(&self, manifest_path: &Path) -> Result<PathBuf> {
        if self.path.is_absolute() {
            return Ok(self.path.clone());
        }
        if cfg!(windows) {
            let dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));
            return Ok(dir.join(&self.path));
        }
        Err(HostError::Manifest {
            path: manifest_path.to_path_buf(),
            reason: format!("host path {} must be absolute", self.path.display()),
        })
    }
}

/// Check a host name the way browsers do: lowercase alphanumerics and `_`, in
/// dot-separated segments, no empty segment.
pub fn validate_host_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
        });
    if valid {
        Ok(())
    } else {
        Err(HostError::InvalidHostName(name.to_string()))
    }
}

/// Read and check a manifest file.
pub fn read_manifest(path: &Path) -> Result<Manifest> {
    let raw = fs::read_to_string(path).map_err(|e| HostError::Manifest {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let manifest: Manifest = serde_json::from_str(&raw).map_err(|e| HostError::Manifest {
        path: path.to_path_buf(),
        reason: format!("invalid JSON: {e}"),
    })?;
    if manifest.kind != "stdio" {
        return Err(HostError::Manifest {
            path: path.to_path_buf(),
            reason: format!("unsupported type `{}`", manifest.kind),
        });
    }
    Ok(manifest)
}

/// Find the manifest for host `name` as `browser` would in `scope`.
///
/// On Windows with the `windows-registry` feature the registry pointer wins over the
/// conventional location.
pub fn locate_manifest(name: &str, browser: Browser, scope: Scope) -> Result<(PathBuf, Manifest)> {
    validate_host_name(name)?;

    #[cfg(all(windows, feature = "windows-registry"))]
    let registered = super::winreg::read_manifest_path_from_reg(scope, &browser.winreg_key_path(name))?;
    #[cfg(not(all(windows, feature = "windows-registry")))]
    let registered: Option<PathBuf> = None;

    let path = match registered {
        Some(path) => path,
        None => paths::manifest_path(browser, scope, name)?,
    };
    let manifest = read_manifest(&path)?;
    if manifest.name != name {
        return Err(HostError::Manifest {
            path,
            reason: format!("declares host `{}`, expected `{name}`", manifest.name),
        });
    }
    tracing::debug!(host = name, browser = browser.key(), manifest = %path.display(), "located host manifest");
    Ok((path, manifest))
}
