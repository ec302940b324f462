use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub const MANIFEST_FILE: &str = "manifest7dtm.json";

/// On-disk manifest, one per mods root. The field name matches the format
/// the original installer shipped, so existing manifests keep loading.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "Mods", default)]
    pub mods: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("no manifest at {}", .0.display())]
    NotFound(PathBuf),
    #[error("read manifest: {0}")]
    Io(#[from] io::Error),
    #[error("malformed manifest: {0}")]
    Malformed(#[from] serde_json::Error),
}

fn manifest_path(mods_dir: &Path) -> PathBuf {
    mods_dir.join(MANIFEST_FILE)
}

/// Overwrites the manifest with the given names, lexicographically sorted.
/// Always a full replace; the manifest tracks exactly the last install.
pub fn write(mods_dir: &Path, names: &BTreeSet<String>) -> Result<(), ManifestError> {
    let manifest = Manifest {
        mods: names.iter().cloned().collect(),
    };
    let raw = serde_json::to_string_pretty(&manifest)?;
    fs::write(manifest_path(mods_dir), raw)?;
    Ok(())
}

/// Reads the manifest back. A missing file is a distinct condition from
/// malformed JSON; callers treat the former as informational.
pub fn read(mods_dir: &Path) -> Result<Manifest, ManifestError> {
    let path = manifest_path(mods_dir);
    if !path.exists() {
        return Err(ManifestError::NotFound(path));
    }
    let raw = fs::read_to_string(&path)?;
    let manifest = serde_json::from_str(&raw)?;
    Ok(manifest)
}

/// Checks each manifest entry for a same-named directory directly under
/// the mods root. Existence only; contents are not inspected.
pub fn verify(mods_dir: &Path) -> Result<BTreeMap<String, bool>, ManifestError> {
    let manifest = read(mods_dir)?;
    let mut report = BTreeMap::new();
    for name in manifest.mods {
        let present = mods_dir.join(&name).is_dir();
        report.insert(name, present);
    }
    Ok(report)
}
