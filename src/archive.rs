use crate::copier::copy_stream;
use crate::game::MOD_MARKER;
use crate::progress::{ByteWeight, Phase, Reporter};
use anyhow::{Context, Result};
use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};
use walkdir::WalkDir;

/// Unpacks every entry of the zip into `dest`, overwriting existing files.
/// Progress is weighted by cumulative uncompressed bytes over the archive's
/// total uncompressed content length. Entries whose names escape the
/// destination are skipped.
pub fn extract_zip(archive_path: &Path, dest: &Path, reporter: &mut Reporter) -> Result<()> {
    let file = fs::File::open(archive_path)
        .with_context(|| format!("open zip {}", archive_path.display()))?;
    let mut archive = zip::ZipArchive::new(file).context("read zip")?;

    let mut total = 0u64;
    for i in 0..archive.len() {
        let entry = archive.by_index(i).context("zip entry")?;
        total = total.saturating_add(entry.size());
    }
    let mut weight = ByteWeight::new(total);

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).context("zip entry")?;
        let Some(rel_path) = entry.enclosed_name() else {
            continue;
        };
        let out_path = dest.join(rel_path);
        if entry.is_dir() {
            fs::create_dir_all(&out_path).context("create zip dir")?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).context("create zip dir")?;
        }
        let mut out_file = fs::File::create(&out_path)
            .with_context(|| format!("create {}", out_path.display()))?;
        copy_stream(&mut entry, &mut out_file, &mut weight, Phase::Extract, reporter)
            .context("extract zip entry")?;
    }

    Ok(())
}

/// Every directory under `root` that holds a `ModInfo.xml`, deduplicated
/// and sorted. The marker-bearing directory itself is the installable
/// unit, regardless of depth. An empty result means the archive is not a
/// valid mod or modpack.
pub fn find_mod_roots(root: &Path) -> Result<Vec<PathBuf>> {
    let mut roots = BTreeSet::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.context("scan extracted tree")?;
        if !entry.file_type().is_file() {
            continue;
        }
        if !entry
            .file_name()
            .to_string_lossy()
            .eq_ignore_ascii_case(MOD_MARKER)
        {
            continue;
        }
        if let Some(parent) = entry.path().parent() {
            roots.insert(parent.to_path_buf());
        }
    }
    Ok(roots.into_iter().collect())
}

static SCRATCH_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Unique scratch directory under the system temp dir.
pub fn make_scratch_dir() -> Result<PathBuf> {
    let scratch_root = std::env::temp_dir().join("sevensmith");
    fs::create_dir_all(&scratch_root).context("create scratch root")?;

    let counter = SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let scratch_dir = scratch_root.join(format!("install-{nanos}-{counter}"));
    fs::create_dir_all(&scratch_dir).context("create scratch dir")?;
    Ok(scratch_dir)
}

/// Removes the scratch tree when dropped, so extraction leftovers never
/// outlive the operation, success or failure.
pub struct ScratchGuard {
    path: PathBuf,
}

impl ScratchGuard {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}
