use crate::progress::{ByteWeight, Phase, Reporter};
use anyhow::{Context, Result};
use filetime::{set_file_mtime, FileTime};
use std::{
    fs,
    io::{Read, Write},
    path::Path,
    time::UNIX_EPOCH,
};
use walkdir::WalkDir;

const COPY_CHUNK: usize = 64 * 1024;

/// Total byte size of every file under `root`.
pub fn dir_size(root: &Path) -> Result<u64> {
    let mut total = 0u64;
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.context("walk dir")?;
        if !entry.file_type().is_file() {
            continue;
        }
        let meta = entry.metadata().context("file metadata")?;
        total = total.saturating_add(meta.len());
    }
    Ok(total)
}

/// Chunked copy from reader to writer. Every chunk advances the shared
/// weight and emits the resulting percent under `phase`.
pub fn copy_stream<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    weight: &mut ByteWeight,
    phase: Phase,
    reporter: &mut Reporter,
) -> Result<u64> {
    let mut buf = [0u8; COPY_CHUNK];
    let mut written = 0u64;
    loop {
        let n = reader.read(&mut buf).context("read chunk")?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).context("write chunk")?;
        written += n as u64;
        let percent = weight.add(n as u64);
        reporter.emit(phase, percent, None);
    }
    Ok(written)
}

/// Recursively copies `source` into `dest`, preserving relative paths and
/// overwriting files already present at the destination. Failures abort
/// the enclosing operation; whatever was copied so far stays in place.
pub fn copy_tree(
    source: &Path,
    dest: &Path,
    weight: &mut ByteWeight,
    phase: Phase,
    reporter: &mut Reporter,
) -> Result<()> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.context("walk source")?;
        let rel = entry.path().strip_prefix(source).context("rel path")?;
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).context("create dir")?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).context("create file dir")?;
            }
            let mut reader = fs::File::open(entry.path())
                .with_context(|| format!("open {}", entry.path().display()))?;
            let mut writer = fs::File::create(&target)
                .with_context(|| format!("create {}", target.display()))?;
            copy_stream(&mut reader, &mut writer, weight, phase, reporter)?;
            preserve_mtime(entry.path(), &target);
        }
    }
    Ok(())
}

fn preserve_mtime(source: &Path, dest: &Path) {
    let Ok(meta) = fs::metadata(source) else {
        return;
    };
    let Ok(modified) = meta.modified() else {
        return;
    };
    let Ok(duration) = modified.duration_since(UNIX_EPOCH) else {
        return;
    };
    let mtime = FileTime::from_unix_time(duration.as_secs() as i64, 0);
    let _ = set_file_mtime(dest, mtime);
}
