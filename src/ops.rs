use crate::archive::{extract_zip, find_mod_roots, make_scratch_dir, ScratchGuard};
use crate::copier::{copy_tree, dir_size};
use crate::game::{self, GamePaths, MODS_DIR_NAME};
use crate::manifest::{self, ManifestError};
use crate::progress::{ByteWeight, Phase, Reporter};
use anyhow::{Context, Result};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use time::{macros::format_description, OffsetDateTime};

/// Validation failures: reported to the user, nothing under the mods root
/// has been mutated when these surface.
#[derive(Debug, Error)]
pub enum OpError {
    #[error("no ModInfo.xml found in archive; not a valid mod or modpack")]
    NoModsInArchive,
    #[error("{} has no Mods subfolder; not a backup", .0.display())]
    InvalidBackup(PathBuf),
}

#[derive(Debug)]
pub struct BackupReport {
    /// None when there was nothing to back up; a reported no-op.
    pub snapshot: Option<PathBuf>,
    pub mods: Vec<String>,
}

#[derive(Debug)]
pub struct InstallReport {
    pub installed: Vec<String>,
}

#[derive(Debug)]
pub struct RestoreReport {
    pub restored: Vec<String>,
}

#[derive(Debug)]
pub enum VerifyReport {
    /// Nothing installed through this tool yet; informational, not an error.
    NoManifest,
    Checked(BTreeMap<String, bool>),
}

impl VerifyReport {
    pub fn missing(&self) -> Vec<&str> {
        match self {
            VerifyReport::NoManifest => Vec::new(),
            VerifyReport::Checked(entries) => entries
                .iter()
                .filter(|(_, present)| !**present)
                .map(|(name, _)| name.as_str())
                .collect(),
        }
    }
}

fn dir_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_string())
        .with_context(|| format!("dir name of {}", path.display()))
}

fn snapshot_stamp() -> Result<String> {
    let format = format_description!("[year][month][day]_[hour][minute][second]");
    OffsetDateTime::now_utc()
        .format(&format)
        .context("format snapshot stamp")
}

/// Moves every mod dir (protected dir excluded) into a fresh timestamped
/// snapshot under the game root. Move semantics are copy then delete, so
/// a crash mid-operation can leave a mod in both places; that is accepted.
pub fn backup(paths: &GamePaths, reporter: &mut Reporter) -> Result<BackupReport> {
    let sources = game::list_mod_dirs(&paths.mods_dir)?;
    if sources.is_empty() {
        log::info!("no mods to back up");
        return Ok(BackupReport {
            snapshot: None,
            mods: Vec::new(),
        });
    }

    let stamp = snapshot_stamp()?;
    let snapshot_root = paths.game_root.join(format!("ModsBackup_{stamp}"));
    let snapshot_mods = snapshot_root.join(MODS_DIR_NAME);
    fs::create_dir_all(&snapshot_mods).context("create snapshot dir")?;

    let mut total = 0u64;
    for source in &sources {
        total = total.saturating_add(dir_size(source)?);
    }
    let mut weight = ByteWeight::new(total);

    let mut mods = Vec::new();
    for source in &sources {
        let name = dir_name(source)?;
        copy_tree(
            source,
            &snapshot_mods.join(&name),
            &mut weight,
            Phase::Backup,
            reporter,
        )
        .with_context(|| format!("back up {name}"))?;
        fs::remove_dir_all(source).with_context(|| format!("remove backed up {name}"))?;
        reporter.emit(
            Phase::Backup,
            weight.percent(),
            Some(format!("Backed up {name}")),
        );
        log::info!("backed up {name}");
        mods.push(name);
    }

    log::info!("backup complete: {}", snapshot_root.display());
    Ok(BackupReport {
        snapshot: Some(snapshot_root),
        mods,
    })
}

/// Extracts the archive into a scratch dir, installs every discovered mod
/// root into the mods dir (replacing same-named dirs wholesale), then
/// overwrites the manifest with exactly this archive's mod set. Mods from
/// earlier installs that are not in this archive drop out of the manifest
/// even though their directories stay on disk; each install replaces the
/// tracked set.
pub fn install(paths: &GamePaths, archive: &Path, reporter: &mut Reporter) -> Result<InstallReport> {
    let scratch = make_scratch_dir()?;
    let _guard = ScratchGuard::new(scratch.clone());

    extract_zip(archive, &scratch, reporter)?;
    let roots = find_mod_roots(&scratch)?;
    if roots.is_empty() {
        return Err(OpError::NoModsInArchive.into());
    }

    let mut total = 0u64;
    for root in &roots {
        total = total.saturating_add(dir_size(root)?);
    }
    let mut weight = ByteWeight::new(total);

    let mut names = BTreeSet::new();
    for root in &roots {
        let name = dir_name(root)?;
        let dest = paths.mods_dir.join(&name);
        if dest.exists() {
            fs::remove_dir_all(&dest).with_context(|| format!("remove old {name}"))?;
        }
        copy_tree(root, &dest, &mut weight, Phase::Install, reporter)
            .with_context(|| format!("install {name}"))?;
        reporter.emit(
            Phase::Install,
            weight.percent(),
            Some(format!("Installed {name}")),
        );
        log::info!("installed {name}");
        names.insert(name);
    }

    manifest::write(&paths.mods_dir, &names).context("write manifest")?;
    log::info!("install complete: {} mod(s)", names.len());
    Ok(InstallReport {
        installed: names.into_iter().collect(),
    })
}

/// Wipes the mods dir (protected dir excluded) and copies every mod out of
/// the snapshot's Mods subfolder. The manifest is left as-is.
pub fn restore(
    paths: &GamePaths,
    snapshot: &Path,
    reporter: &mut Reporter,
) -> Result<RestoreReport> {
    let snapshot_mods = snapshot.join(MODS_DIR_NAME);
    if !snapshot_mods.is_dir() {
        return Err(OpError::InvalidBackup(snapshot.to_path_buf()).into());
    }

    for dir in game::list_mod_dirs(&paths.mods_dir)? {
        fs::remove_dir_all(&dir).with_context(|| format!("clear {}", dir.display()))?;
    }

    let sources = game::list_mod_dirs(&snapshot_mods)?;
    let mut total = 0u64;
    for source in &sources {
        total = total.saturating_add(dir_size(source)?);
    }
    let mut weight = ByteWeight::new(total);

    let mut restored = Vec::new();
    for source in &sources {
        let name = dir_name(source)?;
        copy_tree(
            source,
            &paths.mods_dir.join(&name),
            &mut weight,
            Phase::Restore,
            reporter,
        )
        .with_context(|| format!("restore {name}"))?;
        reporter.emit(
            Phase::Restore,
            weight.percent(),
            Some(format!("Restored {name}")),
        );
        log::info!("restored {name}");
        restored.push(name);
    }

    log::info!("restore complete");
    Ok(RestoreReport { restored })
}

/// Per-mod presence check against the manifest. Mutates nothing.
pub fn verify(paths: &GamePaths) -> Result<VerifyReport> {
    match manifest::verify(&paths.mods_dir) {
        Ok(entries) => Ok(VerifyReport::Checked(entries)),
        Err(ManifestError::NotFound(_)) => Ok(VerifyReport::NoManifest),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use walkdir::WalkDir;
    use zip::write::SimpleFileOptions;

    fn game_fixture() -> (TempDir, GamePaths) {
        let temp_dir = TempDir::new().expect("create temp dir");
        let paths = GamePaths::from_root(temp_dir.path()).expect("resolve paths");
        (temp_dir, paths)
    }

    fn seed_mod(mods_dir: &Path, name: &str, files: &[(&str, &[u8])]) {
        let root = mods_dir.join(name);
        for (rel, contents) in files {
            let path = root.join(rel);
            fs::create_dir_all(path.parent().expect("file parent")).expect("create parent");
            fs::write(path, contents).expect("write mod file");
        }
    }

    fn write_mod_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = fs::File::create(path).expect("create zip file");
        let mut writer = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        for (name, contents) in entries {
            writer.start_file(*name, options).expect("start zip entry");
            writer.write_all(contents).expect("write zip entry");
        }
        writer.finish().expect("finish zip");
    }

    fn tree_snapshot(root: &Path) -> Vec<(String, Vec<u8>)> {
        let mut files = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.expect("walk tree");
            if entry.file_type().is_file() {
                let rel = entry
                    .path()
                    .strip_prefix(root)
                    .expect("rel path")
                    .to_string_lossy()
                    .to_string();
                files.push((rel, fs::read(entry.path()).expect("read file")));
            }
        }
        files
    }

    #[test]
    fn backup_with_no_mods_is_a_no_op() {
        let (_temp, paths) = game_fixture();
        seed_mod(&paths.mods_dir, "0_TFP_Harmony", &[("loader.dll", b"dll")]);

        let report = backup(&paths, &mut Reporter::silent()).expect("backup");
        assert!(report.snapshot.is_none());
        assert!(report.mods.is_empty());
        // Protected dir untouched.
        assert!(paths.mods_dir.join("0_TFP_Harmony/loader.dll").exists());
    }

    #[test]
    fn backup_then_restore_round_trips_byte_for_byte() {
        let (_temp, paths) = game_fixture();
        seed_mod(
            &paths.mods_dir,
            "Alpha",
            &[("ModInfo.xml", b"<a/>".as_slice()), ("Config/a.xml", b"aa")],
        );
        seed_mod(&paths.mods_dir, "Bravo", &[("ModInfo.xml", b"<b/>")]);
        seed_mod(&paths.mods_dir, "0_TFP_Harmony", &[("harmony.dll", b"dll")]);
        let before = tree_snapshot(&paths.mods_dir);

        let report = backup(&paths, &mut Reporter::silent()).expect("backup");
        let snapshot = report.snapshot.expect("snapshot dir");
        assert_eq!(report.mods, vec!["Alpha", "Bravo"]);
        // Sources moved out, protected dir left alone.
        assert!(!paths.mods_dir.join("Alpha").exists());
        assert!(!paths.mods_dir.join("Bravo").exists());
        assert!(paths.mods_dir.join("0_TFP_Harmony").is_dir());
        assert!(snapshot
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("ModsBackup_"));

        let restored = restore(&paths, &snapshot, &mut Reporter::silent()).expect("restore");
        assert_eq!(restored.restored, vec!["Alpha", "Bravo"]);
        assert_eq!(tree_snapshot(&paths.mods_dir), before);
    }

    #[test]
    fn restore_rejects_dir_without_mods_subfolder() {
        let (_temp, paths) = game_fixture();
        seed_mod(&paths.mods_dir, "Keep", &[("ModInfo.xml", b"<k/>")]);
        let bogus = TempDir::new().expect("create bogus dir");

        let err = restore(&paths, bogus.path(), &mut Reporter::silent()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OpError>(),
            Some(OpError::InvalidBackup(_))
        ));
        // No mutation on validation failure.
        assert!(paths.mods_dir.join("Keep/ModInfo.xml").exists());
    }

    #[test]
    fn restore_sweeps_mods_not_in_snapshot() {
        let (_temp, paths) = game_fixture();
        seed_mod(&paths.mods_dir, "Old", &[("ModInfo.xml", b"<o/>")]);
        let snapshot = TempDir::new().expect("create snapshot dir");
        let snapshot_mods = snapshot.path().join(MODS_DIR_NAME);
        fs::create_dir_all(snapshot_mods.join("New")).expect("create snapshot mod");
        fs::write(snapshot_mods.join("New/ModInfo.xml"), b"<n/>").expect("write marker");

        restore(&paths, snapshot.path(), &mut Reporter::silent()).expect("restore");
        assert!(!paths.mods_dir.join("Old").exists());
        assert!(paths.mods_dir.join("New/ModInfo.xml").exists());
    }

    #[test]
    fn install_places_each_discovered_mod_and_writes_manifest() {
        let (_temp, paths) = game_fixture();
        let zip_path = paths.game_root.join("pack.zip");
        write_mod_zip(
            &zip_path,
            &[
                ("Zeta/ModInfo.xml", b"<z/>".as_slice()),
                ("Zeta/Config/z.xml", b"zz"),
                ("bundle/Alpha/ModInfo.xml", b"<a/>"),
            ],
        );

        let report = install(&paths, &zip_path, &mut Reporter::silent()).expect("install");
        assert_eq!(report.installed, vec!["Alpha", "Zeta"]);
        assert!(paths.mods_dir.join("Zeta/Config/z.xml").exists());
        assert!(paths.mods_dir.join("Alpha/ModInfo.xml").exists());

        let manifest = manifest::read(&paths.mods_dir).expect("read manifest");
        assert_eq!(manifest.mods, vec!["Alpha", "Zeta"]);
    }

    #[test]
    fn install_replaces_colliding_mod_dir_entirely() {
        let (_temp, paths) = game_fixture();
        seed_mod(
            &paths.mods_dir,
            "Alpha",
            &[("ModInfo.xml", b"<old/>".as_slice()), ("stale.txt", b"old")],
        );
        let zip_path = paths.game_root.join("pack.zip");
        write_mod_zip(&zip_path, &[("Alpha/ModInfo.xml", b"<new/>")]);

        install(&paths, &zip_path, &mut Reporter::silent()).expect("install");
        assert_eq!(
            fs::read(paths.mods_dir.join("Alpha/ModInfo.xml")).expect("read marker"),
            b"<new/>"
        );
        // Old files not present in the new version are gone.
        assert!(!paths.mods_dir.join("Alpha/stale.txt").exists());
    }

    #[test]
    fn install_manifest_is_a_full_replace_not_a_merge() {
        let (_temp, paths) = game_fixture();
        let first = paths.game_root.join("first.zip");
        write_mod_zip(&first, &[("Alpha/ModInfo.xml", b"<a/>")]);
        install(&paths, &first, &mut Reporter::silent()).expect("first install");

        let second = paths.game_root.join("second.zip");
        write_mod_zip(&second, &[("Bravo/ModInfo.xml", b"<b/>")]);
        install(&paths, &second, &mut Reporter::silent()).expect("second install");

        // Alpha's directory survives but the manifest only tracks Bravo.
        assert!(paths.mods_dir.join("Alpha").is_dir());
        let manifest = manifest::read(&paths.mods_dir).expect("read manifest");
        assert_eq!(manifest.mods, vec!["Bravo"]);
    }

    #[test]
    fn install_without_markers_leaves_everything_untouched() {
        let (_temp, paths) = game_fixture();
        seed_mod(&paths.mods_dir, "Existing", &[("ModInfo.xml", b"<e/>")]);
        let zip_path = paths.game_root.join("junk.zip");
        write_mod_zip(&zip_path, &[("readme.txt", b"not a mod")]);

        let err = install(&paths, &zip_path, &mut Reporter::silent()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OpError>(),
            Some(OpError::NoModsInArchive)
        ));
        assert!(paths.mods_dir.join("Existing/ModInfo.xml").exists());
        assert!(matches!(
            manifest::read(&paths.mods_dir),
            Err(ManifestError::NotFound(_))
        ));
    }

    #[test]
    fn verify_reports_present_and_missing() {
        let (_temp, paths) = game_fixture();
        let names: BTreeSet<String> = ["Alpha", "Bravo"].into_iter().map(String::from).collect();
        manifest::write(&paths.mods_dir, &names).expect("write manifest");
        fs::create_dir(paths.mods_dir.join("Alpha")).expect("create Alpha");

        let report = verify(&paths).expect("verify");
        match &report {
            VerifyReport::Checked(entries) => {
                assert_eq!(entries.get("Alpha"), Some(&true));
                assert_eq!(entries.get("Bravo"), Some(&false));
            }
            VerifyReport::NoManifest => panic!("expected checked report"),
        }
        assert_eq!(report.missing(), vec!["Bravo"]);
    }

    #[test]
    fn verify_without_manifest_is_informational() {
        let (_temp, paths) = game_fixture();
        let report = verify(&paths).expect("verify");
        assert!(matches!(report, VerifyReport::NoManifest));
    }

    #[test]
    fn install_progress_tops_out_at_100() {
        use crate::progress::{OpProgress, ProgressCallback};
        use std::sync::{Arc, Mutex};

        let (_temp, paths) = game_fixture();
        let zip_path = paths.game_root.join("pack.zip");
        write_mod_zip(
            &zip_path,
            &[("Alpha/ModInfo.xml", b"<a/>".as_slice()), ("Alpha/big.bin", &[9u8; 4096])],
        );

        let seen: Arc<Mutex<Vec<OpProgress>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ProgressCallback = Arc::new(move |progress| {
            sink.lock().unwrap().push(progress);
        });
        let mut reporter = Reporter::new(callback);
        install(&paths, &zip_path, &mut reporter).expect("install");

        let seen = seen.lock().unwrap();
        assert!(seen.iter().all(|progress| progress.percent <= 100));
        let installing: Vec<_> = seen
            .iter()
            .filter(|progress| progress.phase == Phase::Install)
            .collect();
        assert_eq!(installing.last().expect("install progress").percent, 100);
    }
}
