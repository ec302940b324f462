use anyhow::{bail, Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const GAME_EXE: &str = "7DaysToDie.exe";
pub const MODS_DIR_NAME: &str = "Mods";
pub const PROTECTED_DIR: &str = "0_TFP_Harmony";
pub const MOD_MARKER: &str = "ModInfo.xml";
pub const STEAM_HINT: &str = "C:\\Steam\\steamapps\\common\\7 Days To Die";

/// Resolved game locations. The mods dir always sits directly under the
/// game root, sibling to the executable.
#[derive(Debug, Clone)]
pub struct GamePaths {
    pub game_root: PathBuf,
    pub mods_dir: PathBuf,
}

impl GamePaths {
    /// Derives the game root from the picked executable. The picked file
    /// must actually be the game executable; anything else is rejected
    /// before any directory is touched.
    pub fn from_exe(exe_path: &Path) -> Result<Self> {
        let file_name = exe_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("");
        if !file_name.eq_ignore_ascii_case(GAME_EXE) {
            bail!("{} is not {GAME_EXE}", exe_path.display());
        }
        let game_root = exe_path
            .parent()
            .map(|parent| parent.to_path_buf())
            .with_context(|| format!("resolve parent of {}", exe_path.display()))?;
        Self::from_root(&game_root)
    }

    /// Rebuilds paths from a previously picked game root, creating the
    /// mods dir if the game ships without one.
    pub fn from_root(game_root: &Path) -> Result<Self> {
        let mods_dir = game_root.join(MODS_DIR_NAME);
        fs::create_dir_all(&mods_dir).context("create Mods dir")?;
        Ok(Self {
            game_root: game_root.to_path_buf(),
            mods_dir,
        })
    }
}

pub fn is_protected(name: &str) -> bool {
    name.eq_ignore_ascii_case(PROTECTED_DIR)
}

/// Immediate subdirectories of the mods root, protected dir excluded,
/// sorted by name. Plain files (the manifest among them) are never listed.
pub fn list_mod_dirs(mods_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(mods_dir).context("read Mods dir")? {
        let entry = entry.context("read Mods dir entry")?;
        let file_type = entry.file_type().context("mod dir file type")?;
        if !file_type.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if is_protected(&name.to_string_lossy()) {
            continue;
        }
        dirs.push(entry.path());
    }
    dirs.sort();
    Ok(dirs)
}
