use crate::config::AppConfig;
use crate::game::GamePaths;
use crate::ops::{self, BackupReport, InstallReport, RestoreReport, VerifyReport};
use crate::progress::{OpProgress, ProgressCallback, Reporter};
use anyhow::{bail, Context, Result};
use std::{
    path::{Path, PathBuf},
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc,
    },
    thread,
};

/// Worker-to-surface hand-off. Progress and outcomes cross the thread
/// boundary only through these messages; the worker never touches
/// surface-owned state.
#[derive(Debug)]
pub enum OpMessage {
    Progress(OpProgress),
    Completed(OpOutcome),
    Failed(String),
}

#[derive(Debug)]
pub enum OpOutcome {
    Backup(BackupReport),
    Install(InstallReport),
    Restore(RestoreReport),
    Verify(VerifyReport),
}

pub struct App {
    config: AppConfig,
    paths: Option<GamePaths>,
    busy: bool,
    tx: Sender<OpMessage>,
    rx: Receiver<OpMessage>,
}

impl App {
    pub fn initialize() -> Result<Self> {
        let config = AppConfig::load_or_create()?;
        let paths = match &config.game_root {
            Some(root) => Some(GamePaths::from_root(root)?),
            None => None,
        };
        let (tx, rx) = mpsc::channel();
        Ok(Self {
            config,
            paths,
            busy: false,
            tx,
            rx,
        })
    }

    pub fn paths(&self) -> Option<&GamePaths> {
        self.paths.as_ref()
    }

    /// Validates the picked executable and persists its folder as the game
    /// root for later runs.
    pub fn set_game_exe(&mut self, exe_path: &Path) -> Result<()> {
        let paths = GamePaths::from_exe(exe_path)?;
        self.config.game_root = Some(paths.game_root.clone());
        self.config.save()?;
        log::info!("game folder set to {}", paths.game_root.display());
        self.paths = Some(paths);
        Ok(())
    }

    /// Precondition gate shared by all four operations: a configured game
    /// folder and no operation already in flight.
    fn begin(&mut self) -> Result<GamePaths> {
        if self.busy {
            bail!("an operation is already running");
        }
        self.paths
            .clone()
            .context("game folder not set; pick 7DaysToDie.exe first")
    }

    fn spawn<F>(&mut self, work: F)
    where
        F: FnOnce(&mut Reporter) -> Result<OpOutcome> + Send + 'static,
    {
        self.busy = true;
        let tx = self.tx.clone();
        thread::spawn(move || {
            let progress_tx = tx.clone();
            let callback: ProgressCallback = Arc::new(move |progress| {
                let _ = progress_tx.send(OpMessage::Progress(progress));
            });
            let mut reporter = Reporter::new(callback);
            let message = match work(&mut reporter) {
                Ok(outcome) => OpMessage::Completed(outcome),
                Err(err) => OpMessage::Failed(format!("{err:#}")),
            };
            let _ = tx.send(message);
        });
    }

    pub fn start_backup(&mut self) -> Result<()> {
        let paths = self.begin()?;
        self.spawn(move |reporter| ops::backup(&paths, reporter).map(OpOutcome::Backup));
        Ok(())
    }

    pub fn start_install(&mut self, archive: PathBuf) -> Result<()> {
        let paths = self.begin()?;
        self.spawn(move |reporter| {
            ops::install(&paths, &archive, reporter).map(OpOutcome::Install)
        });
        Ok(())
    }

    pub fn start_restore(&mut self, snapshot: PathBuf) -> Result<()> {
        let paths = self.begin()?;
        self.spawn(move |reporter| {
            ops::restore(&paths, &snapshot, reporter).map(OpOutcome::Restore)
        });
        Ok(())
    }

    pub fn start_verify(&mut self) -> Result<()> {
        let paths = self.begin()?;
        self.spawn(move |_reporter| ops::verify(&paths).map(OpOutcome::Verify));
        Ok(())
    }

    /// Blocks for the next worker message. Terminal messages release the
    /// single-operation lock.
    pub fn recv(&mut self) -> Result<OpMessage> {
        let message = self.rx.recv().context("worker disconnected")?;
        if matches!(message, OpMessage::Completed(_) | OpMessage::Failed(_)) {
            self.busy = false;
        }
        Ok(message)
    }
}
