use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Backup,
    Extract,
    Install,
    Restore,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Backup => "Backing up",
            Phase::Extract => "Extracting",
            Phase::Install => "Installing",
            Phase::Restore => "Restoring",
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpProgress {
    pub phase: Phase,
    pub percent: u8,
    pub detail: Option<String>,
}

pub type ProgressCallback = Arc<dyn Fn(OpProgress) + Send + Sync>;

/// Running byte counter for one logical operation. A single weight is
/// shared across every copy within the operation so the percent climbs
/// monotonically over the precomputed total.
#[derive(Debug)]
pub struct ByteWeight {
    copied: u64,
    total: u64,
}

impl ByteWeight {
    pub fn new(total: u64) -> Self {
        Self { copied: 0, total }
    }

    pub fn add(&mut self, bytes: u64) -> u8 {
        self.copied = self.copied.saturating_add(bytes);
        self.percent()
    }

    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        (self.copied.min(self.total) as u128 * 100 / self.total as u128) as u8
    }

    pub fn copied(&self) -> u64 {
        self.copied
    }
}

/// Hands progress to the callback, collapsing consecutive repeats of the
/// same phase and percent so each value is delivered once.
pub struct Reporter {
    callback: Option<ProgressCallback>,
    last: Option<(Phase, u8)>,
}

impl Reporter {
    pub fn new(callback: ProgressCallback) -> Self {
        Self {
            callback: Some(callback),
            last: None,
        }
    }

    pub fn silent() -> Self {
        Self {
            callback: None,
            last: None,
        }
    }

    pub fn emit(&mut self, phase: Phase, percent: u8, detail: Option<String>) {
        let Some(callback) = &self.callback else {
            return;
        };
        if detail.is_none() && self.last == Some((phase, percent)) {
            return;
        }
        self.last = Some((phase, percent));
        callback(OpProgress {
            phase,
            percent,
            detail,
        });
    }
}
