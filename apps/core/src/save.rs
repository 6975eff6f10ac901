use std::fmt::{Display, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{error, info};

use crate::history_store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaveTarget {
    PresentationState,
    Settings,
    ProviderRegistry,
    IconCache,
    InputMethod,
}

impl Display for SaveTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::PresentationState => "presentation-state",
            Self::Settings => "settings",
            Self::ProviderRegistry => "provider-registry",
            Self::IconCache => "icon-cache",
            Self::InputMethod => "input-method",
        };
        f.write_str(label)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("serialize error: {0}")]
    Serialize(String),
    #[error("{0}")]
    Failed(String),
}

pub trait Saver: Send + Sync {
    fn save(&self) -> Result<(), SaveError>;
}

pub struct FnSaver<F>(pub F);

impl<F> Saver for FnSaver<F>
where
    F: Fn() -> Result<(), SaveError> + Send + Sync,
{
    fn save(&self) -> Result<(), SaveError> {
        (self.0)()
    }
}

pub struct NoopSaver;

impl Saver for NoopSaver {
    fn save(&self) -> Result<(), SaveError> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub saved: Vec<SaveTarget>,
    pub failed: Vec<(SaveTarget, String)>,
}

impl SaveReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Default, Clone)]
pub struct SaveSet {
    savers: Vec<(SaveTarget, Arc<dyn Saver>)>,
}

impl SaveSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, target: SaveTarget, saver: Arc<dyn Saver>) -> Self {
        self.savers.push((target, saver));
        self
    }

    pub fn targets(&self) -> Vec<SaveTarget> {
        self.savers.iter().map(|(target, _)| *target).collect()
    }

    /// Runs every saver once, in registration order. A saver that errors or
    /// panics is recorded and the rest still run.
    pub fn save_all(&self) -> SaveReport {
        let mut report = SaveReport::default();
        for (target, saver) in &self.savers {
            let outcome = match catch_unwind(AssertUnwindSafe(|| saver.save())) {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(_) => Err("saver panicked".to_string()),
            };
            match outcome {
                Ok(()) => report.saved.push(*target),
                Err(message) => {
                    error!(subsystem = %target, "save failed: {message}");
                    report.failed.push((*target, message));
                }
            }
        }
        info!(
            saved = report.saved.len(),
            failed = report.failed.len(),
            "save-all finished"
        );
        report
    }
}
