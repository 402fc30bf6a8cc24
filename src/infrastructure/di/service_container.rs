//! Service wiring
//!
//! One container per command invocation; services borrow the shared
//! settings and filesystem through `Arc`s.

use std::sync::Arc;

use crate::application::services::{BatchService, DiagnosticService};
use crate::config::Settings;
use crate::infrastructure::traits::{FileSystem, RealFileSystem};

pub struct ServiceContainer {
    pub settings: Arc<Settings>,
    pub fs: Arc<dyn FileSystem>,
}

impl ServiceContainer {
    /// Container backed by the real filesystem.
    pub fn new(settings: Settings) -> Self {
        Self::with_deps(settings, Arc::new(RealFileSystem))
    }

    pub fn with_deps(settings: Settings, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            settings: Arc::new(settings),
            fs,
        }
    }

    /// Single-fit diagnostics with this container's tolerances and mode.
    pub fn diagnostics(&self) -> DiagnosticService {
        DiagnosticService::new(Arc::clone(&self.fs), Arc::clone(&self.settings))
    }

    pub fn batch(&self) -> BatchService {
        BatchService::new(Arc::clone(&self.fs), Arc::clone(&self.settings))
    }
}
