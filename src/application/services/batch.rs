//! Batch evaluation of many fits
//!
//! Fits are independent: each one is evaluated on the rayon pool and a
//! failure is recorded against its file without affecting the others.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::application::error_ext::IoResultExt;
use crate::application::services::DiagnosticService;
use crate::application::{ApplicationError, ApplicationResult};
use crate::config::Settings;
use crate::domain::{IdentCheckRes, PhyloLimitRec};
use crate::infrastructure::traits::FileSystem;

const FIT_EXTENSION: &str = "json";
const RECORD_SUFFIX: &str = ".record.json";

/// Room for parsing trees nested up to [`MAX_NESTING`](crate::domain::MAX_NESTING) levels on a worker.
const WORKER_STACK_SIZE: usize = 16 * 1024 * 1024;

/// Result of evaluating one fit file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FitOutcome {
    Completed { path: PathBuf, record: PhyloLimitRec },
    Failed { path: PathBuf, error: String },
}

impl FitOutcome {
    pub fn path(&self) -> &Path {
        match self {
            FitOutcome::Completed { path, .. } | FitOutcome::Failed { path, .. } => path,
        }
    }
}

/// Identifiability verdict for one fit file, or why there is none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckOutcome {
    Completed { path: PathBuf, result: IdentCheckRes },
    Failed { path: PathBuf, error: String },
}

impl CheckOutcome {
    pub fn path(&self) -> &Path {
        match self {
            CheckOutcome::Completed { path, .. } | CheckOutcome::Failed { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub completed: usize,
    pub failed: usize,
    pub identifiable: usize,
    pub non_identifiable: usize,
    pub with_boundary_values: usize,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[FitOutcome]) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            match outcome {
                FitOutcome::Completed { record, .. } => {
                    summary.completed += 1;
                    if record.identifiable {
                        summary.identifiable += 1;
                    } else {
                        summary.non_identifiable += 1;
                    }
                    if record.has_boundary_values() {
                        summary.with_boundary_values += 1;
                    }
                }
                FitOutcome::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }
}

/// Records written by a previous run are not fits.
fn is_record_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(RECORD_SUFFIX))
}

pub struct BatchService {
    fs: Arc<dyn FileSystem>,
    settings: Arc<Settings>,
}

impl BatchService {
    pub fn new(fs: Arc<dyn FileSystem>, settings: Arc<Settings>) -> Self {
        Self { fs, settings }
    }

    /// Expands directories into the fit files below them.
    ///
    /// Files given explicitly are taken as-is, whatever their extension.
    pub fn collect_fits(&self, inputs: &[PathBuf]) -> ApplicationResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        for input in inputs {
            if self.fs.is_dir(input) {
                let found = self
                    .fs
                    .walk_files(input, FIT_EXTENSION)
                    .with_path_context("walk directory", input)?;
                debug!("collect_fits: {} files under {}", found.len(), input.display());
                files.extend(found.into_iter().filter(|p| !is_record_file(p)));
            } else if self.fs.is_file(input) {
                files.push(input.clone());
            } else {
                return Err(ApplicationError::OperationFailed {
                    context: format!("fit input not found: {}", input.display()),
                    source: Box::new(std::io::Error::from(std::io::ErrorKind::NotFound)),
                });
            }
        }
        if files.is_empty() {
            let root = inputs.first().cloned().unwrap_or_default();
            return Err(ApplicationError::NoFits(root));
        }
        Ok(files)
    }

    /// Evaluates every fit, in input order.
    ///
    /// Uses parallel execution with rayon; `output.jobs` bounds the pool.
    #[instrument(level = "debug", skip_all, fields(n = paths.len()))]
    pub fn run(&self, paths: &[PathBuf]) -> ApplicationResult<Vec<FitOutcome>> {
        let diagnostics = DiagnosticService::new(self.fs.clone(), self.settings.clone());
        self.for_each_fit(paths, |path| match diagnostics.record_file(path) {
            Ok(record) => FitOutcome::Completed {
                path: path.clone(),
                record,
            },
            Err(e) => {
                warn!("{}: {}", path.display(), e);
                FitOutcome::Failed {
                    path: path.clone(),
                    error: e.to_string(),
                }
            }
        })
    }

    /// Identifiability check only, for every fit in input order.
    #[instrument(level = "debug", skip_all, fields(n = paths.len()))]
    pub fn check(&self, paths: &[PathBuf]) -> ApplicationResult<Vec<CheckOutcome>> {
        let diagnostics = DiagnosticService::new(self.fs.clone(), self.settings.clone());
        self.for_each_fit(paths, |path| {
            match diagnostics.load(path).and_then(|fit| diagnostics.check(&fit)) {
                Ok(result) => CheckOutcome::Completed {
                    path: path.clone(),
                    result,
                },
                Err(e) => {
                    warn!("{}: {}", path.display(), e);
                    CheckOutcome::Failed {
                        path: path.clone(),
                        error: e.to_string(),
                    }
                }
            }
        })
    }

    fn for_each_fit<T, F>(&self, paths: &[PathBuf], evaluate: F) -> ApplicationResult<Vec<T>>
    where
        T: Send,
        F: Fn(&PathBuf) -> T + Send + Sync,
    {
        // 0 lets rayon pick one worker per core
        let jobs = self.settings.output.jobs.unwrap_or(0);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .stack_size(WORKER_STACK_SIZE)
            .build()
            .map_err(|e| ApplicationError::OperationFailed {
                context: format!("start {jobs} workers"),
                source: Box::new(e),
            })?;
        Ok(pool.install(|| paths.par_iter().map(evaluate).collect()))
    }

    /// Writes each completed record to `<dir>/<sub>/<file stem>.record.json`.
    ///
    /// `<sub>` is the fit's directory relative to the deepest directory
    /// shared by all completed fits, so same-named fits in different
    /// directories keep separate records. Targets are checked for clashes
    /// before anything is written.
    pub fn write_records(&self, outcomes: &[FitOutcome], dir: &Path) -> ApplicationResult<Vec<PathBuf>> {
        let completed: Vec<(&PathBuf, &PhyloLimitRec)> = outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                FitOutcome::Completed { path, record } => Some((path, record)),
                FitOutcome::Failed { .. } => None,
            })
            .collect();
        let base = common_parent(completed.iter().map(|(path, _)| path.as_path()));

        let mut claimed: HashMap<PathBuf, &Path> = HashMap::with_capacity(completed.len());
        let mut planned = Vec::with_capacity(completed.len());
        for (path, record) in completed {
            let target = record_target(dir, &base, path, record);
            if let Some(first) = claimed.insert(target.clone(), path.as_path()) {
                return Err(ApplicationError::RecordCollision {
                    target,
                    first: first.to_path_buf(),
                    second: path.clone(),
                });
            }
            planned.push((target, record));
        }

        self.fs
            .create_dir_all(dir)
            .with_path_context("create output directory", dir)?;
        let mut written = Vec::with_capacity(planned.len());
        for (target, record) in planned {
            if let Some(parent) = target.parent().filter(|p| *p != dir) {
                self.fs
                    .create_dir_all(parent)
                    .with_path_context("create output directory", parent)?;
            }
            let json = serde_json::to_string_pretty(record).map_err(|e| ApplicationError::OperationFailed {
                context: format!("serialize record for {}", record.source),
                source: Box::new(e),
            })?;
            self.fs
                .write(&target, &json)
                .with_path_context("write record", &target)?;
            written.push(target);
        }
        debug!("write_records: {} files", written.len());
        Ok(written)
    }
}

/// Deepest directory containing every path.
fn common_parent<'a>(paths: impl IntoIterator<Item = &'a Path>) -> PathBuf {
    let mut common: Option<Vec<Component<'a>>> = None;
    for path in paths {
        let parent: Vec<Component<'a>> = path
            .parent()
            .map(|p| p.components().collect())
            .unwrap_or_default();
        common = Some(match common {
            None => parent,
            Some(prev) => prev
                .into_iter()
                .zip(parent)
                .take_while(|(a, b)| a == b)
                .map(|(a, _)| a)
                .collect(),
        });
    }
    common.unwrap_or_default().into_iter().collect()
}

fn record_target(dir: &Path, base: &Path, path: &Path, record: &PhyloLimitRec) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| record.source.clone());
    // only plain names, so the target cannot escape `dir`
    let sub: PathBuf = path
        .parent()
        .and_then(|p| p.strip_prefix(base).ok())
        .map(|rel| {
            rel.components()
                .filter(|c| matches!(c, Component::Normal(_)))
                .collect()
        })
        .unwrap_or_default();
    dir.join(sub).join(format!("{stem}{RECORD_SUFFIX}"))
}
