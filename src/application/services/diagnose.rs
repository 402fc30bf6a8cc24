//! Single-fit diagnostics
//!
//! Runs classification, the identifiability check and the boundary scan on
//! one fit and assembles the record.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::application::fit::{load_fit, Fit};
use crate::application::ApplicationResult;
use crate::config::Settings;
use crate::domain::{
    classify_all, BoundsViolation, IdentCheckRes, ModelMatrixCategories, PhyloLimitRec,
    RecordAssembler,
};
use crate::infrastructure::traits::FileSystem;

/// Service producing per-fit results with the configured tolerances.
pub struct DiagnosticService {
    fs: Arc<dyn FileSystem>,
    settings: Arc<Settings>,
}

impl DiagnosticService {
    pub fn new(fs: Arc<dyn FileSystem>, settings: Arc<Settings>) -> Self {
        Self { fs, settings }
    }

    pub fn load(&self, path: &Path) -> ApplicationResult<Fit> {
        debug!("load: path={}", path.display());
        load_fit(self.fs.as_ref(), path)
    }

    pub fn classify(&self, fit: &Fit) -> ApplicationResult<ModelMatrixCategories> {
        Ok(classify_all(&fit.psubs, &self.settings.classify.classifier())?)
    }

    #[instrument(level = "debug", skip_all, fields(source = %fit.source))]
    pub fn check(&self, fit: &Fit) -> ApplicationResult<IdentCheckRes> {
        let mcats = self.classify(fit)?;
        Ok(self.settings.identifiability.checker().check(&mcats, &fit.tree)?)
    }

    pub fn boundary(&self, fit: &Fit) -> BoundsViolation {
        self.settings.boundary.checker().check(&fit.source, &fit.params)
    }

    /// Full record for one fit.
    #[instrument(level = "debug", skip_all, fields(source = %fit.source))]
    pub fn record(&self, fit: &Fit) -> ApplicationResult<PhyloLimitRec> {
        let mcats = self.classify(fit)?;
        let ident = self.settings.identifiability.checker().check(&mcats, &fit.tree)?;
        let bounds = self.boundary(fit);
        let rec = RecordAssembler::new(fit.model_name.clone()).assemble(&fit.psubs, &mcats, ident, bounds);
        info!(
            "{}: identifiable={} non_dlc={} boundary_values={}",
            rec.source,
            rec.identifiable,
            rec.iscl_mcats.len(),
            rec.boundary_values.len()
        );
        Ok(rec)
    }

    pub fn record_file(&self, path: &Path) -> ApplicationResult<PhyloLimitRec> {
        let fit = self.load(path)?;
        self.record(&fit)
    }
}
