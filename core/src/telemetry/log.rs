use crate::prelude::SkipReason;
use log::{debug, info};
use std::path::Path;

/// Emits the product notices of the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct LogManager;

impl LogManager {
    pub fn new() -> Self {
        Self
    }

    pub fn created(&self, path: &Path) {
        info!("CREATED: {}", path.display());
    }

    pub fn ignored(&self, reason: &SkipReason) {
        info!("IGNORED: {}", reason);
    }

    /// Skip notice for stages whose missing inputs are routine.
    pub fn ignored_quietly(&self, reason: &SkipReason) {
        debug!("IGNORED: {}", reason);
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new()
    }
}
