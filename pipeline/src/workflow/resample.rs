//! Resampling of picks from another processing directory through external tools.

use crate::workflow::config::{ResampleConfig, ToolCommand};
use log::{debug, warn};
use rsrcore::prelude::{
    ProcessingStage, Requirement, SkipReason, StageError, StageOutcome, StageResult, Unit,
};
use rsrcore::products::table::persist_atomically;
use rsrcore::products::{read_pick, Product, ProductLocator};
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Builds `<product>.<pick>` in the configured processing directory from the
/// source pick: interpolation onto the along-track grid, then projection onto
/// the compressed product. Both intermediate outputs are concatenated into
/// the target.
pub struct ResampleStage {
    locator: ProductLocator,
    settings: ResampleConfig,
}

impl ResampleStage {
    pub fn new(locator: ProductLocator, settings: ResampleConfig) -> Self {
        Self { locator, settings }
    }

    fn source(&self) -> Product {
        Product::SourcePick {
            process: self.settings.source_process.clone(),
            product: self.settings.source_product.clone(),
        }
    }

    /// Runs both tools and writes the target; the failed tool, if any.
    /// Leaves the intermediates for the caller to remove.
    fn resample(
        &self,
        unit: &Unit,
        source: &Path,
        compressed: &Path,
        target: &Path,
        interpolated: &Path,
        projected: &Path,
    ) -> StageResult<Option<String>> {
        let settings = &self.settings;
        if !run_tool(&settings.interpolate, [unit.track.as_str()], source, interpolated)? {
            return Ok(Some(settings.interpolate.program.clone()));
        }
        if !run_tool(&settings.project, [compressed.as_os_str()], interpolated, projected)? {
            return Ok(Some(settings.project.program.clone()));
        }
        persist_atomically(target, |file| {
            for part in [interpolated, projected] {
                let mut reader = File::open(part).map_err(|err| StageError::io(part, err))?;
                io::copy(&mut reader, file).map_err(|err| StageError::io(part, err))?;
            }
            Ok(())
        })?;
        Ok(None)
    }
}

/// `<target>.<suffix>`; the extra dot keeps it out of pick discovery.
fn intermediate(target: &Path, suffix: &str) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    target.with_file_name(name)
}

/// Runs `tool` with `extra` arguments, `input` on stdin and `output` as stdout.
/// `false` when the tool cannot start or exits unsuccessfully.
fn run_tool<I, S>(tool: &ToolCommand, extra: I, input: &Path, output: &Path) -> StageResult<bool>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let stdin = File::open(input).map_err(|err| StageError::io(input, err))?;
    let stdout = File::create(output).map_err(|err| StageError::io(output, err))?;
    let status = Command::new(&tool.program)
        .args(&tool.args)
        .args(extra)
        .stdin(Stdio::from(stdin))
        .stdout(Stdio::from(stdout))
        .status();
    match status {
        Ok(status) if status.success() => Ok(true),
        Ok(status) => {
            warn!("{} exited with {}", tool.program, status);
            Ok(false)
        }
        Err(err) => {
            warn!("cannot run {}: {}", tool.program, err);
            Ok(false)
        }
    }
}

fn remove_quietly(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != io::ErrorKind::NotFound {
            warn!("cannot remove {}: {}", path.display(), err);
        }
    }
}

impl ProcessingStage for ResampleStage {
    fn name(&self) -> &'static str {
        "resample"
    }

    fn quiet_skips(&self) -> bool {
        true
    }

    fn requirements(&self, unit: &Unit) -> Result<Vec<Requirement>, SkipReason> {
        Ok(vec![
            Requirement::new(self.source(), unit),
            Requirement::new(Product::Compressed, unit),
            Requirement::new(Product::Sweeps, unit),
        ])
    }

    fn execute(&self, unit: &Unit) -> StageResult<StageOutcome> {
        let source = self.locator.path(&self.source(), unit);
        let compressed = self.locator.path(&Product::Compressed, unit);
        let target = self.locator.path(&Product::Pick, unit);
        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir).map_err(|err| StageError::io(dir, err))?;
        }

        let interpolated = intermediate(&target, "lu");
        let projected = intermediate(&target, "p");
        let resampled = self.resample(unit, &source, &compressed, &target, &interpolated, &projected);
        remove_quietly(&interpolated);
        remove_quietly(&projected);

        if let Some(tool) = resampled? {
            debug!("{} not resampled", unit);
            return Ok(StageOutcome::Skipped(SkipReason::ToolFailure(tool)));
        }

        let rows = read_pick(&target)?.len();
        Ok(StageOutcome::Completed {
            product: target,
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsrcore::processing::run_stage;
    use rsrcore::products::ProductPaths;
    use tempfile::TempDir;

    fn passthrough() -> ToolCommand {
        ToolCommand::new("sh", &["-c", "cat", "--"])
    }

    fn seeded(root: &Path, settings: ResampleConfig) -> (ResampleStage, ProductLocator, Unit) {
        let locator = ProductLocator::new(ProductPaths::under(root), "pik1.1m", "MagHiResInco1");
        let stage = ResampleStage::new(locator.clone(), settings.clone());
        let unit = Unit::new("MIS/JKB2e/Y35a", "srf_elg");
        let source = Product::SourcePick {
            process: settings.source_process,
            product: settings.source_product,
        };
        for (product, contents) in [
            (source, "P\t1\t400\t18000\n"),
            (Product::Compressed, "cmp"),
            (Product::Sweeps, "sweeps"),
        ] {
            let path = locator.path(&product, &unit);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }
        (stage, locator, unit)
    }

    #[test]
    fn target_concatenates_both_tool_outputs() {
        let temp = TempDir::new().unwrap();
        let settings = ResampleConfig {
            interpolate: passthrough(),
            project: passthrough(),
            ..ResampleConfig::default()
        };
        let (stage, locator, unit) = seeded(temp.path(), settings);

        let outcome = run_stage(&stage, &locator, &unit).unwrap();
        assert!(matches!(outcome, StageOutcome::Completed { rows: 2, .. }));

        let target = locator.path(&Product::Pick, &unit);
        assert_eq!(
            fs::read_to_string(&target).unwrap(),
            "P\t1\t400\t18000\nP\t1\t400\t18000\n"
        );
        assert!(!intermediate(&target, "lu").exists());
        assert!(!intermediate(&target, "p").exists());
        assert_eq!(locator.picks(&unit.track).unwrap(), vec!["srf_elg"]);
    }

    #[test]
    fn tool_failure_leaves_no_target() {
        let temp = TempDir::new().unwrap();
        let settings = ResampleConfig {
            interpolate: passthrough(),
            project: ToolCommand::new("false", &[]),
            ..ResampleConfig::default()
        };
        let (stage, locator, unit) = seeded(temp.path(), settings);

        let outcome = run_stage(&stage, &locator, &unit).unwrap();
        assert_eq!(
            outcome,
            StageOutcome::Skipped(SkipReason::ToolFailure("false".into()))
        );
        let target = locator.path(&Product::Pick, &unit);
        assert!(!target.exists());
        assert!(locator.picks(&unit.track).unwrap().is_empty());
    }

    #[test]
    fn missing_compressed_product_is_skipped() {
        let temp = TempDir::new().unwrap();
        let (stage, locator, unit) = seeded(temp.path(), ResampleConfig::default());
        fs::remove_file(locator.path(&Product::Compressed, &unit)).unwrap();

        assert!(stage.quiet_skips());
        let outcome = run_stage(&stage, &locator, &unit).unwrap();
        assert!(matches!(outcome, StageOutcome::Skipped(SkipReason::MissingInput(_))));
    }

    #[test]
    fn intermediates_are_removed_when_the_target_cannot_be_written() {
        let temp = TempDir::new().unwrap();
        let settings = ResampleConfig {
            interpolate: passthrough(),
            project: passthrough(),
            ..ResampleConfig::default()
        };
        let (stage, locator, unit) = seeded(temp.path(), settings);
        // a non-empty directory in place of the target blocks the final rename
        let target = locator.path(&Product::Pick, &unit);
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("occupied"), "x").unwrap();

        assert!(run_stage(&stage, &locator, &unit).is_err());
        assert!(!intermediate(&target, "lu").exists());
        assert!(!intermediate(&target, "p").exists());
    }
}
