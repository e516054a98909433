use crate::prelude::{ProcessingStage, Requirement, SkipReason, StageOutcome, StageResult, Unit};
use crate::physics::spreading::geometric_loss_db;
use crate::processing::runner::StageContext;
use crate::products::records::write_statistics;
use crate::products::{read_pick, Geometry, Product, WindowStatistics};
use rayon::prelude::*;
use std::sync::Arc;

/// Sliding-window echo statistics along a pick.
pub struct StatisticsStage {
    context: Arc<StageContext>,
}

impl StatisticsStage {
    pub fn new(context: Arc<StageContext>) -> Self {
        Self { context }
    }
}

/// Start index of every full window of `size` samples, one every `step`,
/// the first centered on `size / 2`.
pub fn window_starts(len: usize, size: usize, step: usize) -> Vec<usize> {
    if size == 0 || step == 0 || len < size {
        return Vec::new();
    }
    (0..=len - size).step_by(step).collect()
}

impl ProcessingStage for StatisticsStage {
    fn name(&self) -> &'static str {
        "statistics"
    }

    fn requirements(&self, unit: &Unit) -> Result<Vec<Requirement>, SkipReason> {
        Ok(vec![
            Requirement::new(Product::Pick, unit),
            Requirement::new(Product::Geometry, unit),
        ])
    }

    fn execute(&self, unit: &Unit) -> StageResult<StageOutcome> {
        let ctx = &self.context;
        let config = &ctx.config;
        let trace = read_pick(&ctx.locator.path(&Product::Pick, unit))?;
        let geometry = Geometry::read(&ctx.locator.path(&Product::Geometry, unit))?;

        let range = geometry.surface_range();
        let power = config.calibration.apply(&trace.value, Some(&range), true);
        let amplitude: Vec<f64> = power.iter().map(|p| 10f64.powf(p / 20.0)).collect();

        let size = config.window_size;
        let rows: Vec<WindowStatistics> = window_starts(amplitude.len(), size, config.window_step)
            .into_par_iter()
            .map(|start| {
                let center = start + size / 2;
                let stats = ctx.models.fit.fit(&amplitude[start..start + size]);
                // back to received power
                let loss = geometric_loss_db(geometry.at(center as f64).surface_range);
                WindowStatistics {
                    start: start as f64,
                    center: center as f64,
                    end: (start + size) as f64,
                    total_power: stats.total_power + loss,
                    coherent_power: stats.coherent_power + loss,
                    diffuse_power: stats.diffuse_power + loss,
                    mixture: stats.mixture,
                    coherence: stats.coherence,
                    goodness: stats.goodness,
                    flag: if stats.valid { 1.0 } else { 0.0 },
                }
            })
            .collect();

        let product = write_statistics(&ctx.locator, unit, &rows)?;
        Ok(StageOutcome::Completed {
            product,
            rows: rows.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::runner::fixtures::*;
    use crate::processing::runner::run_stage;
    use crate::products::records::read_statistics;
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    #[test]
    fn windows_stay_inside_the_sequence() {
        assert_eq!(window_starts(100, 40, 20), vec![0, 20, 40, 60]);
        assert_eq!(window_starts(39, 40, 20), Vec::<usize>::new());
        assert_eq!(window_starts(40, 40, 20), vec![0]);
    }

    #[test]
    fn constant_echo_records_received_power() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path());
        write_pick(&ctx, "srf_elg", 100, 400.0, |_| 20_000.0);
        write_geometry(&ctx, 100, 800.0);

        let unit = Unit::new(TRACK, "srf_elg");
        let stage = StatisticsStage::new(ctx.clone());
        let outcome = run_stage(&stage, &ctx.locator, &unit).unwrap();
        assert!(matches!(outcome, StageOutcome::Completed { rows: 4, .. }));

        let rows = read_statistics(&ctx.locator, &unit).unwrap();
        let received = 20_000.0 * ctx.config.calibration.scale + ctx.config.calibration.offset_db();
        assert_eq!(rows[1].center, 40.0);
        assert_eq!(rows[1].flag, 1.0);
        assert_relative_eq!(rows[1].total_power, received, epsilon = 1e-5);
        assert_relative_eq!(rows[1].coherent_power, received, epsilon = 1e-5);
        assert!(rows[1].diffuse_power < rows[1].total_power - 60.0);
    }
}
