use crate::physics::depth::DepthInversion;
use crate::prelude::{ProcessingStage, Requirement, SkipReason, StageOutcome, StageResult, Unit};
use crate::processing::bed::index_by_center;
use crate::processing::runner::StageContext;
use crate::products::records::{read_derived, read_statistics, write_derived};
use crate::products::{read_pick, Bathymetry, DerivedStage, Product, SurfaceProperties};
use rayon::prelude::*;
use std::sync::Arc;

/// Depth of a subsurface reflector from its delay below the surface pick.
pub struct BathymetryStage {
    context: Arc<StageContext>,
    surface_pick: Option<String>,
    inversion: DepthInversion,
}

impl BathymetryStage {
    /// Fails when the configured depth grid is unusable.
    pub fn new(context: Arc<StageContext>, surface_pick: Option<String>) -> StageResult<Self> {
        let inversion = DepthInversion::from_config(&context.config)?;
        Ok(Self {
            context,
            surface_pick,
            inversion,
        })
    }

    fn surface_unit(&self, unit: &Unit) -> Option<Unit> {
        self.context
            .surface_pick(&unit.track, self.surface_pick.as_deref())
            .map(|pick| unit.with_pick(pick))
    }
}

impl ProcessingStage for BathymetryStage {
    fn name(&self) -> &'static str {
        "bathymetry"
    }

    fn requirements(&self, unit: &Unit) -> Result<Vec<Requirement>, SkipReason> {
        let surface = self.surface_unit(unit).ok_or(SkipReason::NoSurfacePick)?;
        Ok(vec![
            Requirement::new(Product::Statistics, unit),
            Requirement::new(Product::Statistics, &surface),
            Requirement::new(Product::Derived(DerivedStage::SurfaceProperties), &surface),
            Requirement::new(Product::Pick, unit),
            Requirement::new(Product::Pick, &surface),
        ])
    }

    fn execute(&self, unit: &Unit) -> StageResult<StageOutcome> {
        let Some(surface) = self.surface_unit(unit) else {
            return Ok(StageOutcome::Skipped(SkipReason::NoSurfacePick));
        };
        let ctx = &self.context;
        let locator = &ctx.locator;

        let windows = read_statistics(locator, unit)?;
        let surface_windows = read_statistics(locator, &surface)?;
        let properties: Vec<SurfaceProperties> = read_derived(locator, &surface)?;
        let sub_pick = read_pick(&locator.path(&Product::Pick, unit))?;
        let surface_pick = read_pick(&locator.path(&Product::Pick, &surface))?;
        let by_center = index_by_center(&surface_windows);
        let interval = ctx.config.sample_interval_s;

        let rows: Vec<Bathymetry> = windows
            .par_iter()
            .map(|w| {
                let delay = w
                    .start_index()
                    .map(|idx| (sub_pick.delay_at(idx) - surface_pick.delay_at(idx)).abs() * interval)
                    .filter(|delay| delay.is_finite())
                    .unwrap_or(0.0);
                let eps = w
                    .center_index()
                    .and_then(|center| by_center.get(&center))
                    .and_then(|&row| properties.get(row))
                    .map_or(f64::NAN, |p| p.eps);

                let estimate = self.inversion.invert(eps, delay);
                Bathymetry {
                    depth: estimate.depth,
                    uncertainty: estimate.uncertainty,
                    density_at_depth: estimate.density_at_depth,
                    delay,
                }
            })
            .collect();

        let product = write_derived(locator, unit, &rows)?;
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
    use crate::products::records::write_statistics;
    use crate::products::WindowStatistics;
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    fn window(start: f64) -> WindowStatistics {
        WindowStatistics {
            start,
            center: start + 20.0,
            end: start + 40.0,
            total_power: -90.0,
            coherent_power: -90.0,
            diffuse_power: -100.0,
            mixture: f64::NAN,
            coherence: f64::NAN,
            goodness: f64::NAN,
            flag: 1.0,
        }
    }

    #[test]
    fn delay_below_solid_ice_inverts_to_depth() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path());
        let sub = Unit::new(TRACK, "sub_elg");
        let srf = sub.with_pick("srf_elg");
        // 50 samples of 20 ns: 1 us two-way
        write_pick(&ctx, "sub_elg", 100, 450.0, |_| 0.0);
        write_pick(&ctx, "srf_elg", 100, 400.0, |_| 0.0);
        write_statistics(&ctx.locator, &srf, &[window(0.0), window(20.0)]).unwrap();
        write_statistics(&ctx.locator, &sub, &[window(0.0), window(20.0), window(200.0)]).unwrap();
        let props = SurfaceProperties {
            sh: 0.0,
            eps: 3.15,
            flag: 1.0,
        };
        write_derived(&ctx.locator, &srf, &[props, props]).unwrap();

        let stage = BathymetryStage::new(ctx.clone(), Some("srf_elg".into())).unwrap();
        let outcome = run_stage(&stage, &ctx.locator, &sub).unwrap();
        assert!(matches!(outcome, StageOutcome::Completed { rows: 3, .. }));

        let rows: Vec<Bathymetry> = read_derived(&ctx.locator, &sub).unwrap();
        assert_relative_eq!(rows[0].delay, 1e-6, max_relative = 1e-9);
        assert_relative_eq!(rows[0].depth, 84.0);
        assert_relative_eq!(rows[1].uncertainty, 2.815_231_9, epsilon = 1e-6);
        // outside the picks: zero delay, no surface row: vacuum permittivity
        assert_eq!(rows[2].delay, 0.0);
        assert_eq!(rows[2].depth, 0.0);
        assert!(rows[2].uncertainty.is_infinite());
    }
}
