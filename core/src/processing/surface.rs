use crate::prelude::{ProcessingStage, Requirement, SkipReason, StageOutcome, StageResult, Unit};
use crate::physics::spreading::geometric_loss_db;
use crate::processing::runner::StageContext;
use crate::products::records::{read_statistics, write_derived};
use crate::products::{Geometry, Product, SurfaceCoefficients, SurfaceProperties};
use std::sync::Arc;

fn surface_requirements(unit: &Unit) -> Vec<Requirement> {
    vec![
        Requirement::new(Product::Statistics, unit),
        Requirement::new(Product::Geometry, unit),
    ]
}

/// Reflectance and scattering coefficients of the surface, per window.
pub struct SurfaceCoefficientsStage {
    context: Arc<StageContext>,
}

impl SurfaceCoefficientsStage {
    pub fn new(context: Arc<StageContext>) -> Self {
        Self { context }
    }
}

impl ProcessingStage for SurfaceCoefficientsStage {
    fn name(&self) -> &'static str {
        "surface_coefficients"
    }

    fn requirements(&self, unit: &Unit) -> Result<Vec<Requirement>, SkipReason> {
        Ok(surface_requirements(unit))
    }

    fn execute(&self, unit: &Unit) -> StageResult<StageOutcome> {
        let ctx = &self.context;
        let windows = read_statistics(&ctx.locator, unit)?;
        let geometry = Geometry::read(&ctx.locator.path(&Product::Geometry, unit))?;

        let rows: Vec<SurfaceCoefficients> = windows
            .iter()
            .map(|w| {
                let h0 = geometry.at(w.center).surface_range;
                ctx.models
                    .surface
                    .coefficients(w.coherent_power, w.diffuse_power, h0)
            })
            .collect();

        let product = write_derived(&ctx.locator, unit, &rows)?;
        Ok(StageOutcome::Completed {
            product,
            rows: rows.len(),
        })
    }
}

/// Permittivity and RMS height of the surface, per window.
pub struct SurfacePropertiesStage {
    context: Arc<StageContext>,
}

impl SurfacePropertiesStage {
    pub fn new(context: Arc<StageContext>) -> Self {
        Self { context }
    }
}

impl ProcessingStage for SurfacePropertiesStage {
    fn name(&self) -> &'static str {
        "surface_properties"
    }

    fn requirements(&self, unit: &Unit) -> Result<Vec<Requirement>, SkipReason> {
        Ok(surface_requirements(unit))
    }

    fn execute(&self, unit: &Unit) -> StageResult<StageOutcome> {
        let ctx = &self.context;
        let windows = read_statistics(&ctx.locator, unit)?;
        let geometry = Geometry::read(&ctx.locator.path(&Product::Geometry, unit))?;
        // roughness must stay well below the wavelength
        let max_height = 0.05 * ctx.config.wavelength_m();

        let rows: Vec<SurfaceProperties> = windows
            .iter()
            .map(|w| {
                let loss = geometric_loss_db(geometry.at(w.center).surface_range);
                let props = ctx
                    .models
                    .properties
                    .invert(w.coherent_power - loss, w.diffuse_power - loss);
                SurfaceProperties {
                    sh: props.sh,
                    eps: props.eps,
                    flag: if max_height > props.sh { 1.0 } else { 0.0 },
                }
            })
            .collect();

        let product = write_derived(&ctx.locator, unit, &rows)?;
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
    use crate::products::records::{read_derived, write_statistics};
    use crate::products::WindowStatistics;
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    fn window(center: f64, pc: f64, pn: f64) -> WindowStatistics {
        WindowStatistics {
            start: center - 20.0,
            center,
            end: center + 20.0,
            total_power: pc,
            coherent_power: pc,
            diffuse_power: pn,
            mixture: 10.0,
            coherence: 0.9,
            goodness: 0.01,
            flag: 1.0,
        }
    }

    #[test]
    fn coefficients_follow_the_record() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path());
        let unit = Unit::new(TRACK, "srf_elg");
        write_geometry(&ctx, 100, 1000.0);
        write_statistics(&ctx.locator, &unit, &[window(20.0, 1.0, 0.0), window(200.0, 1.0, 0.0)]).unwrap();

        let stage = SurfaceCoefficientsStage::new(ctx.clone());
        run_stage(&stage, &ctx.locator, &unit).unwrap();
        let rows: Vec<SurfaceCoefficients> = read_derived(&ctx.locator, &unit).unwrap();
        assert_eq!(rows.len(), 2);
        assert_relative_eq!(rows[0].rsc, 67.020_599_9, epsilon = 1e-6);
        assert_relative_eq!(rows[0].rsn, 83.013_305_5, epsilon = 1e-6);
        // window beyond the geometry
        assert!(rows[1].rsc.is_nan());
    }

    #[test]
    fn smooth_surface_is_flagged_valid() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path());
        let unit = Unit::new(TRACK, "srf_elg");
        write_geometry(&ctx, 100, 1000.0);
        let loss = geometric_loss_db(1000.0);
        let r: f64 = (3.15f64.sqrt() - 1.0) / (3.15f64.sqrt() + 1.0);
        let pc = 10.0 * (r * r).log10() + loss;
        write_statistics(&ctx.locator, &unit, &[window(50.0, pc, pc - 30.0)]).unwrap();

        let stage = SurfacePropertiesStage::new(ctx.clone());
        let outcome = run_stage(&stage, &ctx.locator, &unit).unwrap();
        assert!(outcome.is_completed());
        let rows: Vec<SurfaceProperties> = read_derived(&ctx.locator, &unit).unwrap();
        assert_relative_eq!(rows[0].eps, 3.15, max_relative = 0.01);
        assert!(rows[0].sh > 0.0);
        assert_eq!(rows[0].flag, 1.0);
    }
}
