use crate::inversion::BedObservation;
use crate::prelude::{ProcessingStage, Requirement, SkipReason, StageOutcome, StageResult, Unit};
use crate::physics::SPEED_OF_LIGHT;
use crate::processing::runner::StageContext;
use crate::products::records::{read_derived, read_statistics, write_derived};
use crate::products::{
    read_pick, BedCoefficients, DerivedStage, Geometry, Product, SurfaceProperties, WindowStatistics,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Row of each window keyed by its center sample.
pub(crate) fn index_by_center(windows: &[WindowStatistics]) -> BTreeMap<usize, usize> {
    windows
        .iter()
        .enumerate()
        .filter_map(|(row, w)| w.center_index().map(|center| (center, row)))
        .collect()
}

/// Bed reflectance and scattering below a surface pick of the same track.
pub struct BedCoefficientsStage {
    context: Arc<StageContext>,
    surface_pick: Option<String>,
}

impl BedCoefficientsStage {
    pub fn new(context: Arc<StageContext>, surface_pick: Option<String>) -> Self {
        Self {
            context,
            surface_pick,
        }
    }

    fn surface_unit(&self, unit: &Unit) -> Option<Unit> {
        self.context
            .surface_pick(&unit.track, self.surface_pick.as_deref())
            .map(|pick| unit.with_pick(pick))
    }
}

impl ProcessingStage for BedCoefficientsStage {
    fn name(&self) -> &'static str {
        "bed_coefficients"
    }

    fn requirements(&self, unit: &Unit) -> Result<Vec<Requirement>, SkipReason> {
        let surface = self.surface_unit(unit).ok_or(SkipReason::NoSurfacePick)?;
        Ok(vec![
            Requirement::new(Product::Statistics, unit),
            Requirement::new(Product::Statistics, &surface),
            Requirement::new(Product::Derived(DerivedStage::SurfaceProperties), &surface),
            Requirement::new(Product::Pick, unit),
            Requirement::new(Product::Pick, &surface),
            Requirement::new(Product::Geometry, unit),
        ])
    }

    fn execute(&self, unit: &Unit) -> StageResult<StageOutcome> {
        let Some(surface) = self.surface_unit(unit) else {
            return Ok(StageOutcome::Skipped(SkipReason::NoSurfacePick));
        };
        let ctx = &self.context;
        let config = &ctx.config;
        let locator = &ctx.locator;

        let bed_windows = read_statistics(locator, unit)?;
        let surface_windows = read_statistics(locator, &surface)?;
        let properties: Vec<SurfaceProperties> = read_derived(locator, &surface)?;
        let bed_pick = read_pick(&locator.path(&Product::Pick, unit))?;
        let surface_pick = read_pick(&locator.path(&Product::Pick, &surface))?;
        let geometry = Geometry::read(&locator.path(&Product::Geometry, unit))?;

        let n1 = config.ice_permittivity.sqrt();
        let by_center = index_by_center(&surface_windows);

        let rows: Vec<BedCoefficients> = bed_windows
            .iter()
            .map(|bed| {
                let Some(center) = bed.center_index() else {
                    return BedCoefficients::MISSING;
                };
                let Some(&row) = by_center.get(&center) else {
                    return BedCoefficients::MISSING;
                };
                let srf = &surface_windows[row];
                let (sh, surface_eps) = properties
                    .get(row)
                    .map_or((f64::NAN, f64::NAN), |p| (p.sh, p.eps));

                let samples = (bed_pick.delay_at(center) - surface_pick.delay_at(center)).abs();
                let thickness = samples * config.sample_interval_s * SPEED_OF_LIGHT / (2.0 * n1);
                let attenuation = 2.0 * thickness / 1000.0 * config.attenuation_db_per_km;

                ctx.models.bed.coefficients(&BedObservation {
                    surface_coherent: srf.coherent_power,
                    surface_diffuse: srf.diffuse_power,
                    bed_coherent: bed.coherent_power,
                    bed_diffuse: bed.diffuse_power,
                    n1,
                    sh,
                    surface_eps,
                    h0: geometry.at(bed.center).surface_range,
                    h1: thickness,
                    attenuation_db: attenuation,
                })
            })
            .collect();

        let product = write_derived(locator, unit, &rows)?;
        Ok(StageOutcome::Completed {
            product,
            rows: rows.len(),
        })
    }
}
