use crate::prelude::{StageResult, Unit};
use crate::products::locator::{DerivedStage, Product, ProductLocator};
use crate::products::table::{read_rows, write_rows, TableRow};
use std::path::PathBuf;

/// Fit result of one along-track window. Row order is spatial order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStatistics {
    pub start: f64,
    pub center: f64,
    pub end: f64,
    /// Total, coherent and diffuse received power, in dB.
    pub total_power: f64,
    pub coherent_power: f64,
    pub diffuse_power: f64,
    pub mixture: f64,
    pub coherence: f64,
    pub goodness: f64,
    /// 1 valid, 0 invalid, NaN when the file predates the flag column.
    pub flag: f64,
}

impl WindowStatistics {
    pub fn center_index(&self) -> Option<usize> {
        floor_index(self.center)
    }

    pub fn start_index(&self) -> Option<usize> {
        floor_index(self.start)
    }
}

/// Floor-truncates a positional float into a sample index.
pub fn floor_index(position: f64) -> Option<usize> {
    if position.is_finite() && position >= 0.0 {
        Some(position.floor() as usize)
    } else {
        None
    }
}

impl TableRow for WindowStatistics {
    const COLUMNS: &'static [&'static str] = &[
        "xa", "xo", "xb", "pt", "pc", "pn", "mu", "crl", "chisqr", "flag",
    ];
    const OPTIONAL_TRAILING: usize = 1;

    fn to_fields(&self) -> Vec<f64> {
        vec![
            self.start,
            self.center,
            self.end,
            self.total_power,
            self.coherent_power,
            self.diffuse_power,
            self.mixture,
            self.coherence,
            self.goodness,
            self.flag,
        ]
    }

    fn from_fields(f: &[f64]) -> Self {
        Self {
            start: f[0],
            center: f[1],
            end: f[2],
            total_power: f[3],
            coherent_power: f[4],
            diffuse_power: f[5],
            mixture: f[6],
            coherence: f[7],
            goodness: f[8],
            flag: f[9],
        }
    }
}

/// A row type persisted as one derived product.
pub trait DerivedRow: TableRow {
    const STAGE: DerivedStage;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceCoefficients {
    /// Coherent (specular) reflectance, dB.
    pub rsc: f64,
    /// Diffuse scattering coefficient, dB.
    pub rsn: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceProperties {
    /// RMS roughness height, m.
    pub sh: f64,
    pub eps: f64,
    /// 1 when the small-perturbation assumption holds for `sh`.
    pub flag: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BedCoefficients {
    pub rbc: f64,
    pub rbn: f64,
}

impl BedCoefficients {
    pub const MISSING: BedCoefficients = BedCoefficients {
        rbc: f64::NAN,
        rbn: f64::NAN,
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bathymetry {
    pub depth: f64,
    pub uncertainty: f64,
    pub density_at_depth: f64,
    pub delay: f64,
}

macro_rules! derived_row {
    ($row:ty, $stage:expr, [$($field:ident => $column:literal),+ $(,)?]) => {
        impl TableRow for $row {
            const COLUMNS: &'static [&'static str] = &[$($column),+];

            fn to_fields(&self) -> Vec<f64> {
                vec![$(self.$field),+]
            }

            fn from_fields(fields: &[f64]) -> Self {
                let mut values = fields.iter().copied();
                Self {
                    $($field: values.next().unwrap_or(f64::NAN)),+
                }
            }
        }

        impl DerivedRow for $row {
            const STAGE: DerivedStage = $stage;
        }
    };
}

derived_row!(SurfaceCoefficients, DerivedStage::SurfaceCoefficients, [
    rsc => "0_Rsc",
    rsn => "1_Rsn",
]);
derived_row!(SurfaceProperties, DerivedStage::SurfaceProperties, [
    sh => "0_sh",
    eps => "1_eps",
    flag => "2_flag",
]);
derived_row!(BedCoefficients, DerivedStage::BedCoefficients, [
    rbc => "0_Rbc",
    rbn => "1_Rbn",
]);
derived_row!(Bathymetry, DerivedStage::Bathymetry, [
    depth => "0_depth",
    uncertainty => "1_uncertainty",
    density_at_depth => "2_dns_at_depth",
    delay => "3_delay",
]);

pub fn read_statistics(locator: &ProductLocator, unit: &Unit) -> StageResult<Vec<WindowStatistics>> {
    read_rows(&locator.path(&Product::Statistics, unit))
}

pub fn write_statistics(
    locator: &ProductLocator,
    unit: &Unit,
    rows: &[WindowStatistics],
) -> StageResult<PathBuf> {
    let path = locator.path(&Product::Statistics, unit);
    write_rows(&path, rows)?;
    Ok(path)
}

pub fn read_derived<T: DerivedRow>(locator: &ProductLocator, unit: &Unit) -> StageResult<Vec<T>> {
    read_rows(&locator.path(&Product::Derived(T::STAGE), unit))
}

/// `None` when the product has not been produced for `unit`.
pub fn read_derived_if_present<T: DerivedRow>(
    locator: &ProductLocator,
    unit: &Unit,
) -> StageResult<Option<Vec<T>>> {
    if locator.exists(&Product::Derived(T::STAGE), unit) {
        read_derived(locator, unit).map(Some)
    } else {
        Ok(None)
    }
}

pub fn write_derived<T: DerivedRow>(
    locator: &ProductLocator,
    unit: &Unit,
    rows: &[T],
) -> StageResult<PathBuf> {
    let path = locator.path(&Product::Derived(T::STAGE), unit);
    write_rows(&path, rows)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::products::locator::ProductPaths;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn nine_column_records_read_with_nan_flag() {
        let temp = TempDir::new().unwrap();
        let loc = ProductLocator::new(ProductPaths::under(temp.path()), "p", "Mag");
        let unit = Unit::new("T/1", "srf");
        let path = loc.path(&Product::Statistics, &unit);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "0\t500\t1000\t-10\t-11\t-30\t5\t0.9\t0.01\n").unwrap();

        let rows = read_statistics(&loc, &unit).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].center_index(), Some(500));
        assert_eq!(rows[0].coherent_power, -11.0);
        assert!(rows[0].flag.is_nan());
    }

    #[test]
    fn derived_products_land_next_to_the_record() {
        let temp = TempDir::new().unwrap();
        let loc = ProductLocator::new(ProductPaths::under(temp.path()), "p", "Mag");
        let unit = Unit::new("T/1", "srf");
        assert!(read_derived_if_present::<SurfaceProperties>(&loc, &unit)
            .unwrap()
            .is_none());

        let rows = [SurfaceProperties {
            sh: 0.035,
            eps: 3.149,
            flag: 1.0,
        }];
        let path = write_derived(&loc, &unit, &rows).unwrap();
        assert!(path.ends_with("Mag.srf.surface_properties"));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "0.0350000\t3.1490000\t1.0000000\n"
        );
        let back: Vec<SurfaceProperties> = read_derived(&loc, &unit).unwrap();
        assert_eq!(back, rows.to_vec());
    }

    #[test]
    fn floor_index_truncates_and_rejects_invalid_positions() {
        assert_eq!(floor_index(12.9), Some(12));
        assert_eq!(floor_index(-1.0), None);
        assert_eq!(floor_index(f64::NAN), None);
    }
}
