//! Season-wide table of every window with its derived products.

use crate::prelude::{StageError, StageResult, Unit};
use crate::products::records::{read_derived_if_present, read_statistics};
use crate::products::table::{format_value, write_delimited};
use crate::products::{
    Bathymetry, BedCoefficients, Geometry, GeometrySample, Product, ProductLocator,
    SurfaceCoefficients, SurfaceProperties,
};
use csv::ReaderBuilder;
use log::{info, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One window of one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    pub track: String,
    pub pick: String,
    pub xo: f64,
    pub crl: f64,
    pub longitude: f64,
    pub latitude: f64,
    pub heading: f64,
    pub roll: f64,
    pub surface_range: f64,
    pub rsc: f64,
    pub rsn: f64,
    pub sh: f64,
    pub eps: f64,
    /// Record flag times surface-properties flag.
    pub flag: f64,
    pub rbc: f64,
    pub rbn: f64,
    pub depth: f64,
    pub depth_uncertainty: f64,
}

impl AggregateRow {
    pub const COLUMNS: [&'static str; 18] = [
        "track",
        "pick",
        "xo",
        "crl",
        "longitude",
        "latitude",
        "heading",
        "roll",
        "surface_range",
        "Rsc",
        "Rsn",
        "sh",
        "eps",
        "flag",
        "Rbc",
        "Rbn",
        "depth",
        "depth_uncertainty",
    ];

    fn record(&self) -> Vec<String> {
        let numbers = [
            self.xo,
            self.crl,
            self.longitude,
            self.latitude,
            self.heading,
            self.roll,
            self.surface_range,
            self.rsc,
            self.rsn,
            self.sh,
            self.eps,
            self.flag,
            self.rbc,
            self.rbn,
            self.depth,
            self.depth_uncertainty,
        ];
        let mut record = vec![self.track.clone(), self.pick.clone()];
        record.extend(numbers.into_iter().map(format_value));
        record
    }

    /// Finite position and surface values, level flight and a valid fit.
    pub fn is_good(&self) -> bool {
        let core = [
            self.xo,
            self.longitude,
            self.latitude,
            self.surface_range,
            self.rsc,
            self.rsn,
            self.sh,
            self.eps,
        ];
        core.iter().all(|v| v.is_finite()) && self.roll.abs() < 2.0 && self.flag == 1.0
    }
}

/// Appends unit rows to a CSV table with a header row.
///
/// Every append reads the whole table, aligns columns by header name and
/// rewrites it. Re-running a unit appends its rows again.
pub struct Aggregator {
    locator: ProductLocator,
    output: PathBuf,
    remove_bad: bool,
    lock: Mutex<()>,
}

impl Aggregator {
    pub fn new(locator: ProductLocator, output: impl Into<PathBuf>) -> Self {
        Self {
            locator,
            output: output.into(),
            remove_bad: false,
            lock: Mutex::new(()),
        }
    }

    pub fn with_remove_bad(mut self, remove_bad: bool) -> Self {
        self.remove_bad = remove_bad;
        self
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Rows of `unit`, `None` when it has no statistics record.
    pub fn rows(&self, unit: &Unit) -> StageResult<Option<Vec<AggregateRow>>> {
        if !self.locator.exists(&Product::Statistics, unit) {
            return Ok(None);
        }
        let windows = read_statistics(&self.locator, unit)?;
        let geometry = if self.locator.exists(&Product::Geometry, unit) {
            Geometry::read(&self.locator.path(&Product::Geometry, unit))?
        } else {
            Geometry::default()
        };
        let coefficients = read_derived_if_present::<SurfaceCoefficients>(&self.locator, unit)?;
        let properties = read_derived_if_present::<SurfaceProperties>(&self.locator, unit)?;
        let bed = read_derived_if_present::<BedCoefficients>(&self.locator, unit)?;
        let depth = read_derived_if_present::<Bathymetry>(&self.locator, unit)?;

        let rows = windows
            .iter()
            .enumerate()
            .map(|(idx, w)| {
                let at: GeometrySample = geometry.at(w.center);
                let coeff = coefficients.as_ref().and_then(|rows| rows.get(idx));
                let props = properties.as_ref().and_then(|rows| rows.get(idx));
                let bed = bed.as_ref().and_then(|rows| rows.get(idx));
                let depth = depth.as_ref().and_then(|rows| rows.get(idx));
                AggregateRow {
                    track: unit.track.to_string(),
                    pick: unit.pick.clone(),
                    xo: w.center_index().map_or(f64::NAN, |xo| xo as f64),
                    crl: w.coherence,
                    longitude: at.longitude,
                    latitude: at.latitude,
                    heading: at.heading,
                    roll: at.roll,
                    surface_range: at.surface_range,
                    rsc: coeff.map_or(f64::NAN, |c| c.rsc),
                    rsn: coeff.map_or(f64::NAN, |c| c.rsn),
                    sh: props.map_or(f64::NAN, |p| p.sh),
                    eps: props.map_or(f64::NAN, |p| p.eps),
                    flag: props.map_or(f64::NAN, |p| w.flag * p.flag),
                    rbc: bed.map_or(f64::NAN, |b| b.rbc),
                    rbn: bed.map_or(f64::NAN, |b| b.rbn),
                    depth: depth.map_or(f64::NAN, |d| d.depth),
                    depth_uncertainty: depth.map_or(f64::NAN, |d| d.uncertainty),
                }
            })
            .collect();
        Ok(Some(rows))
    }

    /// Appends `rows` to the output table; returns how many were written.
    pub fn append(&self, rows: &[AggregateRow]) -> StageResult<usize> {
        let kept: Vec<&AggregateRow> = rows
            .iter()
            .filter(|row| !self.remove_bad || row.is_good())
            .collect();

        let _guard = self
            .lock
            .lock()
            .map_err(|_| StageError::Internal("aggregate lock poisoned".into()))?;

        let (mut header, mut existing) = self.read_existing()?;
        for column in AggregateRow::COLUMNS {
            if !header.iter().any(|name| name == column) {
                header.push(column.to_string());
            }
        }
        for record in existing.iter_mut() {
            record.resize(header.len(), "nan".to_string());
        }

        let positions: Vec<usize> = AggregateRow::COLUMNS
            .iter()
            .filter_map(|column| header.iter().position(|name| name == column))
            .collect();
        let appended = kept.iter().map(|row| {
            let mut record = vec!["nan".to_string(); header.len()];
            for (value, &pos) in row.record().into_iter().zip(&positions) {
                record[pos] = value;
            }
            record
        });

        let records: Vec<Vec<String>> = existing.into_iter().chain(appended).collect();
        write_delimited(&self.output, b',', Some(header.as_slice()), records)?;
        Ok(kept.len())
    }

    /// Rows of all `units` computed in parallel, appended in unit order.
    pub fn aggregate(&self, units: &[Unit]) -> StageResult<usize> {
        let per_unit: Vec<StageResult<Option<Vec<AggregateRow>>>> =
            units.par_iter().map(|unit| self.rows(unit)).collect();

        let mut written = 0;
        for (unit, rows) in units.iter().zip(per_unit) {
            match rows {
                Ok(Some(rows)) => {
                    written += self.append(&rows)?;
                    info!("Gathered {} rows from {}", rows.len(), unit);
                }
                Ok(None) => {}
                Err(err) => warn!("cannot gather {}: {}", unit, err),
            }
        }
        Ok(written)
    }

    fn read_existing(&self) -> StageResult<(Vec<String>, Vec<Vec<String>>)> {
        if !self.output.is_file() {
            return Ok((Vec::new(), Vec::new()));
        }
        let path = self.output.as_path();
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(|err| StageError::csv(path, err))?;
        let header: Vec<String> = reader
            .headers()
            .map_err(|err| StageError::csv(path, err))?
            .iter()
            .map(str::to_string)
            .collect();
        let mut records = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|err| StageError::csv(path, err))?;
            records.push(record.iter().map(str::to_string).collect());
        }
        Ok((header, records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::products::records::{write_derived, write_statistics};
    use crate::products::{ProductPaths, WindowStatistics};
    use std::fs;
    use tempfile::TempDir;

    fn window(center: f64) -> WindowStatistics {
        WindowStatistics {
            start: center - 10.0,
            center,
            end: center + 10.0,
            total_power: -60.0,
            coherent_power: -61.0,
            diffuse_power: -70.0,
            mixture: 5.0,
            coherence: 0.8,
            goodness: 0.02,
            flag: 1.0,
        }
    }

    fn seeded(root: &Path) -> (ProductLocator, Unit) {
        let locator = ProductLocator::new(ProductPaths::under(root), "pik1.1m", "MagHiResInco1");
        let unit = Unit::new("MIS/JKB2e/Y35a", "srf_elg");
        write_statistics(&locator, &unit, &[window(10.0), window(20.0)]).unwrap();
        let sample = GeometrySample {
            longitude: 166.4,
            latitude: -77.9,
            heading: 12.0,
            roll: 0.4,
            surface_range: 950.0,
        };
        Geometry::from_samples(vec![sample; 30])
            .write(&locator.path(&Product::Geometry, &unit))
            .unwrap();
        (locator, unit)
    }

    fn line_count(path: &Path) -> usize {
        fs::read_to_string(path).unwrap().lines().count()
    }

    #[test]
    fn rerun_appends_duplicate_rows() {
        let temp = TempDir::new().unwrap();
        let (locator, unit) = seeded(temp.path());
        let output = temp.path().join("season_gather.csv");
        let aggregator = Aggregator::new(locator, &output);

        assert_eq!(aggregator.aggregate(&[unit.clone()]).unwrap(), 2);
        assert_eq!(line_count(&output), 3);
        aggregator.aggregate(&[unit]).unwrap();
        assert_eq!(line_count(&output), 5);
    }

    #[test]
    fn missing_products_are_nan_and_missing_records_are_skipped() {
        let temp = TempDir::new().unwrap();
        let (locator, unit) = seeded(temp.path());
        write_derived(
            &locator,
            &unit,
            &[SurfaceProperties {
                sh: 0.01,
                eps: 3.1,
                flag: 1.0,
            }],
        )
        .unwrap();
        let aggregator = Aggregator::new(locator, temp.path().join("out.csv"));

        let rows = aggregator.rows(&unit).unwrap().unwrap();
        assert_eq!(rows[0].xo, 10.0);
        assert_eq!(rows[0].surface_range, 950.0);
        assert_eq!(rows[0].flag, 1.0);
        assert!(rows[0].rsc.is_nan());
        // properties shorter than the record
        assert!(rows[1].eps.is_nan());
        assert!(aggregator.rows(&unit.with_pick("bed_elg")).unwrap().is_none());
    }

    #[test]
    fn columns_are_aligned_by_name() {
        let temp = TempDir::new().unwrap();
        let (locator, unit) = seeded(temp.path());
        let output = temp.path().join("out.csv");
        fs::write(&output, "pick,legacy,track\nsrf_old,7,A/B/C\n").unwrap();

        Aggregator::new(locator, &output).aggregate(&[unit]).unwrap();

        let mut reader = csv::Reader::from_path(&output).unwrap();
        let header: Vec<String> = reader.headers().unwrap().iter().map(str::to_string).collect();
        assert_eq!(&header[..3], &["pick", "legacy", "track"]);
        assert_eq!(header.len(), 1 + AggregateRow::COLUMNS.len());
        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 3);
        assert_eq!(&records[0][1], "7");
        assert_eq!(&records[0][3], "nan");
        assert_eq!(&records[1][0], "srf_elg");
        assert_eq!(&records[1][1], "nan");
        assert_eq!(&records[1][2], "MIS/JKB2e/Y35a");
    }

    #[test]
    fn remove_bad_keeps_only_valid_rows() {
        let temp = TempDir::new().unwrap();
        let (locator, unit) = seeded(temp.path());
        write_derived(
            &locator,
            &unit,
            &[
                SurfaceCoefficients { rsc: -12.0, rsn: -25.0 },
                SurfaceCoefficients { rsc: -12.0, rsn: -25.0 },
            ],
        )
        .unwrap();
        write_derived(
            &locator,
            &unit,
            &[
                SurfaceProperties { sh: 0.01, eps: 3.1, flag: 1.0 },
                SurfaceProperties { sh: 0.9, eps: 3.1, flag: 0.0 },
            ],
        )
        .unwrap();
        let output = temp.path().join("out.csv");
        let aggregator = Aggregator::new(locator, &output).with_remove_bad(true);

        assert_eq!(aggregator.aggregate(&[unit]).unwrap(), 1);
        assert_eq!(line_count(&output), 2);
    }
}
