use crate::prelude::StageResult;
use crate::products::records::floor_index;
use crate::products::table::{read_rows, write_rows, TableRow};
use std::path::Path;

/// Aircraft state at one along-track sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometrySample {
    pub longitude: f64,
    pub latitude: f64,
    pub heading: f64,
    /// Aircraft roll, degrees.
    pub roll: f64,
    /// Range from the antenna to the surface reflector, m.
    pub surface_range: f64,
}

impl GeometrySample {
    pub const MISSING: GeometrySample = GeometrySample {
        longitude: f64::NAN,
        latitude: f64::NAN,
        heading: f64::NAN,
        roll: f64::NAN,
        surface_range: f64::NAN,
    };
}

impl TableRow for GeometrySample {
    const COLUMNS: &'static [&'static str] =
        &["longitude", "latitude", "heading", "roll", "surface_range"];

    fn to_fields(&self) -> Vec<f64> {
        vec![
            self.longitude,
            self.latitude,
            self.heading,
            self.roll,
            self.surface_range,
        ]
    }

    fn from_fields(f: &[f64]) -> Self {
        Self {
            longitude: f[0],
            latitude: f[1],
            heading: f[2],
            roll: f[3],
            surface_range: f[4],
        }
    }
}

/// Per-sample geometry of one track, on the same along-track grid as the picks.
#[derive(Debug, Clone, Default)]
pub struct Geometry {
    samples: Vec<GeometrySample>,
}

impl Geometry {
    pub fn read(path: &Path) -> StageResult<Self> {
        Ok(Self {
            samples: read_rows(path)?,
        })
    }

    pub fn write(&self, path: &Path) -> StageResult<()> {
        write_rows(path, &self.samples)
    }

    pub fn from_samples(samples: Vec<GeometrySample>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample at the floor of `position`; all-NaN outside the track.
    pub fn at(&self, position: f64) -> GeometrySample {
        floor_index(position)
            .and_then(|idx| self.samples.get(idx).copied())
            .unwrap_or(GeometrySample::MISSING)
    }

    pub fn surface_range(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.surface_range).collect()
    }
}
