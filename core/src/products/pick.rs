use crate::prelude::{StageError, StageResult};
use crate::products::table::parse_value;
use std::fs;
use std::path::Path;

/// Picked interface along a track, one entry per along-track sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PickTrace {
    /// Fast-time sample index of the echo.
    pub delay: Vec<f64>,
    /// Raw echo value in instrument counts.
    pub value: Vec<f64>,
}

impl PickTrace {
    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Fast-time sample index at along-track `index`, NaN outside the trace.
    pub fn delay_at(&self, index: usize) -> f64 {
        self.delay.get(index).copied().unwrap_or(f64::NAN)
    }
}

/// Reads the `P` lines of a pick file; every other line is header chatter.
pub fn read_pick(path: &Path) -> StageResult<PickTrace> {
    let contents = fs::read_to_string(path).map_err(|err| StageError::io(path, err))?;
    let mut trace = PickTrace::default();

    for (idx, line) in contents.lines().enumerate() {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.first().map(|tag| tag.trim()) != Some("P") {
            continue;
        }
        if fields.len() < 4 {
            return Err(StageError::Parse {
                path: path.to_path_buf(),
                line: idx + 1,
                reason: format!("pick sample needs 4 fields, found {}", fields.len()),
            });
        }
        trace
            .delay
            .push(parse_value(fields[2]).unwrap_or(f64::NAN));
        trace
            .value
            .push(parse_value(fields[3]).unwrap_or(f64::NAN));
    }

    Ok(trace)
}
