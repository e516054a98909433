use crate::prelude::Unit;
use log::info;
use std::time::Instant;

/// Wraps a per-unit operation and logs its wall time.
pub struct Timed<F> {
    label: &'static str,
    operation: F,
}

impl<F, T> Timed<F>
where
    F: Fn(&Unit) -> T,
{
    pub fn new(label: &'static str, operation: F) -> Self {
        Self { label, operation }
    }

    pub fn run(&self, unit: &Unit) -> T {
        let started = Instant::now();
        let output = (self.operation)(unit);
        info!(
            "{} {} processed in {:.1} s",
            self.label,
            unit,
            started.elapsed().as_secs_f64()
        );
        output
    }
}
