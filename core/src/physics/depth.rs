//! Depth of a subsurface reflector below a firn column.
//!
//! The surface permittivity fixes the surface density, from which two
//! Sorge profiles are built, one per transition depth. Each profile gives a
//! cumulative two-way travel time with depth; the first grid depth whose
//! time reaches the measured delay is that profile's answer. The estimate is
//! the midpoint of the two answers, and its uncertainty is half their spread
//! plus half the range resolution in the surface firn.

use crate::physics::firn::{dns2eps, eps2dns, sorge_profile};
use crate::physics::SPEED_OF_LIGHT;
use crate::prelude::{StageConfig, StageError, StageResult};
use ndarray::Array1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthEstimate {
    pub depth: f64,
    pub uncertainty: f64,
    /// Mean density of both profiles at their crossing depths.
    pub density_at_depth: f64,
}

impl DepthEstimate {
    /// Delay not reached within the depth grid.
    pub const UNRESOLVED: DepthEstimate = DepthEstimate {
        depth: f64::NAN,
        uncertainty: f64::NAN,
        density_at_depth: f64::NAN,
    };

    pub fn is_resolved(&self) -> bool {
        !self.depth.is_nan()
    }
}

#[derive(Debug, Clone)]
pub struct DepthInversion {
    grid: Array1<f64>,
    transitions: (f64, f64),
    bandwidth_hz: f64,
}

impl Default for DepthInversion {
    fn default() -> Self {
        Self {
            grid: Array1::range(0.0, 5000.5, 1.0),
            transitions: (19.0, 129.0),
            bandwidth_hz: 15e6,
        }
    }
}

/// Ascending depths from 0 to `max` inclusive.
pub fn depth_grid(max: f64, step: f64) -> StageResult<Array1<f64>> {
    if !(step.is_finite() && step > 0.0) {
        return Err(StageError::InvalidInput(format!(
            "depth grid step must be positive, got {step}"
        )));
    }
    if !(max.is_finite() && max >= 0.0) {
        return Err(StageError::InvalidInput(format!(
            "depth grid maximum must be non-negative, got {max}"
        )));
    }
    Ok(Array1::range(0.0, max + step / 2.0, step))
}

impl DepthInversion {
    pub fn from_config(config: &StageConfig) -> StageResult<Self> {
        Ok(Self {
            grid: depth_grid(config.depth_grid_max_m, config.depth_grid_step_m)?,
            transitions: config.transition_depths_m,
            bandwidth_hz: config.bandwidth_hz,
        })
    }

    pub fn with_grid(mut self, grid: Array1<f64>) -> Self {
        self.grid = grid;
        self
    }

    /// Inverts a two-way `delay` (s) below a surface of permittivity `eps`.
    ///
    /// Non-finite inputs are read as 0.
    pub fn invert(&self, eps: f64, delay: f64) -> DepthEstimate {
        let eps = if eps.is_finite() { eps } else { 0.0 };
        let delay = if delay.is_finite() { delay } else { 0.0 };
        let surface_density = eps2dns(eps);

        let (shallow, deep) = self.transitions;
        let (Some((depth_a, density_a)), Some((depth_b, density_b))) = (
            self.crossing(surface_density, shallow, delay),
            self.crossing(surface_density, deep, delay),
        ) else {
            return DepthEstimate::UNRESOLVED;
        };

        let half_spread = (depth_a - depth_b).abs() / 2.0;
        let resolution = if eps > 0.0 {
            SPEED_OF_LIGHT / (2.0 * self.bandwidth_hz * eps.sqrt())
        } else {
            f64::INFINITY
        };

        DepthEstimate {
            depth: depth_a.min(depth_b) + half_spread,
            uncertainty: half_spread + resolution / 2.0,
            density_at_depth: (density_a + density_b) / 2.0,
        }
    }

    /// First grid depth whose two-way time reaches `delay`, with its density.
    fn crossing(&self, surface_density: f64, transition: f64, delay: f64) -> Option<(f64, f64)> {
        let density = sorge_profile(surface_density, &self.grid, transition);
        let times = self.travel_times(&density);
        let idx = times.partition_point(|&t| t < delay);
        if idx < self.grid.len() {
            Some((self.grid[idx], density[idx]))
        } else {
            None
        }
    }

    /// Running two-way time down the grid. Every depth, the surface
    /// included, contributes one grid step of travel.
    fn travel_times(&self, density: &Array1<f64>) -> Vec<f64> {
        let mut times = Vec::with_capacity(self.grid.len());
        let mut elapsed = 0.0;
        for (idx, &rho) in density.iter().enumerate() {
            elapsed += 2.0 * dns2eps(rho).sqrt() * self.spacing(idx) / SPEED_OF_LIGHT;
            times.push(elapsed);
        }
        times
    }

    /// Step leading into grid point `idx`; the surface takes the first step.
    fn spacing(&self, idx: usize) -> f64 {
        match idx {
            0 if self.grid.len() > 1 => self.grid[1] - self.grid[0],
            0 => 1.0,
            _ => self.grid[idx] - self.grid[idx - 1],
        }
    }
}
