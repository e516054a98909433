//! Firn density and permittivity relations.

use ndarray::Array1;

/// Density of solid ice, kg/m^3.
pub const ICE_DENSITY: f64 = 917.0;

/// Kovacs mixing coefficient, m^3/kg.
const KOVACS: f64 = 845e-6;

/// Sorge's law decay constant.
const SORGE_DECAY: f64 = 1.9;

/// Real permittivity of firn at `density` (kg/m^3).
pub fn dns2eps(density: f64) -> f64 {
    (1.0 + KOVACS * density).powi(2)
}

/// Density of firn with real permittivity `eps`.
pub fn eps2dns(eps: f64) -> f64 {
    (eps.sqrt() - 1.0) / KOVACS
}

/// Sorge's law density at each depth, starting from `surface_density`
/// and relaxing to ice density over `transition_depth`.
pub fn sorge_profile(surface_density: f64, depths: &Array1<f64>, transition_depth: f64) -> Array1<f64> {
    depths.mapv(|z| {
        ICE_DENSITY - (ICE_DENSITY - surface_density) * (-SORGE_DECAY * z / transition_depth).exp()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn density_permittivity_round_trip() {
        for density in [50.0, 350.0, 600.0, ICE_DENSITY] {
            assert_relative_eq!(eps2dns(dns2eps(density)), density, max_relative = 1e-12);
        }
        for eps in [1.0, 1.8, 3.15] {
            assert_relative_eq!(dns2eps(eps2dns(eps)), eps, max_relative = 1e-12);
        }
    }

    #[test]
    fn ice_permittivity_maps_near_ice_density() {
        assert_relative_eq!(eps2dns(3.15), 916.951_402_283_9, epsilon = 1e-6);
    }

    #[test]
    fn profile_relaxes_towards_ice() {
        let depths = Array1::from(vec![0.0, 10.0, 100.0, 1000.0]);
        let profile = sorge_profile(400.0, &depths, 19.0);
        assert_relative_eq!(profile[0], 400.0, epsilon = 1e-12);
        assert!(profile.windows(2).into_iter().all(|w| w[1] > w[0]));
        assert_relative_eq!(profile[3], ICE_DENSITY, epsilon = 1e-6);
    }
}
