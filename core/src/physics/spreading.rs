use crate::physics::SPEED_OF_LIGHT;

/// Spherical spreading loss over a two-way range, as a power ratio.
pub fn geometric_loss(two_way_range: f64) -> f64 {
    two_way_range.powi(-2)
}

/// Spreading loss in dB for a specular reflector at one-way `range`.
pub fn geometric_loss_db(range: f64) -> f64 {
    10.0 * geometric_loss(2.0 * range).log10()
}

/// Pulse-limited footprint area over the image-source area, `c / (B h)`.
pub fn footprint_ratio(range: f64, bandwidth_hz: f64) -> f64 {
    SPEED_OF_LIGHT / (bandwidth_hz * range)
}
