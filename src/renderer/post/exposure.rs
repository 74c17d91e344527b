//! Auto-exposure adaptation.
//!
//! The controller is a first-order low-pass filter toward
//! `key_value / clamp(L, min_luminance, max_luminance)`:
//!
//! ```text
//! e' = e + (target - e) * (1 - exp(-adaptation_speed * dt))
//! ```
//!
//! The blend factor stays in `[0, 1)` for any non-negative `dt`, so under a
//! constant reading the exposure approaches the target monotonically and
//! never crosses it.

use crate::resources::HdrSettings;

/// Exposure that maps luminance `luminance` to the key value.
#[must_use]
pub fn target_exposure(settings: &HdrSettings, luminance: f32) -> f32 {
    let clamped = luminance.clamp(settings.min_luminance(), settings.max_luminance());
    settings.key_value() / clamped
}

/// Fraction of the remaining distance covered in `dt` seconds.
#[must_use]
pub fn blend_factor(adaptation_speed: f32, dt: f32) -> f32 {
    let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
    1.0 - (-adaptation_speed * dt).exp()
}

/// Next exposure after one frame of `dt` seconds with reading `luminance`.
///
/// Returns `None`, leaving exposure untouched, when the reading is not a
/// finite positive number.
#[must_use]
pub fn adapt(settings: &HdrSettings, luminance: f32, dt: f32) -> Option<f32> {
    if !(luminance.is_finite() && luminance > 0.0) {
        return None;
    }
    let current = settings.exposure();
    let target = target_exposure(settings, luminance);
    Some(current + (target - current) * blend_factor(settings.adaptation_speed(), dt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_clamps_the_reading() {
        let mut hdr = HdrSettings::default();
        hdr.set_key_value(0.2);
        hdr.set_luminance_range(0.1, 2.0);
        assert!((target_exposure(&hdr, 100.0) - 0.1).abs() < 1e-6);
        assert!((target_exposure(&hdr, 0.001) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn zero_time_step_does_not_move() {
        let hdr = HdrSettings::default();
        assert_eq!(adapt(&hdr, 0.5, 0.0), Some(hdr.exposure()));
    }

    #[test]
    fn invalid_readings_are_rejected() {
        let hdr = HdrSettings::default();
        assert_eq!(adapt(&hdr, 0.0, 0.016), None);
        assert_eq!(adapt(&hdr, f32::NAN, 0.016), None);
        assert_eq!(adapt(&hdr, -1.0, 0.016), None);
    }
}
