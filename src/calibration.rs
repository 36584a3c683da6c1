//! Raw-to-SI conversion policy
//!
//! The measurement step hands each raw sample to a [`CalibrationPolicy`] and
//! stores whatever it returns. Policies are pure functions of the raw axes,
//! the active full-scale range and the stored [`CalibrationScale`], so they can
//! be swapped without touching the sampling path.

use crate::registers::AccelRange;
use crate::report::{CalibrationScale, PhysicalAxes};

/// Strategy that turns raw axes into physical values
pub trait CalibrationPolicy: Send + Sync {
    fn apply(&self, raw: [i16; 3], range: AccelRange, scale: &CalibrationScale) -> PhysicalAxes;
}

impl<F> CalibrationPolicy for F
where
    F: Fn([i16; 3], AccelRange, &CalibrationScale) -> PhysicalAxes + Send + Sync,
{
    fn apply(&self, raw: [i16; 3], range: AccelRange, scale: &CalibrationScale) -> PhysicalAxes {
        self(raw, range, scale)
    }
}

/// Datasheet sensitivity, then static offset, then linear scale
///
/// The offset is what the part outputs at a nominal zero input, so it is
/// subtracted after conversion to m/s^2.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearCalibration;

impl CalibrationPolicy for LinearCalibration {
    fn apply(&self, raw: [i16; 3], range: AccelRange, scale: &CalibrationScale) -> PhysicalAxes {
        let scaling = range.scaling_m_s2();
        let convert = |raw: i16, offset: f32, factor: f32| (raw as f32 * scaling - offset) * factor;

        PhysicalAxes {
            x: convert(raw[0], scale.x_offset, scale.x_scale),
            y: convert(raw[1], scale.y_offset, scale.y_scale),
            z: convert(raw[2], scale.z_offset, scale.z_scale),
            scaling,
            range_m_s2: range.range_m_s2(),
            calibration: *scale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::GRAVITY_M_S2;

    #[test]
    fn test_linear_identity_scale_is_datasheet_conversion() {
        let scale = CalibrationScale::default();
        // 1 g at +/-2 g is ~16393 counts
        let axes = LinearCalibration.apply([0, 0, 16393], AccelRange::G2, &scale);
        assert!(axes.x.abs() < 1e-6);
        assert!((axes.z - GRAVITY_M_S2).abs() < 0.01, "z = {}", axes.z);
        assert!((axes.range_m_s2 - 2.0 * GRAVITY_M_S2).abs() < 1e-4);
        assert_eq!(axes.calibration, scale);
    }

    #[test]
    fn test_linear_applies_offset_before_scale() {
        let scale = CalibrationScale {
            x_offset: 1.0,
            x_scale: 2.0,
            ..Default::default()
        };
        let range = AccelRange::G8;
        let raw = 1000;
        let axes = LinearCalibration.apply([raw, 0, 0], range, &scale);
        let expected = (raw as f32 * range.scaling_m_s2() - 1.0) * 2.0;
        assert!((axes.x - expected).abs() < 1e-5);
        assert!((axes.y - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_closure_is_a_policy() {
        let halve = |raw: [i16; 3], range: AccelRange, scale: &CalibrationScale| PhysicalAxes {
            x: raw[0] as f32 / 2.0,
            y: raw[1] as f32 / 2.0,
            z: raw[2] as f32 / 2.0,
            scaling: 0.5,
            range_m_s2: range.range_m_s2(),
            calibration: *scale,
        };
        let policy: &dyn CalibrationPolicy = &halve;
        let axes = policy.apply([4, -6, 8], AccelRange::G4, &CalibrationScale::default());
        assert_eq!((axes.x, axes.y, axes.z), (2.0, -3.0, 4.0));
    }
}
