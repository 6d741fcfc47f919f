//! Identifiers and rotation constraints shared by the nesting pipeline.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of a polygon instance, unique within a run.
pub type PolygonId = usize;

/// Identifier of a logical part, shared by all clones and rotations of it.
pub type Source = usize;

/// Identifier of a sheet instance, unique within a run.
pub type SheetId = usize;

/// Allowed rotation angles for a part, in degrees.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RotationConstraint {
    /// Use the configured number of evenly spaced rotations.
    #[default]
    FromConfig,
    /// No rotation allowed (fixed orientation).
    None,
    /// Explicit list of angles in degrees.
    Discrete(Vec<f64>),
}

impl RotationConstraint {
    /// Creates a constraint for n evenly-spaced rotations.
    pub fn steps(n: usize) -> Self {
        if n <= 1 {
            return Self::None;
        }
        Self::Discrete(evenly_spaced(n))
    }

    /// Returns true if no rotation is allowed.
    pub fn is_fixed(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Returns the list of allowed angles, resolving [`RotationConstraint::FromConfig`]
    /// with `config_steps`. Never empty.
    pub fn angles(&self, config_steps: usize) -> Vec<f64> {
        let angles = match self {
            Self::FromConfig => evenly_spaced(config_steps.max(1)),
            Self::None => vec![0.0],
            Self::Discrete(angles) => angles.iter().map(|&a| normalize_angle(a)).collect(),
        };
        if angles.is_empty() {
            vec![0.0]
        } else {
            angles
        }
    }
}

fn evenly_spaced(n: usize) -> Vec<f64> {
    let step = 360.0 / n as f64;
    (0..n).map(|i| i as f64 * step).collect()
}

/// Normalizes an angle in degrees into `[0, 360)`.
pub fn normalize_angle(degrees: f64) -> f64 {
    let a = degrees % 360.0;
    if a < 0.0 {
        a + 360.0
    } else {
        a
    }
}

/// Integer key for an angle, in millidegrees, normalized into `[0, 360000)`.
pub fn angle_key(degrees: f64) -> i32 {
    let key = (normalize_angle(degrees) * 1000.0).round() as i32;
    if key >= 360_000 {
        key - 360_000
    } else {
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_steps() {
        assert_eq!(RotationConstraint::steps(4).angles(1), vec![0.0, 90.0, 180.0, 270.0]);
        assert!(RotationConstraint::steps(1).is_fixed());
        assert!(RotationConstraint::steps(0).is_fixed());
    }

    #[test]
    fn test_from_config_uses_steps() {
        let angles = RotationConstraint::FromConfig.angles(8);
        assert_eq!(angles.len(), 8);
        assert_relative_eq!(angles[1], 45.0);
        assert_eq!(RotationConstraint::FromConfig.angles(0), vec![0.0]);
    }

    #[test]
    fn test_discrete_normalized() {
        let c = RotationConstraint::Discrete(vec![-90.0, 450.0]);
        assert_eq!(c.angles(4), vec![270.0, 90.0]);
        assert_eq!(RotationConstraint::Discrete(vec![]).angles(4), vec![0.0]);
    }

    #[test]
    fn test_angle_key() {
        assert_eq!(angle_key(0.0), 0);
        assert_eq!(angle_key(360.0), 0);
        assert_eq!(angle_key(-90.0), 270_000);
        assert_eq!(angle_key(359.9999999), 0);
        assert_eq!(angle_key(90.0004), 90_000);
    }
}
