//! Affordance types, their numeric parameters and the predicates used to detect them.

use std::f64::consts::FRAC_1_SQRT_2;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{AffordError, Result};

/// Standard affordance type names understood by [`Requirement::for_affordance`].
pub const SUPPORT: &str = "Support";
pub const LEAN: &str = "Lean";
pub const SUPPORT_45: &str = "Support45";

/// The numeric triple configuring one affordance type.
///
/// Unset fields default to zero when a single-field setter creates the entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AffordanceParams {
    /// Tolerance on the face normal when testing the requirement.
    pub margin: f64,
    /// Maximum normal deviation between a cluster seed and a neighbouring triangle.
    pub neighbouring_triangle_margin: f64,
    /// Regions with a smaller total area are discarded.
    pub minimum_area: f64,
}

impl AffordanceParams {
    pub const LEN: usize = 3;

    pub fn new(margin: f64, neighbouring_triangle_margin: f64, minimum_area: f64) -> Self {
        Self {
            margin,
            neighbouring_triangle_margin,
            minimum_area,
        }
    }

    /// Parses `[margin, neighbouringTriangleMargin, minimumArea]`.
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        match values {
            [margin, nb, area] => Ok(Self::new(*margin, *nb, *area)),
            _ => Err(AffordError::InvalidArgument(format!(
                "affordance configuration needs exactly {} values, got {}",
                Self::LEN,
                values.len()
            ))),
        }
    }

    pub fn to_vec(self) -> Vec<f64> {
        vec![self.margin, self.neighbouring_triangle_margin, self.minimum_area]
    }
}

/// The geometric predicate a face normal must satisfy for an affordance type.
///
/// "Up" is the world +Z axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Requirement {
    /// Normal within `margin` of up.
    Support,
    /// Normal nearly orthogonal to up: `|n · up| < margin`.
    Lean,
    /// Normal at about 45° from up: `|n · up - cos 45°| < margin`.
    Support45,
    /// Normal within `margin` of an arbitrary direction.
    Facing { direction: Vector3<f64> },
}

impl Requirement {
    /// The requirement used for a standard affordance type name.
    pub fn for_affordance(affordance_type: &str) -> Option<Self> {
        match affordance_type {
            SUPPORT => Some(Requirement::Support),
            LEAN => Some(Requirement::Lean),
            SUPPORT_45 => Some(Requirement::Support45),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Requirement::Facing { direction } = self {
            if direction.try_normalize(f64::EPSILON).is_none() {
                return Err(AffordError::InvalidArgument(
                    "facing requirement needs a non-zero direction".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// `normal` must be a unit vector.
    pub fn accepts(&self, normal: &Vector3<f64>, margin: f64) -> bool {
        let up = Vector3::<f64>::z();
        match self {
            Requirement::Support => (normal - up).norm() < margin,
            Requirement::Lean => normal.dot(&up).abs() < margin,
            Requirement::Support45 => (normal.dot(&up) - FRAC_1_SQRT_2).abs() < margin,
            Requirement::Facing { direction } => direction
                .try_normalize(f64::EPSILON)
                .is_some_and(|d| (normal - d).norm() < margin),
        }
    }
}

/// One analysis request unit: which type to produce and how to detect it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDescriptor {
    pub affordance_type: String,
    pub requirement: Requirement,
}

impl OperationDescriptor {
    pub fn new(affordance_type: impl Into<String>, requirement: Requirement) -> Self {
        Self {
            affordance_type: affordance_type.into(),
            requirement,
        }
    }

    /// Descriptor for a standard type name, if it has a known requirement.
    pub fn standard(affordance_type: &str) -> Option<Self> {
        Requirement::for_affordance(affordance_type).map(|r| Self::new(affordance_type, r))
    }
}

/// A descriptor paired with the parameters currently configured for its type.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfiguredOperation {
    pub descriptor: OperationDescriptor,
    pub params: AffordanceParams,
}

/// The preset configuration loaded by `Afford::load_default_affordance_config`.
pub fn default_affordance_config() -> Vec<(&'static str, AffordanceParams)> {
    vec![
        (SUPPORT, AffordanceParams::new(0.3, 0.3, 0.05)),
        (LEAN, AffordanceParams::new(0.1, 0.3, 0.05)),
        (SUPPORT_45, AffordanceParams::new(0.1, 0.3, 0.05)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_require_exactly_three_values() {
        let params = AffordanceParams::from_slice(&[0.01, 0.02, 0.001]).unwrap();
        assert_eq!(params.to_vec(), vec![0.01, 0.02, 0.001]);

        for bad in [&[][..], &[0.1, 0.2][..], &[0.1, 0.2, 0.3, 0.4][..]] {
            let err = AffordanceParams::from_slice(bad).unwrap_err();
            assert!(matches!(err, AffordError::InvalidArgument(_)));
        }
    }

    #[test]
    fn support_accepts_upward_faces_only() {
        let req = Requirement::Support;
        assert!(req.accepts(&Vector3::z(), 0.1));
        assert!(!req.accepts(&Vector3::x(), 0.1));
        assert!(!req.accepts(&-Vector3::z(), 0.1));
    }

    #[test]
    fn lean_accepts_walls() {
        let req = Requirement::Lean;
        assert!(req.accepts(&Vector3::x(), 0.1));
        assert!(!req.accepts(&Vector3::z(), 0.1));
    }

    #[test]
    fn support45_accepts_slopes() {
        let slope = Vector3::new(1.0, 0.0, 1.0).normalize();
        assert!(Requirement::Support45.accepts(&slope, 0.05));
        assert!(!Requirement::Support45.accepts(&Vector3::z(), 0.05));
    }

    #[test]
    fn facing_normalizes_its_direction() {
        let req = Requirement::Facing {
            direction: Vector3::new(0.0, 3.0, 0.0),
        };
        assert!(req.validate().is_ok());
        assert!(req.accepts(&Vector3::y(), 0.01));

        let zero = Requirement::Facing {
            direction: Vector3::zeros(),
        };
        assert!(zero.validate().is_err());
        assert!(!zero.accepts(&Vector3::y(), 1.0));
    }

    #[test]
    fn standard_names_map_to_requirements() {
        assert_eq!(
            OperationDescriptor::standard("Lean").map(|d| d.requirement),
            Some(Requirement::Lean)
        );
        assert!(OperationDescriptor::standard("Climb").is_none());
    }
}
