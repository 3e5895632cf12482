// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # Surrogate Derivatives
//!
//! The spike is a Heaviside step of `x = h - v_th`, whose derivative is zero
//! almost everywhere. Training uses a smooth stand-in derivative instead.
//!
//! ```text
//! index  function             g(x, alpha)
//! 0      ATan                 alpha / 2 / (1 + (pi/2 * alpha * x)^2)
//! 1      Sigmoid              alpha * sigmoid(alpha*x) * (1 - sigmoid(alpha*x))
//! 2      SoftSign             alpha / (2 * (1 + alpha*|x|)^2)
//! 3      PiecewiseQuadratic   |x| > 1/alpha ? 0 : alpha - alpha^2 * |x|
//! ```
//!
//! The index column is the integer selector host frameworks pass across the
//! binding boundary; GPU shaders switch on the same numbers.

use core::f32::consts::{FRAC_PI_2, PI};
use core::fmt;
use core::str::FromStr;

#[cfg(feature = "std")]
use serde::{Deserialize, Serialize};

use crate::types::LifError;

/// Differentiable approximations of the spike step function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "std", serde(rename_all = "snake_case"))]
pub enum SurrogateFunction {
    #[default]
    ATan,
    Sigmoid,
    SoftSign,
    PiecewiseQuadratic,
}

impl SurrogateFunction {
    /// Every surrogate, in selector order
    pub const ALL: [SurrogateFunction; 4] = [
        SurrogateFunction::ATan,
        SurrogateFunction::Sigmoid,
        SurrogateFunction::SoftSign,
        SurrogateFunction::PiecewiseQuadratic,
    ];

    /// Integer selector understood by the GPU kernels
    pub fn index(self) -> u32 {
        match self {
            SurrogateFunction::ATan => 0,
            SurrogateFunction::Sigmoid => 1,
            SurrogateFunction::SoftSign => 2,
            SurrogateFunction::PiecewiseQuadratic => 3,
        }
    }

    /// Canonical lowercase name
    pub fn name(self) -> &'static str {
        match self {
            SurrogateFunction::ATan => "atan",
            SurrogateFunction::Sigmoid => "sigmoid",
            SurrogateFunction::SoftSign => "soft_sign",
            SurrogateFunction::PiecewiseQuadratic => "piecewise_quadratic",
        }
    }

    /// Surrogate derivative of the step function at `x = h - v_th`
    #[inline(always)]
    pub fn derivative(self, x: f32, alpha: f32) -> f32 {
        match self {
            SurrogateFunction::ATan => atan_derivative(x, alpha),
            SurrogateFunction::Sigmoid => sigmoid_derivative(x, alpha),
            SurrogateFunction::SoftSign => soft_sign_derivative(x, alpha),
            SurrogateFunction::PiecewiseQuadratic => piecewise_quadratic_derivative(x, alpha),
        }
    }

    /// Smooth primitive whose derivative is [`SurrogateFunction::derivative`]
    ///
    /// Rises from 0 to 1 around `x = 0`; used for gradient checking.
    pub fn primitive(self, x: f32, alpha: f32) -> f32 {
        match self {
            SurrogateFunction::ATan => (FRAC_PI_2 * alpha * x).atan() / PI + 0.5,
            SurrogateFunction::Sigmoid => sigmoid(alpha * x),
            SurrogateFunction::SoftSign => {
                let ax = alpha * x;
                0.5 * (ax / (1.0 + ax.abs()) + 1.0)
            }
            SurrogateFunction::PiecewiseQuadratic => {
                let bound = 1.0 / alpha;
                if x < -bound {
                    0.0
                } else if x > bound {
                    1.0
                } else {
                    -0.5 * alpha * alpha * x * x.abs() + alpha * x + 0.5
                }
            }
        }
    }
}

impl fmt::Display for SurrogateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl TryFrom<i32> for SurrogateFunction {
    type Error = LifError;

    fn try_from(index: i32) -> Result<Self, Self::Error> {
        match index {
            0 => Ok(SurrogateFunction::ATan),
            1 => Ok(SurrogateFunction::Sigmoid),
            2 => Ok(SurrogateFunction::SoftSign),
            3 => Ok(SurrogateFunction::PiecewiseQuadratic),
            other => Err(LifError::InvalidSurrogate(format!(
                "index {} (expected 0..{})",
                other,
                Self::ALL.len()
            ))),
        }
    }
}

impl FromStr for SurrogateFunction {
    type Err = LifError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "atan" | "arctan" => Ok(SurrogateFunction::ATan),
            "sigmoid" => Ok(SurrogateFunction::Sigmoid),
            "soft_sign" | "softsign" => Ok(SurrogateFunction::SoftSign),
            "piecewise_quadratic" | "piecewisequadratic" => {
                Ok(SurrogateFunction::PiecewiseQuadratic)
            }
            _ => Err(LifError::InvalidSurrogate(s.to_string())),
        }
    }
}

#[inline(always)]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[inline(always)]
fn atan_derivative(x: f32, alpha: f32) -> f32 {
    let scaled = FRAC_PI_2 * alpha * x;
    alpha / 2.0 / (1.0 + scaled * scaled)
}

#[inline(always)]
fn sigmoid_derivative(x: f32, alpha: f32) -> f32 {
    let sg = sigmoid(alpha * x);
    (1.0 - sg) * sg * alpha
}

#[inline(always)]
fn soft_sign_derivative(x: f32, alpha: f32) -> f32 {
    let denom = 1.0 + alpha * x.abs();
    alpha / (2.0 * denom * denom)
}

#[inline(always)]
fn piecewise_quadratic_derivative(x: f32, alpha: f32) -> f32 {
    let ax = x.abs();
    if ax > 1.0 / alpha {
        0.0
    } else {
        alpha - alpha * alpha * ax
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_roundtrip() {
        for function in SurrogateFunction::ALL {
            let parsed = SurrogateFunction::try_from(function.index() as i32).unwrap();
            assert_eq!(parsed, function);
        }
        assert!(SurrogateFunction::try_from(4).is_err());
        assert!(SurrogateFunction::try_from(-1).is_err());
        assert_eq!(SurrogateFunction::default(), SurrogateFunction::ATan);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("ATan".parse::<SurrogateFunction>().unwrap(), SurrogateFunction::ATan);
        assert_eq!(
            "piecewise-quadratic".parse::<SurrogateFunction>().unwrap(),
            SurrogateFunction::PiecewiseQuadratic
        );
        assert_eq!(
            "soft_sign".parse::<SurrogateFunction>().unwrap(),
            SurrogateFunction::SoftSign
        );
        assert!(matches!(
            "relu".parse::<SurrogateFunction>(),
            Err(LifError::InvalidSurrogate(_))
        ));
    }

    #[test]
    fn test_peak_values_at_threshold() {
        // At x = 0 every surrogate peaks
        assert!((SurrogateFunction::ATan.derivative(0.0, 2.0) - 1.0).abs() < 1e-6);
        assert!((SurrogateFunction::Sigmoid.derivative(0.0, 4.0) - 1.0).abs() < 1e-6);
        assert!((SurrogateFunction::SoftSign.derivative(0.0, 2.0) - 1.0).abs() < 1e-6);
        assert!((SurrogateFunction::PiecewiseQuadratic.derivative(0.0, 1.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_symmetric_and_non_negative() {
        for function in SurrogateFunction::ALL {
            for &x in &[0.05f32, 0.3, 0.9, 2.5] {
                let pos = function.derivative(x, 2.0);
                let neg = function.derivative(-x, 2.0);
                assert!(pos >= 0.0, "{} negative at {}", function, x);
                assert!((pos - neg).abs() < 1e-6, "{} not symmetric at {}", function, x);
            }
        }
    }

    #[test]
    fn test_piecewise_quadratic_support() {
        let f = SurrogateFunction::PiecewiseQuadratic;
        assert_eq!(f.derivative(0.6, 2.0), 0.0);
        assert_eq!(f.derivative(-0.6, 2.0), 0.0);
        assert!(f.derivative(0.4, 2.0) > 0.0);
    }

    #[test]
    fn test_derivative_matches_primitive() {
        let eps = 1e-3f32;
        for function in SurrogateFunction::ALL {
            for &x in &[-0.7f32, -0.2, 0.0, 0.15, 0.33] {
                let numeric = (function.primitive(x + eps, 2.0) - function.primitive(x - eps, 2.0))
                    / (2.0 * eps);
                let analytic = function.derivative(x, 2.0);
                assert!(
                    (numeric - analytic).abs() < 1e-2,
                    "{} at {}: numeric {} vs analytic {}",
                    function,
                    x,
                    numeric,
                    analytic
                );
            }
        }
    }
}
