//! Distance functions used for routing and ranking.
//!
//! Both metrics accumulate in `f64` and return `f32`, matching the storage type of
//! the vectors themselves.

use serde::{Deserialize, Serialize};

/// Guards the Poincare denominator when either operand approaches the unit sphere.
pub const POINCARE_EPSILON: f64 = 1e-10;

/// Norm that operands on or outside the unit sphere are rescaled to.
pub const POINCARE_CLAMP_NORM: f64 = 0.99;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    Euclidean,
    /// Hyperbolic distance in the Poincare ball model.
    Poincare,
}

impl Metric {
    #[must_use]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Euclidean => euclidean(a, b),
            Self::Poincare => poincare_distance(a, b),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Euclidean => "euclidean",
            Self::Poincare => "poincare",
        }
    }
}

impl std::str::FromStr for Metric {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "euclidean" | "l2" => Ok(Self::Euclidean),
            "poincare" | "hyperbolic" => Ok(Self::Poincare),
            other => Err(format!("unknown metric '{other}'")),
        }
    }
}

/// `sqrt(sum((a_i - b_i)^2))`. Callers guarantee equal lengths; extra components
/// of the longer slice are ignored.
#[must_use]
pub fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    squared_euclidean(a, b).sqrt() as f32
}

pub(crate) fn squared_euclidean(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = f64::from(*x) - f64::from(*y);
            d * d
        })
        .sum()
}

fn squared_norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum()
}

/// Pulls a point on or outside the unit sphere back inside it.
///
/// Raw, un-normalized embeddings are silently rescaled to norm 0.99, which can change
/// their relative ordering. That approximation is accepted; callers wanting faithful
/// hyperbolic distances must supply points with norm below 1.
fn clamp_into_ball(v: &[f32]) -> Vec<f64> {
    let mut out: Vec<f64> = v.iter().map(|x| f64::from(*x)).collect();
    let norm = squared_norm(&out).sqrt();
    if norm >= 1.0 {
        let scale = POINCARE_CLAMP_NORM / norm;
        for x in &mut out {
            *x *= scale;
        }
    }
    out
}

/// `arccosh(1 + 2|a-b|^2 / ((1-|a|^2)(1-|b|^2) + eps))`, after clamping both operands
/// into the open unit ball.
#[must_use]
pub fn poincare_distance(a: &[f32], b: &[f32]) -> f32 {
    let a = clamp_into_ball(a);
    let b = clamp_into_ball(b);

    let diff: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum();
    let denom = (1.0 - squared_norm(&a)) * (1.0 - squared_norm(&b)) + POINCARE_EPSILON;
    let arg = 1.0 + 2.0 * diff / denom;

    // acosh is undefined below 1; rounding can only push a zero diff there.
    arg.max(1.0).acosh() as f32
}
