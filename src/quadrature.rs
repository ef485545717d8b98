//! Quadrature rules on triangles and edges, expressed in barycentric coordinates.
//!
//! All rules are normalized so that the weights sum to one. The integral over a physical entity
//! is obtained by multiplying with the measure of the entity.
use nalgebra::{Vector2, Vector3};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::ops::{AddAssign, Mul};

/// Errors returned by quadrature methods.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuadratureError {
    /// Indicates that no rule of the requested polynomial strength is available.
    NoRuleAvailable { strength: usize },
}

impl Display for QuadratureError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRuleAvailable { strength } => {
                write!(f, "There is no quadrature rule of strength {} available", strength)
            }
        }
    }
}

impl std::error::Error for QuadratureError {}

/// A quadrature rule consisting of weights and (barycentric) points.
pub trait Quadrature {
    type Point;

    fn weights(&self) -> &[f64];
    fn points(&self) -> &[Self::Point];

    fn len(&self) -> usize {
        self.weights().len()
    }

    fn is_empty(&self) -> bool {
        self.weights().is_empty()
    }

    /// Approximates the integral of the given function over the reference entity
    /// (of unit measure) using this quadrature rule.
    fn integrate<U, Function>(&self, f: Function) -> U
    where
        Function: Fn(&Self::Point) -> U,
        U: num::Zero + Mul<f64, Output = U> + AddAssign<U>,
    {
        let mut integral = U::zero();
        for (w, p) in self.weights().iter().zip(self.points()) {
            integral += f(p) * *w;
        }
        integral
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuadratureRule<P> {
    weights: Vec<f64>,
    points: Vec<P>,
}

impl<P> QuadratureRule<P> {
    pub fn from_weights_and_points(weights: Vec<f64>, points: Vec<P>) -> Self {
        assert_eq!(weights.len(), points.len(), "Weights and points must have the same length");
        Self { weights, points }
    }
}

impl<P> Quadrature for QuadratureRule<P> {
    type Point = P;

    fn weights(&self) -> &[f64] {
        &self.weights
    }

    fn points(&self) -> &[P] {
        &self.points
    }
}

/// Quadrature rule on a triangle with barycentric points $(\lambda_0, \lambda_1, \lambda_2)$.
pub type TriangleQuadrature = QuadratureRule<Vector3<f64>>;

/// Quadrature rule on an edge with barycentric points $(\lambda_0, \lambda_1)$.
pub type SegmentQuadrature = QuadratureRule<Vector2<f64>>;

fn push_permutations_of(weights: &mut Vec<f64>, points: &mut Vec<Vector3<f64>>, a: f64, b: f64, w: f64) {
    // Points of the form (b, a, a) and its permutations
    weights.extend([w, w, w]);
    points.push(Vector3::new(b, a, a));
    points.push(Vector3::new(a, b, a));
    points.push(Vector3::new(a, a, b));
}

/// Returns a symmetric triangle rule that integrates polynomials of total degree `strength` exactly.
///
/// Rules with strength 1 through 5 are available.
pub fn triangle(strength: usize) -> Result<TriangleQuadrature, QuadratureError> {
    let third = 1.0 / 3.0;
    let mut weights = Vec::new();
    let mut points = Vec::new();
    match strength {
        0 | 1 => {
            weights.push(1.0);
            points.push(Vector3::new(third, third, third));
        }
        2 => push_permutations_of(&mut weights, &mut points, 1.0 / 6.0, 2.0 / 3.0, third),
        3 | 4 => {
            push_permutations_of(
                &mut weights,
                &mut points,
                0.445948490915965,
                0.108103018168070,
                0.223381589678011,
            );
            push_permutations_of(
                &mut weights,
                &mut points,
                0.091576213509771,
                0.816847572980459,
                0.109951743655322,
            );
        }
        5 => {
            weights.push(0.225);
            points.push(Vector3::new(third, third, third));
            push_permutations_of(
                &mut weights,
                &mut points,
                0.470142064105115,
                0.059715871789770,
                0.132394152788506,
            );
            push_permutations_of(
                &mut weights,
                &mut points,
                0.101286507323456,
                0.797426985353087,
                0.125939180544827,
            );
        }
        _ => return Err(QuadratureError::NoRuleAvailable { strength }),
    }
    Ok(QuadratureRule::from_weights_and_points(weights, points))
}

/// Returns a Gauss-Legendre rule on an edge that integrates polynomials of degree `strength` exactly.
///
/// Rules with strength 1 through 5 are available.
pub fn segment(strength: usize) -> Result<SegmentQuadrature, QuadratureError> {
    let (weights, abscissae): (Vec<f64>, Vec<f64>) = match strength {
        0 | 1 => (vec![1.0], vec![0.5]),
        2 | 3 => {
            let d = 0.5 / f64::sqrt(3.0);
            (vec![0.5, 0.5], vec![0.5 - d, 0.5 + d])
        }
        4 | 5 => {
            let d = 0.5 * f64::sqrt(3.0 / 5.0);
            (vec![8.0 / 18.0, 5.0 / 18.0, 5.0 / 18.0], vec![0.5, 0.5 - d, 0.5 + d])
        }
        _ => return Err(QuadratureError::NoRuleAvailable { strength }),
    };
    let points = abscissae
        .into_iter()
        .map(|t| Vector2::new(1.0 - t, t))
        .collect();
    Ok(QuadratureRule::from_weights_and_points(weights, points))
}
