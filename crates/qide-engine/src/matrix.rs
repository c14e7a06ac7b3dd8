//! 2x2 complex matrices for single-qubit operations.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_1_SQRT_2;

const ZERO: Complex64 = Complex64::new(0.0, 0.0);
const ONE: Complex64 = Complex64::new(1.0, 0.0);

/// A 2x2 complex matrix in row-major order.
///
/// Entries are `[[m00, m01], [m10, m11]]`; applied to a pair of amplitudes
/// `(a0, a1)` it yields `(m00·a0 + m01·a1, m10·a0 + m11·a1)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Unitary2x2 {
    /// The matrix elements in row-major order.
    pub data: [Complex64; 4],
}

impl Unitary2x2 {
    /// Create a matrix from its four entries.
    pub const fn new(m00: Complex64, m01: Complex64, m10: Complex64, m11: Complex64) -> Self {
        Self {
            data: [m00, m01, m10, m11],
        }
    }

    /// Create a diagonal matrix.
    pub const fn diagonal(d0: Complex64, d1: Complex64) -> Self {
        Self::new(d0, ZERO, ZERO, d1)
    }

    /// The identity matrix.
    pub const fn identity() -> Self {
        Self::diagonal(ONE, ONE)
    }

    /// Hadamard matrix.
    pub fn hadamard() -> Self {
        let s = Complex64::new(FRAC_1_SQRT_2, 0.0);
        Self::new(s, s, s, -s)
    }

    /// Pauli-X matrix.
    pub const fn sigma_x() -> Self {
        Self::new(ZERO, ONE, ONE, ZERO)
    }

    /// Pauli-Y matrix.
    pub const fn sigma_y() -> Self {
        Self::new(ZERO, Complex64::new(0.0, -1.0), Complex64::new(0.0, 1.0), ZERO)
    }

    /// Pauli-Z matrix.
    pub const fn sigma_z() -> Self {
        Self::diagonal(ONE, Complex64::new(-1.0, 0.0))
    }

    /// Square root of Pauli-X.
    pub fn sqrt_x() -> Self {
        let half = Complex64::new(0.5, 0.0);
        let half_i = Complex64::new(0.0, 0.5);
        Self::new(half + half_i, half - half_i, half - half_i, half + half_i)
    }

    /// Rotation about the X axis by `gamma`.
    pub fn rotate_x(gamma: f64) -> Self {
        let c = (gamma / 2.0).cos();
        let s = (gamma / 2.0).sin();
        Self::new(
            Complex64::new(c, 0.0),
            Complex64::new(0.0, -s),
            Complex64::new(0.0, -s),
            Complex64::new(c, 0.0),
        )
    }

    /// Rotation about the Y axis by `gamma`.
    pub fn rotate_y(gamma: f64) -> Self {
        let c = (gamma / 2.0).cos();
        let s = (gamma / 2.0).sin();
        Self::new(
            Complex64::new(c, 0.0),
            Complex64::new(-s, 0.0),
            Complex64::new(s, 0.0),
            Complex64::new(c, 0.0),
        )
    }

    /// Rotation about the Z axis by `gamma`.
    pub fn rotate_z(gamma: f64) -> Self {
        Self::diagonal(
            Complex64::from_polar(1.0, -gamma / 2.0),
            Complex64::from_polar(1.0, gamma / 2.0),
        )
    }

    /// Uniform phase `e^{iθ}` on both basis states.
    pub fn phase_scale(theta: f64) -> Self {
        let phase = Complex64::from_polar(1.0, theta);
        Self::diagonal(phase, phase)
    }

    /// Multiply this matrix by another: `self * other`.
    #[allow(clippy::many_single_char_names)]
    pub fn mul(&self, other: &Self) -> Self {
        let [a, b, c, d] = self.data;
        let [e, f, g, h] = other.data;
        Self::new(a * e + b * g, a * f + b * h, c * e + d * g, c * f + d * h)
    }

    /// Conjugate transpose.
    pub fn adjoint(&self) -> Self {
        Self::new(
            self.data[0].conj(),
            self.data[2].conj(),
            self.data[1].conj(),
            self.data[3].conj(),
        )
    }

    /// Entry-wise comparison within `epsilon`.
    pub fn approx_eq(&self, other: &Self, epsilon: f64) -> bool {
        self.data
            .iter()
            .zip(other.data.iter())
            .all(|(a, b)| (a - b).norm() < epsilon)
    }

    /// Check `U·U† = I` within `epsilon`.
    pub fn is_unitary(&self, epsilon: f64) -> bool {
        if self.data.iter().any(|z| !z.re.is_finite() || !z.im.is_finite()) {
            return false;
        }
        self.mul(&self.adjoint())
            .approx_eq(&Self::identity(), epsilon)
    }

    /// Apply the matrix to an amplitude pair.
    #[inline]
    pub fn apply(&self, a0: Complex64, a1: Complex64) -> (Complex64, Complex64) {
        let [m00, m01, m10, m11] = self.data;
        (m00 * a0 + m01 * a1, m10 * a0 + m11 * a1)
    }
}

impl Default for Unitary2x2 {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::ops::Mul for Unitary2x2 {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        Unitary2x2::mul(&self, &rhs)
    }
}
