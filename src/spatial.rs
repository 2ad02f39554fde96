// Copyright 2024-2025 the dimarray developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Fixed-size spatial element types: 3-vectors, 3x3 matrices, rotations,
//! translations and affine transforms. These are array *elements*, not
//! general linear algebra; only the operations the element-wise kernels
//! need are provided.

use std::ops::{Add, Mul, Neg, Sub};

/// A 3-vector of `f64`.
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct Vector3(pub [f64; 3]);

impl Vector3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Vector3 {
        Vector3([x, y, z])
    }

    pub const fn zero() -> Vector3 {
        Vector3([0.0; 3])
    }

    /// Euclidean length.
    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn dot(&self, other: &Vector3) -> f64 {
        self.0[0] * other.0[0] + self.0[1] * other.0[1] + self.0[2] * other.0[2]
    }

    pub fn cross(&self, other: &Vector3) -> Vector3 {
        let (a, b) = (&self.0, &other.0);
        Vector3([
            a[1] * b[2] - a[2] * b[1],
            a[2] * b[0] - a[0] * b[2],
            a[0] * b[1] - a[1] * b[0],
        ])
    }
}

impl Add for Vector3 {
    type Output = Vector3;
    fn add(self, rhs: Vector3) -> Vector3 {
        Vector3([
            self.0[0] + rhs.0[0],
            self.0[1] + rhs.0[1],
            self.0[2] + rhs.0[2],
        ])
    }
}

impl Sub for Vector3 {
    type Output = Vector3;
    fn sub(self, rhs: Vector3) -> Vector3 {
        Vector3([
            self.0[0] - rhs.0[0],
            self.0[1] - rhs.0[1],
            self.0[2] - rhs.0[2],
        ])
    }
}

impl Neg for Vector3 {
    type Output = Vector3;
    fn neg(self) -> Vector3 {
        Vector3([-self.0[0], -self.0[1], -self.0[2]])
    }
}

impl Mul<f64> for Vector3 {
    type Output = Vector3;
    fn mul(self, rhs: f64) -> Vector3 {
        Vector3([self.0[0] * rhs, self.0[1] * rhs, self.0[2] * rhs])
    }
}

impl Mul<Vector3> for f64 {
    type Output = Vector3;
    fn mul(self, rhs: Vector3) -> Vector3 {
        rhs * self
    }
}

/// A 3x3 matrix of `f64`, row-major.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Matrix3(pub [[f64; 3]; 3]);

impl Matrix3 {
    pub const fn identity() -> Matrix3 {
        Matrix3([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
    }

    pub fn from_rows(rows: [[f64; 3]; 3]) -> Matrix3 {
        Matrix3(rows)
    }
}

impl Default for Matrix3 {
    fn default() -> Matrix3 {
        Matrix3([[0.0; 3]; 3])
    }
}

impl Mul for Matrix3 {
    type Output = Matrix3;
    fn mul(self, rhs: Matrix3) -> Matrix3 {
        let mut out = [[0.0; 3]; 3];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = (0..3).map(|k| self.0[i][k] * rhs.0[k][j]).sum();
            }
        }
        Matrix3(out)
    }
}

impl Mul<Vector3> for Matrix3 {
    type Output = Vector3;
    fn mul(self, rhs: Vector3) -> Vector3 {
        let mut out = [0.0; 3];
        for (i, o) in out.iter_mut().enumerate() {
            *o = (0..3).map(|k| self.0[i][k] * rhs.0[k]).sum();
        }
        Vector3(out)
    }
}

/// A rotation stored as a unit quaternion `(x, y, z, w)`.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Rotation {
    quat: [f64; 4],
}

impl Rotation {
    pub const fn identity() -> Rotation {
        Rotation {
            quat: [0.0, 0.0, 0.0, 1.0],
        }
    }

    /// Build from quaternion components; the quaternion is normalized.
    pub fn from_quat(x: f64, y: f64, z: f64, w: f64) -> Rotation {
        let n = (x * x + y * y + z * z + w * w).sqrt();
        Rotation {
            quat: [x / n, y / n, z / n, w / n],
        }
    }

    pub fn quat(&self) -> [f64; 4] {
        self.quat
    }

    /// The equivalent rotation matrix.
    pub fn to_matrix(&self) -> Matrix3 {
        let [x, y, z, w] = self.quat;
        Matrix3([
            [
                1.0 - 2.0 * (y * y + z * z),
                2.0 * (x * y - z * w),
                2.0 * (x * z + y * w),
            ],
            [
                2.0 * (x * y + z * w),
                1.0 - 2.0 * (x * x + z * z),
                2.0 * (y * z - x * w),
            ],
            [
                2.0 * (x * z - y * w),
                2.0 * (y * z + x * w),
                1.0 - 2.0 * (x * x + y * y),
            ],
        ])
    }
}

impl Default for Rotation {
    fn default() -> Rotation {
        Rotation::identity()
    }
}

impl Mul for Rotation {
    type Output = Rotation;
    fn mul(self, rhs: Rotation) -> Rotation {
        let [ax, ay, az, aw] = self.quat;
        let [bx, by, bz, bw] = rhs.quat;
        Rotation {
            quat: [
                aw * bx + ax * bw + ay * bz - az * by,
                aw * by - ax * bz + ay * bw + az * bx,
                aw * bz + ax * by - ay * bx + az * bw,
                aw * bw - ax * bx - ay * by - az * bz,
            ],
        }
    }
}

impl Mul<Vector3> for Rotation {
    type Output = Vector3;
    fn mul(self, rhs: Vector3) -> Vector3 {
        self.to_matrix() * rhs
    }
}

/// A translation by a 3-vector.
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct Translation(pub Vector3);

impl Translation {
    pub const fn identity() -> Translation {
        Translation(Vector3::zero())
    }

    pub fn vector(&self) -> Vector3 {
        self.0
    }
}

impl Mul for Translation {
    type Output = Translation;
    fn mul(self, rhs: Translation) -> Translation {
        Translation(self.0 + rhs.0)
    }
}

impl Mul<Vector3> for Translation {
    type Output = Vector3;
    fn mul(self, rhs: Vector3) -> Vector3 {
        self.0 + rhs
    }
}

/// An affine transform: a linear part followed by a translation.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Affine3 {
    pub linear: Matrix3,
    pub translation: Vector3,
}

impl Affine3 {
    pub const fn identity() -> Affine3 {
        Affine3 {
            linear: Matrix3::identity(),
            translation: Vector3::zero(),
        }
    }

    pub fn new(linear: Matrix3, translation: Vector3) -> Affine3 {
        Affine3 {
            linear,
            translation,
        }
    }
}

impl Default for Affine3 {
    fn default() -> Affine3 {
        Affine3::identity()
    }
}

impl Mul for Affine3 {
    type Output = Affine3;
    fn mul(self, rhs: Affine3) -> Affine3 {
        Affine3 {
            linear: self.linear * rhs.linear,
            translation: self.linear * rhs.translation + self.translation,
        }
    }
}

impl Mul<Vector3> for Affine3 {
    type Output = Vector3;
    fn mul(self, rhs: Vector3) -> Vector3 {
        self.linear * rhs + self.translation
    }
}

impl From<Rotation> for Affine3 {
    fn from(r: Rotation) -> Affine3 {
        Affine3::new(r.to_matrix(), Vector3::zero())
    }
}

impl From<Translation> for Affine3 {
    fn from(t: Translation) -> Affine3 {
        Affine3::new(Matrix3::identity(), t.vector())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_algebra() {
        let v = Vector3::new(3.0, 4.0, 0.0);
        assert_eq!(v.norm(), 5.0);
        assert_eq!(v + v, 2.0 * v);
        assert_eq!(v - v, Vector3::zero());
        assert_eq!(
            Vector3::new(1.0, 0.0, 0.0).cross(&Vector3::new(0.0, 1.0, 0.0)),
            Vector3::new(0.0, 0.0, 1.0)
        );
    }

    #[test]
    fn matrix_apply() {
        let flip = Matrix3::from_rows([[0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]]);
        assert_eq!(
            flip * Vector3::new(1.0, 2.0, 3.0),
            Vector3::new(2.0, 1.0, 3.0)
        );
        assert_eq!(flip * flip, Matrix3::identity());
    }

    #[test]
    fn rotation_half_turn() {
        // Half turn about z maps x to -x.
        let half = Rotation::from_quat(0.0, 0.0, 1.0, 0.0);
        let rotated = half * Vector3::new(1.0, 0.0, 0.0);
        assert!((rotated.0[0] + 1.0).abs() < 1e-12);
        assert!(rotated.0[1].abs() < 1e-12);
    }

    #[test]
    fn affine_composition_order() {
        let t = Translation(Vector3::new(1.0, 0.0, 0.0));
        let flip = Matrix3::from_rows([[-1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
        let a = Affine3::from(t) * Affine3::new(flip, Vector3::zero());
        // Flip first, then translate.
        assert_eq!(a * Vector3::new(2.0, 0.0, 0.0), Vector3::new(-1.0, 0.0, 0.0));
    }
}
