use nalgebra::Vector3;
use std::f64::consts::{FRAC_PI_2, PI};

/// The 3-component real vector used for spins, fluxes, fields and vector coefficients.
///
/// Equality is nalgebra's component-wise `==`, i.e. exact floating-point comparison. Two vectors
/// that are mathematically equal but were produced by different arithmetic may compare unequal.
pub type Vector = Vector3<f64>;

/// Rotates an angle by half a turn, keeping it in `[-π, π)`.
#[inline]
pub fn turn(angle: f64) -> f64 {
    let turned = angle + PI;
    if turned >= PI { turned - 2.0 * PI } else { turned }
}

/// Polar/spherical constructors and angular accessors on top of nalgebra's algebra.
pub trait VectorExt: Sized {
    fn from_cylindrical(r: f64, theta: f64, z: f64) -> Self;

    fn from_polar(r: f64, theta: f64) -> Self;

    /// `rho` is the magnitude, `theta` the azimuth in the xy-plane and `phi` the elevation
    /// above the xy-plane (not the polar angle from +z).
    fn from_spherical(rho: f64, theta: f64, phi: f64) -> Self;

    /// Azimuth of the projection onto the xy-plane, in `(-π, π]`.
    fn theta(&self) -> f64;

    /// Elevation above the xy-plane, in `[-π/2, π/2]`.
    fn phi(&self) -> f64;

    /// Returns this vector with `dtheta` added to its azimuth and `dphi` to its elevation.
    fn rotated(&self, dtheta: f64, dphi: f64) -> Self;

    fn angle_between(&self, other: &Self) -> f64;

    fn distance(&self, other: &Self) -> f64;

    fn distance_sq(&self, other: &Self) -> f64;

    /// Component-wise square, `(x², y², z²)`.
    fn component_sq(&self) -> Self;

    /// The unit vector along `self`, or `fallback` when `self` is the zero vector.
    fn unit_or(&self, fallback: Self) -> Self;
}

impl VectorExt for Vector {
    fn from_cylindrical(r: f64, theta: f64, z: f64) -> Self {
        Vector::new(r * theta.cos(), r * theta.sin(), z)
    }

    fn from_polar(r: f64, theta: f64) -> Self {
        Self::from_cylindrical(r, theta, 0.0)
    }

    fn from_spherical(rho: f64, theta: f64, phi: f64) -> Self {
        Self::from_cylindrical(rho * phi.cos(), theta, rho * phi.sin())
    }

    fn theta(&self) -> f64 {
        self.y.atan2(self.x)
    }

    fn phi(&self) -> f64 {
        let r = self.x.hypot(self.y);
        if r == 0.0 {
            if self.z > 0.0 {
                FRAC_PI_2
            } else if self.z < 0.0 {
                -FRAC_PI_2
            } else {
                0.0
            }
        } else {
            (self.z / r).atan()
        }
    }

    fn rotated(&self, dtheta: f64, dphi: f64) -> Self {
        Self::from_spherical(self.norm(), self.theta() + dtheta, self.phi() + dphi)
    }

    fn angle_between(&self, other: &Self) -> f64 {
        (self.dot(other) / (self.norm_squared() * other.norm_squared()).sqrt()).acos()
    }

    fn distance(&self, other: &Self) -> f64 {
        self.distance_sq(other).sqrt()
    }

    fn distance_sq(&self, other: &Self) -> f64 {
        (self - other).norm_squared()
    }

    fn component_sq(&self) -> Self {
        self.component_mul(self)
    }

    fn unit_or(&self, fallback: Self) -> Self {
        self.try_normalize(0.0).unwrap_or(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    fn assert_close(a: Vector, b: Vector) {
        assert!((a - b).norm() < EPS, "{a:?} != {b:?}");
    }

    #[test]
    fn turn_stays_in_half_open_range() {
        for angle in [-PI, -1.0, -EPS, 0.0, EPS, 1.0, PI - EPS] {
            let turned = turn(angle);
            assert!((-PI..PI).contains(&turned), "turn({angle}) = {turned}");
        }
        assert_eq!(turn(0.0), -PI);
        assert_eq!(turn(-PI), 0.0);
        assert!((turn(1.0) - (1.0 - PI)).abs() < EPS);
        assert_eq!(turn(-1.0), -1.0 + PI);
    }

    #[test]
    fn spherical_form_hits_the_axes() {
        assert_close(Vector::from_spherical(2.0, 0.0, 0.0), Vector::new(2.0, 0.0, 0.0));
        assert_close(Vector::from_spherical(1.0, FRAC_PI_2, 0.0), Vector::y());
        assert_close(Vector::from_spherical(3.0, 0.7, FRAC_PI_2), Vector::new(0.0, 0.0, 3.0));
    }

    #[test]
    fn polar_form_lies_in_xy_plane() {
        let v = Vector::from_polar(2.0, PI / 3.0);
        assert_eq!(v.z, 0.0);
        assert!((v.norm() - 2.0).abs() < EPS);
        assert!((v.theta() - PI / 3.0).abs() < EPS);
    }

    #[test]
    fn cylindrical_form_keeps_its_height() {
        let v = Vector::from_cylindrical(1.0, PI, -4.0);
        assert_close(v, Vector::new(-1.0, 0.0, -4.0));
        assert_close(Vector::from_polar(1.0, PI), Vector::from_cylindrical(1.0, PI, 0.0));
    }

    #[test]
    fn phi_handles_vectors_on_the_z_axis() {
        assert_eq!(Vector::new(0.0, 0.0, 5.0).phi(), FRAC_PI_2);
        assert_eq!(Vector::new(0.0, 0.0, -5.0).phi(), -FRAC_PI_2);
        assert_eq!(Vector::zeros().phi(), 0.0);
        assert!((Vector::new(1.0, 0.0, 1.0).phi() - PI / 4.0).abs() < EPS);
    }

    #[test]
    fn spherical_round_trips_through_accessors() {
        let v = Vector::new(0.3, -1.2, 0.8);
        let rebuilt = Vector::from_spherical(v.norm(), v.theta(), v.phi());
        assert_close(v, rebuilt);
    }

    #[test]
    fn rotated_offsets_azimuth_and_preserves_norm() {
        let v = Vector::x() * 2.0;
        let r = v.rotated(FRAC_PI_2, 0.0);
        assert_close(r, Vector::y() * 2.0);
        let up = v.rotated(0.0, FRAC_PI_2);
        assert_close(up, Vector::z() * 2.0);
    }

    #[test]
    fn angle_and_distance_helpers() {
        assert!((Vector::x().angle_between(&Vector::y()) - FRAC_PI_2).abs() < EPS);
        assert_eq!(Vector::new(1.0, 2.0, 2.0).distance(&Vector::zeros()), 3.0);
        assert_eq!(Vector::new(1.0, 1.0, 0.0).distance_sq(&Vector::zeros()), 2.0);
    }

    #[test]
    fn cross_product_is_anticommutative() {
        let a = Vector::new(1.0, 2.0, 3.0);
        let b = Vector::new(-2.0, 0.5, 4.0);
        assert_eq!(a.cross(&b), -b.cross(&a));
        assert_eq!(Vector::x().cross(&Vector::y()), Vector::z());
    }

    #[test]
    fn component_sq_squares_each_component() {
        assert_eq!(
            Vector::new(-2.0, 3.0, 0.5).component_sq(),
            Vector::new(4.0, 9.0, 0.25)
        );
    }

    #[test]
    fn unit_or_falls_back_for_zero_vector() {
        assert_eq!(Vector::zeros().unit_or(Vector::y()), Vector::y());
        assert_close(Vector::new(0.0, 0.0, 4.0).unit_or(Vector::y()), Vector::z());
    }

    #[test]
    fn equality_is_exact() {
        let a = Vector::new(0.1 + 0.2, 0.0, 0.0);
        let b = Vector::new(0.3, 0.0, 0.0);
        assert_ne!(a, b);
        assert!((a - b).norm() < EPS);
    }
}
