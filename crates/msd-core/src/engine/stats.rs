//! Observables averaged over the recorded sample series.
//!
//! Every sample carries equal weight: means are arithmetic means over the record and variances
//! are population variances `<x^2> - <x>^2` over the same samples.

use super::lattice::Lattice;
use crate::core::models::region::Region;
use crate::core::models::results::Results;
use crate::core::vector::Vector;

/// First and second moment of one scalar field over the series.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Moments {
    mean: f64,
    mean_sq: f64,
}

impl Moments {
    fn variance(&self) -> f64 {
        (self.mean_sq - self.mean * self.mean).max(0.0)
    }
}

fn moments(record: &[Results], field: impl Fn(&Results) -> f64) -> Option<Moments> {
    if record.is_empty() {
        return None;
    }
    let n = record.len() as f64;
    let (sum, sum_sq) = record
        .iter()
        .map(field)
        .fold((0.0, 0.0), |(s, s2), x| (s + x, s2 + x * x));
    Some(Moments {
        mean: sum / n,
        mean_sq: sum_sq / n,
    })
}

fn scalar_mean(record: &[Results], current: &Results, field: impl Fn(&Results) -> f64) -> f64 {
    moments(record, &field).map_or_else(|| field(current), |m| m.mean)
}

fn vector_mean(
    record: &[Results],
    current: &Results,
    field: impl Fn(&Results) -> Vector,
) -> Vector {
    Vector::from_fn(|i, _| scalar_mean(record, current, |r| field(r)[i]))
}

fn scalar_variance(record: &[Results], field: impl Fn(&Results) -> f64) -> f64 {
    if record.len() < 2 {
        return 0.0;
    }
    moments(record, field).map_or(0.0, |m| m.variance())
}

/// `<|v|^2> - |<v>|^2`, the sum of the component variances.
fn vector_variance(record: &[Results], field: impl Fn(&Results) -> Vector) -> f64 {
    (0..3)
        .map(|i| scalar_variance(record, |r| field(r)[i]))
        .sum()
}

impl Lattice {
    /// Every field of [`Results`] averaged over the recorded series, with `t` taken from the
    /// latest sample. An empty series yields the current results.
    pub fn mean_results(&self) -> Results {
        let record = self.record.as_slice();
        let current = &self.results;
        let Some(last) = record.last() else {
            return *current;
        };

        macro_rules! mean {
            (scalar $field:ident) => {
                scalar_mean(record, current, |r| r.$field)
            };
            (vector $field:ident) => {
                vector_mean(record, current, |r| r.$field)
            };
        }

        Results {
            t: last.t,
            m: mean!(vector m),
            m_l: mean!(vector m_l),
            m_r: mean!(vector m_r),
            m_m: mean!(vector m_m),
            ms: mean!(vector ms),
            ms_l: mean!(vector ms_l),
            ms_r: mean!(vector ms_r),
            ms_m: mean!(vector ms_m),
            mf: mean!(vector mf),
            mf_l: mean!(vector mf_l),
            mf_r: mean!(vector mf_r),
            mf_m: mean!(vector mf_m),
            u: mean!(scalar u),
            u_l: mean!(scalar u_l),
            u_r: mean!(scalar u_r),
            u_m: mean!(scalar u_m),
            u_ml: mean!(scalar u_ml),
            u_mr: mean!(scalar u_mr),
            u_lr: mean!(scalar u_lr),
        }
    }

    pub fn mean_m(&self) -> Vector {
        vector_mean(&self.record, &self.results, |r| r.m)
    }

    pub fn mean_u(&self) -> f64 {
        scalar_mean(&self.record, &self.results, |r| r.u)
    }

    /// `Var(U) / (kT^2 N)` over the whole device.
    pub fn specific_heat(&self) -> f64 {
        let variance = scalar_variance(&self.record, |r| r.u);
        per_site(variance, self.parameters.kt.powi(2), self.n())
    }

    /// `Var(U_X) / (kT^2 N_X)` for one energy bucket.
    pub fn specific_heat_of(&self, region: Region) -> f64 {
        let variance = scalar_variance(&self.record, |r| r.energy(region));
        per_site(
            variance,
            self.parameters.kt.powi(2),
            self.region_count(region),
        )
    }

    /// `Var(M) / (kT N)` over the whole device.
    pub fn magnetic_susceptibility(&self) -> f64 {
        let variance = vector_variance(&self.record, |r| r.m);
        per_site(variance, self.parameters.kt, self.n())
    }

    /// `Var(M_X) / (kT N_X)` for one zone. Boundary buckets carry no magnetization and yield 0.
    pub fn magnetic_susceptibility_of(&self, zone: Region) -> f64 {
        if !zone.is_zone() {
            return 0.0;
        }
        let variance = vector_variance(&self.record, |r| {
            r.magnetization(zone).unwrap_or_else(Vector::zeros)
        });
        per_site(variance, self.parameters.kt, self.region_count(zone))
    }
}

fn per_site(variance: f64, scale: f64, sites: usize) -> f64 {
    if sites == 0 || scale == 0.0 {
        return 0.0;
    }
    variance / (scale * sites as f64)
}
