use super::config::{FlipModel, SiteSelection};
use super::geometry::Site;
use super::lattice::Lattice;
use crate::core::vector::Vector;
use rand::{Rng, RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use tracing::{debug, instrument, trace};

/// Draws a fresh seed from the thread-local entropy source.
pub fn gen_seed() -> u64 {
    rand::thread_rng().r#gen()
}

/// Seed for the `index`-th of several chains sharing `base`.
///
/// Each index takes the first output of the base stream jumped forward `index` times, so the
/// chains start from non-overlapping subsequences of one xoshiro256** stream.
pub fn derive_seed(base: u64, index: u64) -> u64 {
    let mut rng = Xoshiro256StarStar::seed_from_u64(base);
    for _ in 0..index {
        rng.jump();
    }
    rng.next_u64()
}

impl Lattice {
    /// Runs `steps` single-site Metropolis steps and advances `t` by `steps`.
    pub fn metropolis(&mut self, steps: u64) {
        let mut accepted = 0u64;
        for _ in 0..steps {
            if self.step() {
                accepted += 1;
            }
        }
        self.results.t += steps;
        debug!(steps, accepted, t = self.results.t, "Metropolis run finished.");
    }

    /// Like [`Self::metropolis`], recording a sample before the first chunk of `frequency` steps
    /// and after every chunk, the last partial one included. A zero `frequency` records nothing.
    #[instrument(skip_all, name = "metropolis_recorded", fields(steps, frequency))]
    pub fn metropolis_recorded(&mut self, steps: u64, frequency: u64) {
        if frequency == 0 {
            self.metropolis(steps);
            return;
        }
        self.record_sample();
        let mut remaining = steps;
        while remaining > 0 {
            let chunk = remaining.min(frequency);
            self.metropolis(chunk);
            self.record_sample();
            remaining -= chunk;
        }
    }

    /// One proposal and acceptance test. Returns whether the move was committed.
    fn step(&mut self) -> bool {
        let Some(index) = self.select_site() else {
            return false;
        };
        let Some(site) = self.layout.sites[index] else {
            return false;
        };
        let (spin, flux) = self.propose(index, site);
        let delta = self.move_delta(index, site, spin, flux);
        let du = delta.energy();
        let accept = du <= 0.0 || self.uniform() < (-du / self.parameters.kt).exp();
        trace!(index, du, accept, "Metropolis step.");
        if accept {
            self.apply_move(delta);
        }
        accept
    }

    fn select_site(&mut self) -> Option<usize> {
        let n = self.layout.occupied.len();
        if n == 0 {
            return None;
        }
        let slot = match self.site_selection {
            SiteSelection::Random => ((self.uniform() * n as f64) as usize).min(n - 1),
            SiteSelection::Sequential => {
                let slot = self.cursor % n;
                self.cursor = (slot + 1) % n;
                slot
            }
        };
        Some(self.layout.occupied[slot])
    }

    fn propose(&mut self, index: usize, site: Site) -> (Vector, Vector) {
        match self.flip_model {
            FlipModel::Discrete => (-self.spins[index], self.fluxes[index]),
            FlipModel::Continuous => {
                let c = self.site_coefficients(site);
                let spin = self.random_direction(c.s);
                let magnitude = c.f * self.uniform();
                let flux = self.random_direction(magnitude);
                (spin, flux)
            }
        }
    }
}
