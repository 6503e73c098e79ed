use super::lattice::Lattice;
use crate::core::models::region::Region;
use crate::core::vector::Vector;
use std::iter::FusedIterator;

/// A snapshot of one occupied site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SiteRef {
    pub x: usize,
    pub y: usize,
    pub z: usize,
    pub index: usize,
    pub region: Region,
    pub spin: Vector,
    pub flux: Vector,
}

impl SiteRef {
    pub fn local_m(&self) -> Vector {
        self.spin + self.flux
    }
}

/// Occupied sites in ascending linear index, created by [`Lattice::sites`].
///
/// Cloning the iterator restarts nothing; call [`Lattice::sites`] again for a fresh pass.
#[derive(Debug, Clone)]
pub struct Sites<'a> {
    lattice: &'a Lattice,
    front: usize,
    back: usize,
}

impl<'a> Sites<'a> {
    fn new(lattice: &'a Lattice) -> Self {
        Self {
            lattice,
            front: 0,
            back: lattice.layout.occupied.len(),
        }
    }

    /// The `i`-th remaining site, without advancing.
    pub fn get(&self, i: usize) -> Option<SiteRef> {
        let slot = self.front.checked_add(i)?;
        if slot >= self.back {
            return None;
        }
        self.at(slot)
    }

    fn at(&self, slot: usize) -> Option<SiteRef> {
        let lattice = self.lattice;
        let index = *lattice.layout.occupied.get(slot)?;
        let site = lattice.layout.sites[index]?;
        let (x, y, z) = lattice.geometry.coords(index);
        Some(SiteRef {
            x,
            y,
            z,
            index,
            region: site.zone,
            spin: lattice.spins[index],
            flux: lattice.fluxes[index],
        })
    }
}

impl Iterator for Sites<'_> {
    type Item = SiteRef;

    fn next(&mut self) -> Option<SiteRef> {
        if self.front >= self.back {
            return None;
        }
        let item = self.at(self.front);
        self.front += 1;
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.back - self.front;
        (n, Some(n))
    }

    fn nth(&mut self, n: usize) -> Option<SiteRef> {
        self.front = self.front.saturating_add(n).min(self.back);
        self.next()
    }
}

impl DoubleEndedIterator for Sites<'_> {
    fn next_back(&mut self) -> Option<SiteRef> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        self.at(self.back)
    }
}

impl ExactSizeIterator for Sites<'_> {}
impl FusedIterator for Sites<'_> {}

impl Lattice {
    /// Iterates the occupied sites in linear order.
    pub fn sites(&self) -> Sites<'_> {
        Sites::new(self)
    }
}
