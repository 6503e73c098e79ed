use super::error::MsdError;
use crate::core::error::RangeError;
use crate::core::models::molecule::MoleculeGraph;
use crate::core::models::region::Region;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use tracing::debug;

/// Bounds of a device: a `width x height x depth` cuboid with the molecule spanning columns
/// `mol_pos_l..=mol_pos_r`. The left ferromagnet occupies rows `top_l..=bottom_l` left of the
/// span, the right one occupies layers `front_r..=back_r` right of it.
///
/// Constructors clamp out-of-range values; a `Geometry` obtained from them is always
/// self-consistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Geometry {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
    pub mol_pos_l: usize,
    pub mol_pos_r: usize,
    pub top_l: usize,
    pub bottom_l: usize,
    pub front_r: usize,
    pub back_r: usize,
}

impl Geometry {
    #[allow(clippy::too_many_arguments)]
    pub fn full(
        width: usize,
        height: usize,
        depth: usize,
        mol_pos_l: usize,
        mol_pos_r: usize,
        top_l: usize,
        bottom_l: usize,
        front_r: usize,
        back_r: usize,
    ) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let depth = depth.max(1);

        let mol_pos_l = mol_pos_l.min(width);
        let mut mol_pos_r = mol_pos_r.min(width - 1);
        if mol_pos_r + 1 < mol_pos_l {
            mol_pos_r = mol_pos_l - 1;
        }

        Self {
            width,
            height,
            depth,
            mol_pos_l,
            mol_pos_r,
            top_l: top_l.min(height),
            bottom_l: bottom_l.min(height - 1),
            front_r: front_r.min(depth),
            back_r: back_r.min(depth - 1),
        }
    }

    /// A one- or two-column molecule in the middle, both ferromagnets spanning the whole
    /// cross-section.
    pub fn centered(width: usize, height: usize, depth: usize) -> Self {
        let (w, h, d) = (width.max(1), height.max(1), depth.max(1));
        Self::full(w, h, d, (w - 1) / 2, w / 2, 0, h - 1, 0, d - 1)
    }

    /// A single-column molecule in the middle, with the left ferromagnet `height_l` rows tall
    /// and the right one `depth_r` layers deep, both centered on the cross-section.
    pub fn with_leads(
        width: usize,
        height: usize,
        depth: usize,
        height_l: usize,
        depth_r: usize,
    ) -> Self {
        let (w, h, d) = (width.max(1), height.max(1), depth.max(1));
        let (top_l, bottom_l) = centered_band(h, height_l);
        let (front_r, back_r) = centered_band(d, depth_r);
        let mol = (w - 1) / 2;
        Self::full(w, h, d, mol, mol, top_l, bottom_l, front_r, back_r)
    }

    /// A molecule of `node_count` columns starting at `mol_pos_l`, ferromagnets spanning the
    /// whole cross-section.
    pub fn anchored(
        width: usize,
        height: usize,
        depth: usize,
        mol_pos_l: usize,
        node_count: usize,
    ) -> Self {
        let (w, h, d) = (width.max(1), height.max(1), depth.max(1));
        let mol_pos_r = (mol_pos_l + node_count).saturating_sub(1);
        Self::full(w, h, d, mol_pos_l, mol_pos_r, 0, h - 1, 0, d - 1)
    }

    /// Number of positions in the cuboid, occupied or not.
    pub fn len(&self) -> usize {
        self.width * self.height * self.depth
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn index(&self, x: usize, y: usize, z: usize) -> Result<usize, RangeError> {
        if x < self.width && y < self.height && z < self.depth {
            Ok((z * self.height + y) * self.width + x)
        } else {
            Err(RangeError::Coordinates {
                x,
                y,
                z,
                width: self.width,
                height: self.height,
                depth: self.depth,
            })
        }
    }

    pub fn coords(&self, index: usize) -> (usize, usize, usize) {
        let x = index % self.width;
        let yz = index / self.width;
        (x, yz % self.height, yz / self.height)
    }

    pub fn has_left(&self) -> bool {
        self.mol_pos_l != 0
    }

    pub fn has_right(&self) -> bool {
        self.mol_pos_r + 1 < self.width
    }

    pub fn has_molecule(&self) -> bool {
        self.mol_pos_l <= self.mol_pos_r
    }

    /// Number of columns covered by the molecule.
    pub fn span(&self) -> usize {
        (self.mol_pos_r + 1).saturating_sub(self.mol_pos_l)
    }

    fn rows_l(&self) -> RangeInclusive<usize> {
        self.top_l..=self.bottom_l
    }

    fn layers_r(&self) -> RangeInclusive<usize> {
        self.front_r..=self.back_r
    }

    /// Whether a molecule instance sits at cross-section position `(y, z)`: the outline of the
    /// overlap between the two ferromagnets' cross-sections.
    pub fn is_frame(&self, y: usize, z: usize) -> bool {
        ((y == self.top_l || y == self.bottom_l) && self.layers_r().contains(&z))
            || ((z == self.front_r || z == self.back_r) && self.rows_l().contains(&y))
    }

    /// The zone occupying `(x, y, z)`, or `None` for a vacant position.
    pub fn zone_at(&self, x: usize, y: usize, z: usize) -> Option<Region> {
        if x < self.mol_pos_l {
            self.rows_l().contains(&y).then_some(Region::Left)
        } else if x > self.mol_pos_r {
            self.layers_r().contains(&z).then_some(Region::Right)
        } else {
            self.is_frame(y, z).then_some(Region::Molecule)
        }
    }
}

fn centered_band(extent: usize, size: usize) -> (usize, usize) {
    let last = extent as i64 - 1;
    let size = size as i64;
    let low = (last - size).div_euclid(2) + (last - size).rem_euclid(2);
    let high = (last + size).div_euclid(2);
    (low.max(0) as usize, high.max(0) as usize)
}

/// Classification of an occupied position, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Site {
    pub zone: Region,
    /// Molecule node this site instantiates.
    pub node: Option<usize>,
}

/// One end of a bond, as stored with the site it is incident to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bond {
    pub neighbor: usize,
    /// Bucket the bond's energy is accounted to.
    pub region: Region,
    /// Molecule edge supplying the coefficients; `None` uses the lattice-level ones for `region`.
    pub edge: Option<usize>,
    /// Whether this site is the first operand of the directional term.
    pub leading: bool,
}

/// Per-site bond lists in compressed form.
#[derive(Debug, Clone, Default)]
pub struct BondTable {
    offsets: Vec<usize>,
    bonds: Vec<Bond>,
}

impl BondTable {
    fn build(len: usize, pairs: &[(usize, usize, Region, Option<usize>)]) -> Self {
        let mut degree = vec![0usize; len];
        for &(a, b, ..) in pairs {
            degree[a] += 1;
            degree[b] += 1;
        }
        let mut offsets = Vec::with_capacity(len + 1);
        offsets.push(0);
        for d in &degree {
            offsets.push(offsets[offsets.len() - 1] + d);
        }

        let placeholder = Bond {
            neighbor: 0,
            region: Region::Left,
            edge: None,
            leading: false,
        };
        let mut bonds = vec![placeholder; offsets[len]];
        let mut fill = offsets[..len].to_vec();
        for &(a, b, region, edge) in pairs {
            bonds[fill[a]] = Bond {
                neighbor: b,
                region,
                edge,
                leading: true,
            };
            fill[a] += 1;
            bonds[fill[b]] = Bond {
                neighbor: a,
                region,
                edge,
                leading: false,
            };
            fill[b] += 1;
        }
        Self { offsets, bonds }
    }

    /// Bonds incident to position `index`.
    pub fn of(&self, index: usize) -> &[Bond] {
        match (self.offsets.get(index), self.offsets.get(index + 1)) {
            (Some(&start), Some(&end)) => &self.bonds[start..end],
            _ => &[],
        }
    }

    /// Every bond exactly once, as `(leading site, bond)`.
    pub fn unique(&self) -> impl Iterator<Item = (usize, &Bond)> + '_ {
        self.offsets
            .iter()
            .tuple_windows()
            .enumerate()
            .flat_map(move |(site, (&start, &end))| {
                self.bonds[start..end].iter().map(move |b| (site, b))
            })
            .filter(|(_, b)| b.leading)
    }

    pub fn len(&self) -> usize {
        self.bonds.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.bonds.is_empty()
    }
}

/// Site classification and bond table derived from a geometry and a molecule.
#[derive(Debug, Clone)]
pub(crate) struct Layout {
    pub sites: Vec<Option<Site>>,
    pub occupied: Vec<usize>,
    pub bonds: BondTable,
    pub counts: [usize; 6],
}

impl Layout {
    pub fn new(geometry: &Geometry, molecule: &MoleculeGraph) -> Result<Self, MsdError> {
        let g = geometry;
        if molecule.node_count() != g.span() {
            return Err(MsdError::Molecule(format!(
                "molecule has {} nodes but the span {}..={} holds {}",
                molecule.node_count(),
                g.mol_pos_l,
                g.mol_pos_r,
                g.span()
            )));
        }

        let mut sites = Vec::with_capacity(g.len());
        let mut occupied = Vec::new();
        for index in 0..g.len() {
            let (x, y, z) = g.coords(index);
            let site = g.zone_at(x, y, z).map(|zone| Site {
                zone,
                node: (zone == Region::Molecule).then(|| x - g.mol_pos_l),
            });
            if site.is_some() {
                occupied.push(index);
            }
            sites.push(site);
        }

        let pairs = collect_bonds(g, molecule, &sites)?;
        let bonds = BondTable::build(g.len(), &pairs);

        let mut counts = [0usize; 6];
        for site in sites.iter().flatten() {
            counts[site.zone as usize] += 1;
        }
        for region in [
            Region::MoleculeLeft,
            Region::MoleculeRight,
            Region::LeftRight,
        ] {
            let mut touched = vec![false; g.len()];
            for &(a, b, r, _) in &pairs {
                if r == region {
                    touched[a] = true;
                    touched[b] = true;
                }
            }
            counts[region as usize] = touched.iter().filter(|&&t| t).count();
        }

        debug!(
            sites = occupied.len(),
            bonds = bonds.len(),
            "Computed lattice layout"
        );
        Ok(Self {
            sites,
            occupied,
            bonds,
            counts,
        })
    }
}

fn collect_bonds(
    g: &Geometry,
    molecule: &MoleculeGraph,
    sites: &[Option<Site>],
) -> Result<Vec<(usize, usize, Region, Option<usize>)>, MsdError> {
    let mut pairs = Vec::new();
    let mut push = |a: usize, b: usize, region: Region, edge: Option<usize>| {
        for end in [a, b] {
            if sites.get(end).copied().flatten().is_none() {
                return Err(MsdError::Internal(format!(
                    "{region} bond {a} -> {b} references vacant position {end}"
                )));
            }
        }
        pairs.push((a, b, region, edge));
        Ok(())
    };

    for index in 0..g.len() {
        let Some(site) = sites[index] else { continue };
        if site.zone == Region::Molecule {
            continue;
        }
        let (x, y, z) = g.coords(index);
        for (nx, ny, nz) in [(x + 1, y, z), (x, y + 1, z), (x, y, z + 1)] {
            let Ok(neighbor) = g.index(nx, ny, nz) else {
                continue;
            };
            if sites[neighbor].map(|s| s.zone) == Some(site.zone) {
                push(index, neighbor, site.zone, None)?;
            }
        }
    }

    if g.has_molecule() {
        let (left_lead, right_lead) = molecule.leads();
        for z in 0..g.depth {
            for y in 0..g.height {
                if !g.is_frame(y, z) {
                    continue;
                }
                let node = |n: usize| g.index(g.mol_pos_l + n, y, z);
                for (e, edge) in molecule.edges() {
                    if !edge.is_loop() {
                        push(node(edge.src)?, node(edge.dest)?, Region::Molecule, Some(e))?;
                    }
                }
                if g.has_left() {
                    let lead = g.index(g.mol_pos_l - 1, y, z)?;
                    push(lead, node(left_lead)?, Region::MoleculeLeft, None)?;
                }
                if g.has_right() {
                    let lead = g.index(g.mol_pos_r + 1, y, z)?;
                    push(node(right_lead)?, lead, Region::MoleculeRight, None)?;
                }
            }
        }
    }

    if g.has_left() && g.has_right() {
        for z in g.layers_r() {
            for y in g.rows_l() {
                let a = g.index(g.mol_pos_l - 1, y, z)?;
                let b = g.index(g.mol_pos_r + 1, y, z)?;
                push(a, b, Region::LeftRight, None)?;
            }
        }
    }

    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_clamps_out_of_range_bounds() {
        let g = Geometry::full(0, 0, 0, 5, 9, 3, 9, 4, 9);
        assert_eq!((g.width, g.height, g.depth), (1, 1, 1));
        assert_eq!((g.mol_pos_l, g.mol_pos_r), (1, 0));
        assert_eq!((g.top_l, g.bottom_l), (1, 0));
        assert_eq!((g.front_r, g.back_r), (1, 0));
        assert!(!g.has_molecule());
        assert!(g.has_left());
        assert!(!g.has_right());
    }

    #[test]
    fn mol_pos_r_is_raised_to_an_empty_span() {
        let g = Geometry::full(10, 1, 1, 6, 2, 0, 0, 0, 0);
        assert_eq!((g.mol_pos_l, g.mol_pos_r), (6, 5));
        assert_eq!(g.span(), 0);
    }

    #[test]
    fn centered_geometry_splits_the_width() {
        let odd = Geometry::centered(5, 3, 2);
        assert_eq!((odd.mol_pos_l, odd.mol_pos_r), (2, 2));
        assert_eq!((odd.bottom_l, odd.back_r), (2, 1));
        let even = Geometry::centered(6, 1, 1);
        assert_eq!((even.mol_pos_l, even.mol_pos_r), (2, 3));
    }

    #[test]
    fn with_leads_centers_the_lead_bands() {
        let g = Geometry::with_leads(5, 5, 6, 1, 2);
        assert_eq!((g.mol_pos_l, g.mol_pos_r), (2, 2));
        assert_eq!((g.top_l, g.bottom_l), (2, 2));
        assert_eq!((g.front_r, g.back_r), (2, 3));
        let oversized = Geometry::with_leads(3, 2, 2, 10, 10);
        assert_eq!((oversized.top_l, oversized.bottom_l), (0, 1));
    }

    #[test]
    fn anchored_span_follows_node_count() {
        let g = Geometry::anchored(10, 2, 2, 3, 4);
        assert_eq!((g.mol_pos_l, g.mol_pos_r), (3, 6));
        assert_eq!(g.span(), 4);
    }

    #[test]
    fn index_and_coords_are_inverse() {
        let g = Geometry::centered(4, 3, 2);
        for index in 0..g.len() {
            let (x, y, z) = g.coords(index);
            assert_eq!(g.index(x, y, z).unwrap(), index);
        }
        assert_eq!(g.index(1, 2, 1).unwrap(), (1 * 3 + 2) * 4 + 1);
    }

    #[test]
    fn index_rejects_out_of_range_coordinates() {
        let g = Geometry::centered(4, 3, 2);
        assert!(matches!(
            g.index(4, 0, 0),
            Err(RangeError::Coordinates { x: 4, width: 4, .. })
        ));
        assert!(g.index(0, 3, 0).is_err());
        assert!(g.index(0, 0, 2).is_err());
    }

    #[test]
    fn zone_classification_respects_lead_bands_and_frame() {
        let g = Geometry::full(5, 4, 4, 2, 2, 1, 2, 1, 2);
        assert_eq!(g.zone_at(0, 1, 0), Some(Region::Left));
        assert_eq!(g.zone_at(0, 0, 0), None);
        assert_eq!(g.zone_at(4, 0, 2), Some(Region::Right));
        assert_eq!(g.zone_at(4, 0, 3), None);
        assert_eq!(g.zone_at(2, 1, 1), Some(Region::Molecule));
        assert_eq!(g.zone_at(2, 0, 0), None);

        let thick = Geometry::full(3, 5, 5, 1, 1, 0, 4, 0, 4);
        assert!(thick.is_frame(0, 2));
        assert!(thick.is_frame(2, 4));
        assert!(!thick.is_frame(2, 2));
    }

    fn layout(g: Geometry) -> Layout {
        Layout::new(&g, &MoleculeGraph::linear(g.span())).unwrap()
    }

    fn bonds_in(layout: &Layout, region: Region) -> usize {
        layout
            .bonds
            .unique()
            .filter(|(_, b)| b.region == region)
            .count()
    }

    #[test]
    fn single_row_device_has_one_bond_per_boundary() {
        let l = layout(Geometry::full(5, 1, 1, 2, 2, 0, 0, 0, 0));
        assert_eq!(l.occupied.len(), 5);
        assert_eq!(bonds_in(&l, Region::Left), 1);
        assert_eq!(bonds_in(&l, Region::Right), 1);
        assert_eq!(bonds_in(&l, Region::Molecule), 0);
        assert_eq!(bonds_in(&l, Region::MoleculeLeft), 1);
        assert_eq!(bonds_in(&l, Region::MoleculeRight), 1);
        assert_eq!(bonds_in(&l, Region::LeftRight), 1);
        assert_eq!(l.counts, [2, 2, 1, 2, 2, 2]);
    }

    #[test]
    fn bond_directions_follow_the_device_layout() {
        let g = Geometry::full(4, 1, 1, 1, 2, 0, 0, 0, 0);
        let l = layout(g);
        let lead_left: Vec<_> = l
            .bonds
            .unique()
            .filter(|(_, b)| b.region == Region::MoleculeLeft)
            .map(|(a, b)| (a, b.neighbor))
            .collect();
        assert_eq!(lead_left, vec![(0, 1)]);
        let lead_right: Vec<_> = l
            .bonds
            .unique()
            .filter(|(_, b)| b.region == Region::MoleculeRight)
            .map(|(a, b)| (a, b.neighbor))
            .collect();
        assert_eq!(lead_right, vec![(2, 3)]);
        let mol: Vec<_> = l
            .bonds
            .unique()
            .filter(|(_, b)| b.region == Region::Molecule)
            .map(|(a, b)| (a, b.neighbor, b.edge))
            .collect();
        assert_eq!(mol, vec![(1, 2, Some(0))]);
    }

    #[test]
    fn every_bond_is_stored_from_both_ends() {
        let l = layout(Geometry::centered(5, 3, 3));
        for &site in &l.occupied {
            for bond in l.bonds.of(site) {
                let back = l
                    .bonds
                    .of(bond.neighbor)
                    .iter()
                    .filter(|b| b.neighbor == site && b.region == bond.region)
                    .count();
                assert!(back >= 1);
                assert!(
                    l.bonds
                        .of(bond.neighbor)
                        .iter()
                        .any(|b| b.neighbor == site && b.leading != bond.leading)
                );
            }
        }
    }

    #[test]
    fn lattice_bonds_connect_nearest_neighbors_within_a_zone() {
        let g = Geometry::full(6, 2, 2, 3, 2, 0, 1, 0, 1);
        let l = layout(g);
        assert!(!g.has_molecule());
        // 3x2x2 left block: 2*2*2 x-bonds + 3*1*2 y-bonds + 3*2*1 z-bonds.
        assert_eq!(bonds_in(&l, Region::Left), 8 + 6 + 6);
        assert_eq!(bonds_in(&l, Region::LeftRight), 4);
        assert_eq!(l.counts[Region::LeftRight as usize], 8);
    }

    #[test]
    fn molecule_instances_sit_on_the_frame() {
        let g = Geometry::full(3, 3, 3, 1, 1, 0, 2, 0, 2);
        let l = layout(g);
        assert_eq!(l.counts[Region::Molecule as usize], 8);
        assert_eq!(bonds_in(&l, Region::MoleculeLeft), 8);
        assert_eq!(bonds_in(&l, Region::MoleculeRight), 8);
        assert_eq!(bonds_in(&l, Region::LeftRight), 9);
    }

    #[test]
    fn self_loops_produce_no_bonds() {
        let g = Geometry::full(3, 1, 1, 1, 1, 0, 0, 0, 0);
        let mut mol = MoleculeGraph::linear(1);
        mol.connect_nodes(0, 0, Default::default()).unwrap();
        let l = Layout::new(&g, &mol).unwrap();
        assert_eq!(bonds_in(&l, Region::Molecule), 0);
    }

    #[test]
    fn molecule_must_fill_the_span() {
        let g = Geometry::full(5, 1, 1, 1, 3, 0, 0, 0, 0);
        let err = Layout::new(&g, &MoleculeGraph::linear(2)).unwrap_err();
        assert!(matches!(err, MsdError::Molecule(_)));
    }

    #[test]
    fn inverted_lead_band_leaves_frame_bonds_dangling() {
        let g = Geometry::full(3, 4, 1, 1, 1, 3, 1, 0, 0);
        let err = Layout::new(&g, &MoleculeGraph::linear(1)).unwrap_err();
        assert!(matches!(err, MsdError::Internal(_)));
    }
}
