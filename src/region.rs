//! Control-region predicates and element classification.
//!
//! The control region is the sub-domain on which the control variable is
//! active and penalized. It is a configuration input, not a hard-coded
//! policy: drivers pick one of a closed set of geometric predicates (or an
//! explicit element-id set) and pass it to the classifier, which turns it
//! into a per-element flag array. The flags are consumed both by the control
//! norm computation and by the external assembly step, so they are computed
//! once per mesh and cached until the geometry changes.
use crate::mesh::ControlMesh;
use log::debug;
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, OPoint, OVector, RealField, Scalar};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// A geometric predicate selecting the control region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "T: Serialize, OPoint<T, D>: Serialize, OVector<T, D>: Serialize",
    deserialize = "T: Deserialize<'de>, OPoint<T, D>: Deserialize<'de>, OVector<T, D>: Deserialize<'de>"
))]
pub enum ControlRegion<T, D>
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    /// An axis-aligned box given by its min and max corners (inclusive).
    Box { min: OPoint<T, D>, max: OPoint<T, D> },
    /// A ball given by its center and radius (boundary inclusive).
    Ball { center: OPoint<T, D>, radius: T },
    /// The half space on the side of the plane through `point` that the
    /// *outward-facing* `normal` points away from, i.e. all points with
    /// non-positive signed distance.
    HalfSpace { point: OPoint<T, D>, normal: OVector<T, D> },
    /// An explicit set of element indices.
    Elements(FxHashSet<usize>),
}

impl<T, D> ControlRegion<T, D>
where
    T: RealField,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    /// Whether the given point lies inside the region.
    ///
    /// For [`ControlRegion::Elements`] this is always `false`; membership of
    /// that variant is decided by element index alone.
    pub fn contains_point(&self, point: &OPoint<T, D>) -> bool {
        match self {
            ControlRegion::Box { min, max } => point
                .coords
                .iter()
                .zip(min.coords.iter().zip(max.coords.iter()))
                .all(|(x, (lo, hi))| lo <= x && x <= hi),
            ControlRegion::Ball { center, radius } => {
                (&point.coords - &center.coords).norm_squared() <= radius.clone() * radius.clone()
            }
            ControlRegion::HalfSpace { point: p0, normal } => {
                normal.dot(&(&point.coords - &p0.coords)) <= T::zero()
            }
            ControlRegion::Elements(_) => false,
        }
    }

    /// Whether the element with the given index and representative point
    /// (centroid) belongs to the control region.
    pub fn contains_element(&self, element_index: usize, centroid: &OPoint<T, D>) -> bool {
        match self {
            ControlRegion::Elements(elements) => elements.contains(&element_index),
            region => region.contains_point(centroid),
        }
    }
}

/// Per-element control-region flags for one mesh revision.
///
/// One boolean per element; flagged elements belong to the control region.
/// The stored revision identifies the mesh geometry the flags were computed
/// for, so that stale flags are never used after a mesh change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFlags {
    revision: u64,
    flags: Vec<bool>,
}

impl ControlFlags {
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Whether the given element belongs to the control region.
    ///
    /// # Panics
    ///
    /// Panics if `element_index` is out of range.
    pub fn is_flagged(&self, element_index: usize) -> bool {
        self.flags[element_index]
    }

    pub fn flags(&self) -> &[bool] {
        &self.flags
    }

    /// The number of elements inside the control region.
    pub fn num_flagged(&self) -> usize {
        self.flags.iter().filter(|&&flag| flag).count()
    }
}

/// Classifies mesh elements against a configured [`ControlRegion`].
#[derive(Debug, Clone)]
pub struct ElementClassifier<T, D>
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    region: ControlRegion<T, D>,
}

impl<T, D> ElementClassifier<T, D>
where
    T: RealField,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    pub fn new(region: ControlRegion<T, D>) -> Self {
        Self { region }
    }

    pub fn region(&self) -> &ControlRegion<T, D> {
        &self.region
    }

    /// Computes fresh flags for every element of the mesh.
    ///
    /// Deterministic and idempotent: reclassifying an unchanged mesh yields
    /// identical flags.
    pub fn classify<M>(&self, mesh: &M) -> ControlFlags
    where
        M: ControlMesh<T, D>,
    {
        let flags = (0..mesh.num_elements())
            .map(|i| self.region.contains_element(i, &mesh.element_centroid(i)))
            .collect();
        ControlFlags {
            revision: mesh.geometry_revision(),
            flags,
        }
    }

    /// Returns flags valid for the mesh's current geometry, reclassifying
    /// only if the cached flags are missing or stale.
    pub fn refreshed_flags<'f, M>(&self, mesh: &M, cache: &'f mut Option<ControlFlags>) -> &'f ControlFlags
    where
        M: ControlMesh<T, D>,
    {
        let stale = cache
            .as_ref()
            .map_or(false, |flags| flags.revision() != mesh.geometry_revision());
        if stale {
            debug!(
                "mesh geometry changed (revision {}), recomputing control-region flags",
                mesh.geometry_revision()
            );
            *cache = None;
        }
        cache.get_or_insert_with(|| self.classify(mesh))
    }
}
