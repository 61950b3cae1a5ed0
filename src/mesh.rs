//! The mesh container produced by the mesher and consumed by the overlap builder.

/// Dense renumbering and incidence structure built on top of a [`MeshData`].
mod connectivity;
pub(crate) use connectivity::Connectivity;

pub(crate) mod subset;

/// Small structured meshes for tests and demos
/// (pub because the demos use them too.
/// meshes for real work should come from gmsh)
#[doc(hidden)]
pub mod fixtures;

//

use nalgebra as na;
use std::collections::{BTreeMap, BTreeSet};

/// Coordinates of a mesh node.
///
/// Meshes of dimension below 3 keep the unused components at zero,
/// which is also what gmsh writes.
pub type Coords = na::Vector3<f64>;

/// Error in the structure of a [`MeshData`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MeshError {
    /// Only meshes of dimension 1, 2 and 3 are supported.
    #[error("Unsupported mesh dimension {0}")]
    UnsupportedDimension(usize),
    /// An element refers to a node that isn't in the node map.
    #[error("Element {element} refers to missing node {node}")]
    MissingNode {
        /// Id of the offending element.
        element: usize,
        /// Id of the node that doesn't exist.
        node: usize,
    },
    /// An element has the wrong number of nodes for its type.
    #[error("Element {element} of type {element_type:?} has {found} nodes, expected {expected}")]
    NodeCountMismatch {
        /// Id of the offending element.
        element: usize,
        /// Declared type of the element.
        element_type: ElementType,
        /// Number of nodes the type requires.
        expected: usize,
        /// Number of nodes the element has.
        found: usize,
    },
    /// A partition refers to an element that isn't in the element map.
    #[error("Partition {partition} refers to missing element {element}")]
    MissingPartitionElement {
        /// Id of the partition.
        partition: usize,
        /// Id of the element that doesn't exist.
        element: usize,
    },
    /// A physical group refers to an element that isn't in the element map.
    #[error("Physical group `{group}` refers to missing element {element}")]
    MissingGroupElement {
        /// Name of the group.
        group: String,
        /// Id of the element that doesn't exist.
        element: usize,
    },
}

/// Geometric type of a first-order element.
///
/// Node orderings follow the gmsh conventions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementType {
    /// A single node.
    Point,
    /// Two-node line segment.
    Line,
    /// Three-node triangle.
    Triangle,
    /// Four-node quadrangle.
    Quadrangle,
    /// Four-node tetrahedron.
    Tetrahedron,
    /// Eight-node hexahedron.
    Hexahedron,
}

impl ElementType {
    /// Topological dimension of the element.
    #[inline]
    pub fn dim(self) -> usize {
        match self {
            Self::Point => 0,
            Self::Line => 1,
            Self::Triangle | Self::Quadrangle => 2,
            Self::Tetrahedron | Self::Hexahedron => 3,
        }
    }

    /// Number of nodes an element of this type has.
    #[inline]
    pub fn node_count(self) -> usize {
        match self {
            Self::Point => 1,
            Self::Line => 2,
            Self::Triangle => 3,
            Self::Quadrangle | Self::Tetrahedron => 4,
            Self::Hexahedron => 8,
        }
    }

    /// Type of the `dim - 1`-dimensional entities bounding this element,
    /// or `None` for points.
    pub fn facet_type(self) -> Option<ElementType> {
        match self {
            Self::Point => None,
            Self::Line => Some(Self::Point),
            Self::Triangle | Self::Quadrangle => Some(Self::Line),
            Self::Tetrahedron => Some(Self::Triangle),
            Self::Hexahedron => Some(Self::Quadrangle),
        }
    }

    /// Positions of each facet's nodes in the element's node list.
    pub(crate) fn facet_local_nodes(self) -> &'static [&'static [usize]] {
        match self {
            Self::Point => &[],
            Self::Line => LINE_FACETS,
            Self::Triangle => TRIANGLE_FACETS,
            Self::Quadrangle => QUADRANGLE_FACETS,
            Self::Tetrahedron => TETRAHEDRON_FACETS,
            Self::Hexahedron => HEXAHEDRON_FACETS,
        }
    }
}

// facet orientations follow gmsh's reference elements
const LINE_FACETS: &[&[usize]] = &[&[0], &[1]];
const TRIANGLE_FACETS: &[&[usize]] = &[&[0, 1], &[1, 2], &[2, 0]];
const QUADRANGLE_FACETS: &[&[usize]] = &[&[0, 1], &[1, 2], &[2, 3], &[3, 0]];
const TETRAHEDRON_FACETS: &[&[usize]] = &[&[0, 2, 1], &[0, 1, 3], &[0, 3, 2], &[1, 2, 3]];
#[rustfmt::skip]
const HEXAHEDRON_FACETS: &[&[usize]] = &[
    &[0, 3, 2, 1], &[0, 1, 5, 4], &[0, 4, 7, 3],
    &[1, 2, 6, 5], &[2, 3, 7, 6], &[4, 5, 6, 7],
];

/// A mesh element. Its id is the key it's stored under in [`MeshData::elements`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Element {
    /// Geometric type of the element.
    pub element_type: ElementType,
    /// Ids of the element's nodes, in the order of its type's convention.
    pub nodes: Vec<usize>,
    /// Tag of the physical entity the element was meshed from, if any.
    pub physical_tag: Option<i32>,
}

impl Element {
    /// Create an element without a physical tag.
    pub fn new(element_type: ElementType, nodes: impl Into<Vec<usize>>) -> Self {
        Self {
            element_type,
            nodes: nodes.into(),
            physical_tag: None,
        }
    }
}

/// A named set of elements, e.g. a boundary marker.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PhysicalGroup {
    /// Dimension of the group's elements.
    pub dim: usize,
    /// Integer tag of the group in the mesher, if it had one.
    pub tag: Option<i32>,
    /// Ids of the elements in the group.
    pub elements: BTreeSet<usize>,
}

/// A mesh with its partition and physical groups.
///
/// This is a passive container;
/// all maps are ordered so that everything derived from it is deterministic.
/// Use [`validate`][Self::validate] to check that the references between maps are consistent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    /// Dimension of the mesh, i.e. of its highest-dimensional elements.
    pub dim: usize,
    /// Node coordinates by node id.
    pub nodes: BTreeMap<usize, Coords>,
    /// Elements of every dimension by element id.
    pub elements: BTreeMap<usize, Element>,
    /// Sets of element ids by partition id.
    pub partitions: BTreeMap<usize, BTreeSet<usize>>,
    /// Physical groups by name.
    pub physical_groups: BTreeMap<String, PhysicalGroup>,
}

impl MeshData {
    /// Create an empty mesh of the given dimension.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            ..Default::default()
        }
    }

    /// Insert a node, replacing any node with the same id.
    pub fn add_node(&mut self, id: usize, coords: Coords) {
        self.nodes.insert(id, coords);
    }

    /// Insert an element without a physical tag, replacing any element with the same id.
    pub fn add_element(
        &mut self,
        id: usize,
        element_type: ElementType,
        nodes: impl Into<Vec<usize>>,
    ) {
        self.elements.insert(id, Element::new(element_type, nodes));
    }

    /// Insert a physical group, replacing any group with the same name.
    pub fn add_physical_group(
        &mut self,
        name: impl Into<String>,
        dim: usize,
        tag: Option<i32>,
        elements: impl IntoIterator<Item = usize>,
    ) {
        self.physical_groups.insert(
            name.into(),
            PhysicalGroup {
                dim,
                tag,
                elements: elements.into_iter().collect(),
            },
        );
    }

    /// Iterate over the elements of the mesh's own dimension,
    /// which are the ones partitions and overlaps are made of.
    pub fn domain_elements(&self) -> impl Iterator<Item = (usize, &Element)> + '_ {
        self.elements
            .iter()
            .filter(move |(_, el)| el.element_type.dim() == self.dim)
            .map(|(id, el)| (*id, el))
    }

    /// Dimension of the element with the given id, if it exists.
    #[inline]
    pub fn element_dim(&self, id: usize) -> Option<usize> {
        self.elements.get(&id).map(|el| el.element_type.dim())
    }

    /// Average of an element's node coordinates.
    ///
    /// Returns None if any of its nodes is missing.
    pub fn centroid(&self, element: &Element) -> Option<Coords> {
        let mut sum = Coords::zeros();
        for node in &element.nodes {
            sum += self.nodes.get(node)?;
        }
        Some(sum / element.nodes.len().max(1) as f64)
    }

    /// Create a copy of this mesh with its partitions replaced
    /// by the given `(element id, partition id)` assignment.
    pub fn with_partitions(&self, assignment: impl IntoIterator<Item = (usize, usize)>) -> Self {
        let mut partitions: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
        for (element, partition) in assignment {
            partitions.entry(partition).or_default().insert(element);
        }
        Self {
            partitions,
            ..self.clone()
        }
    }

    /// Create a copy of this mesh partitioned by a function
    /// that takes a domain element and its centroid and returns a partition id.
    ///
    /// Useful for simple geometric partitions;
    /// graph partitions (e.g. from METIS) can be passed in with [`with_partitions`][Self::with_partitions].
    pub fn partition_by(&self, mut assign: impl FnMut(&Element, Coords) -> usize) -> Self {
        let assignment: Vec<(usize, usize)> = self
            .domain_elements()
            .filter_map(|(id, el)| Some((id, assign(el, self.centroid(el)?))))
            .collect();
        self.with_partitions(assignment)
    }

    /// Check that every reference in the mesh points to something that exists.
    pub fn validate(&self) -> Result<(), MeshError> {
        if !(1..=3).contains(&self.dim) {
            return Err(MeshError::UnsupportedDimension(self.dim));
        }

        for (&id, element) in &self.elements {
            let expected = element.element_type.node_count();
            if element.nodes.len() != expected {
                return Err(MeshError::NodeCountMismatch {
                    element: id,
                    element_type: element.element_type,
                    expected,
                    found: element.nodes.len(),
                });
            }
            if let Some(&node) = element.nodes.iter().find(|n| !self.nodes.contains_key(n)) {
                return Err(MeshError::MissingNode { element: id, node });
            }
        }

        for (&partition, elements) in &self.partitions {
            if let Some(&element) = elements.iter().find(|e| !self.elements.contains_key(e)) {
                return Err(MeshError::MissingPartitionElement { partition, element });
            }
        }

        for (name, group) in &self.physical_groups {
            if let Some(&element) = group.elements.iter().find(|e| !self.elements.contains_key(e)) {
                return Err(MeshError::MissingGroupElement {
                    group: name.clone(),
                    element,
                });
            }
        }

        Ok(())
    }
}
