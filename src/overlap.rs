//! Overlapping subdomains built from a partitioned mesh.
//!
//! Given a mesh whose domain elements are split into disjoint partitions,
//! [`Decomposition::build`] extends every partition by a number of element layers
//! and works out everything a domain decomposition solver needs to glue the pieces back together:
//!
//! - a submesh per subdomain with its own local node numbering
//!   and a physical group [`INTERFACE_GROUP`] marking the boundary created by the cut,
//! - which subdomains overlap which,
//! - the local nodes each subdomain shares with each neighbor,
//! - a partition of unity weighting the local nodes.
//!
//! ```
//! # use ddm_mesh::{mesh::fixtures, add_overlap};
//! // a line of 4 segments split in two halves
//! let mesh = fixtures::slabs(&fixtures::line_mesh(4), 2);
//! let decomposition = add_overlap(&mesh, 1).expect("mesh is partitioned");
//!
//! let left = decomposition.get(0).unwrap();
//! assert_eq!(left.local_to_global, vec![0, 1, 2, 3]);
//! assert!(left.neighbors.contains(&1));
//! ```

/// Partition of unity weights and transfer between global and local vectors.
mod unity;
pub use unity::{TransferError, Weighting};

//

use nalgebra as na;
use std::collections::{BTreeMap, BTreeSet};

use crate::mesh::{
    subset::{Elements, Nodes, Subset},
    Connectivity, Element, MeshData, MeshError, PhysicalGroup,
};

/// Name of the physical group holding the facets
/// where a subdomain was cut off from the rest of the mesh.
pub const INTERFACE_GROUP: &str = "interface";

/// Error in building a [`Decomposition`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OverlapError {
    /// The input mesh failed validation.
    #[error("Invalid mesh")]
    InvalidMesh(#[from] MeshError),
    /// The overlap depth was negative.
    #[error("Overlap depth must be non-negative, got {0}")]
    NegativeDepth(isize),
    /// The mesh has no partitions to build subdomains from.
    #[error("The mesh is not partitioned")]
    NoPartitions,
    /// A partition has no elements.
    #[error("Partition {0} has no elements")]
    EmptySubdomain(usize),
    /// A partition contains an element of lower dimension than the mesh.
    #[error("Partition {partition} contains element {element}, which is not a domain element")]
    NotADomainElement {
        /// Id of the partition.
        partition: usize,
        /// Id of the offending element.
        element: usize,
    },
    /// A domain element isn't in any partition.
    #[error("Element {0} is not in any partition")]
    UncoveredElement(usize),
    /// A domain element is in more than one partition.
    #[error("Element {element} is in both partition {first} and partition {second}")]
    OverlappingPartitions {
        /// Id of the offending element.
        element: usize,
        /// The first partition the element was found in.
        first: usize,
        /// The second partition the element was found in.
        second: usize,
    },
}

/// Parameters of the overlap construction.
///
/// Deserializable with serde; missing fields take their default values:
/// ```
/// # use ddm_mesh::{OverlapConfig, Weighting};
/// let config: OverlapConfig = serde_json::from_str(r#"{ "weighting": "uniform" }"#).unwrap();
/// assert_eq!(config, OverlapConfig { depth: 1, weighting: Weighting::Uniform });
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OverlapConfig {
    /// Number of element layers added around each partition.
    ///
    /// Signed so that configuration errors can be reported instead of wrapping around.
    pub depth: isize,
    /// How the partition of unity is weighted.
    pub weighting: Weighting,
}

impl Default for OverlapConfig {
    fn default() -> Self {
        Self {
            depth: 1,
            weighting: Weighting::default(),
        }
    }
}

/// One overlapping subdomain.
#[derive(Clone, Debug, PartialEq)]
pub struct Subdomain {
    /// The subdomain's submesh.
    ///
    /// Node ids are local, numbered `0..n` in ascending order of the global node ids.
    /// Element ids are the ones in the global mesh,
    /// except for the facets in [`INTERFACE_GROUP`]
    /// which get new ids above every id in the global mesh.
    /// The only partition in it is the original partition this subdomain grew from.
    pub mesh: MeshData,
    /// Ids of the subdomains sharing at least one node with this one.
    pub neighbors: BTreeSet<usize>,
    /// For each neighbor, the local indices of the nodes shared with it in ascending order.
    pub intersections: BTreeMap<usize, Vec<usize>>,
    /// Weight of each local node in the partition of unity.
    pub partition_of_unity: na::DVector<f64>,
    /// Global node id of each local node.
    pub local_to_global: Vec<usize>,
    /// position of each local node in `Decomposition::global_node_ids`
    global_indices: Vec<usize>,
}

impl Subdomain {
    /// Number of local nodes.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.local_to_global.len()
    }

    /// Ids of the elements in the original partition this subdomain grew from.
    pub fn partition_elements(&self) -> impl Iterator<Item = usize> + '_ {
        self.mesh.partitions.values().flatten().copied()
    }
}

/// The overlapping subdomains of a partitioned mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct Decomposition {
    subdomains: BTreeMap<usize, Subdomain>,
    /// ids of the nodes used by domain elements, ascending
    global_nodes: Vec<usize>,
}

/// Build overlapping subdomains `depth` element layers deep
/// with the default partition of unity weighting.
///
/// Shorthand for [`Decomposition::build`].
pub fn add_overlap(mesh: &MeshData, depth: isize) -> Result<Decomposition, OverlapError> {
    Decomposition::build(
        mesh,
        &OverlapConfig {
            depth,
            ..Default::default()
        },
    )
}

impl Decomposition {
    /// Build the overlapping subdomains of a partitioned mesh.
    ///
    /// Every partition in `mesh.partitions` becomes a subdomain with the same id.
    /// The partitions must be nonempty, disjoint,
    /// contain only elements of the mesh's dimension, and together cover all of them.
    pub fn build(mesh: &MeshData, config: &OverlapConfig) -> Result<Self, OverlapError> {
        let depth =
            usize::try_from(config.depth).map_err(|_| OverlapError::NegativeDepth(config.depth))?;
        let conn = Connectivity::new(mesh)?;
        let cores = partition_subsets(mesh, &conn)?;

        // grow every partition layer by layer
        let mut extended: BTreeMap<usize, (Subset<Nodes>, Subset<Elements>)> = BTreeMap::new();
        for (&id, core) in &cores {
            let mut elements = core.clone();
            let mut nodes = conn.nodes_of(&elements);
            for _ in 0..depth {
                conn.grow(&mut nodes, &mut elements);
            }
            extended.insert(id, (nodes, elements));
        }

        let core_nodes: BTreeMap<usize, Subset<Nodes>> = cores
            .iter()
            .map(|(&id, core)| (id, conn.nodes_of(core)))
            .collect();
        let extended_nodes: BTreeMap<usize, &Subset<Nodes>> =
            extended.iter().map(|(&id, (nodes, _))| (id, nodes)).collect();
        let mut weights = config
            .weighting
            .weights(conn.node_count(), &core_nodes, &extended_nodes);

        // the next free element id for interface facets
        let first_new_id = mesh.elements.keys().next_back().map_or(0, |id| id + 1);

        let mut subdomains = BTreeMap::new();
        for (&id, (nodes, elements)) in &extended {
            // dense global index -> local index
            let mut to_local: Vec<Option<usize>> = vec![None; conn.node_count()];
            for (local, global) in nodes.iter().enumerate() {
                to_local[global] = Some(local);
            }

            let neighbors: BTreeSet<usize> = extended
                .iter()
                .filter(|&(&other, (other_nodes, _))| other != id && !nodes.is_disjoint(other_nodes))
                .map(|(&other, _)| other)
                .collect();

            let intersections: BTreeMap<usize, Vec<usize>> = neighbors
                .iter()
                .filter_map(|other| extended.get(other).map(|ext| (*other, &ext.0)))
                .map(|(other, other_nodes)| {
                    let shared: Vec<usize> = nodes
                        .intersection(other_nodes)
                        .iter()
                        .filter_map(|global| to_local[global])
                        .collect();
                    (other, shared)
                })
                .collect();

            let submesh = SubmeshBuilder {
                mesh,
                conn: &conn,
                nodes,
                elements,
                to_local: &to_local,
            }
            .build(id, first_new_id);

            log::debug!(
                "subdomain {id}: {} nodes, {} domain elements ({} before overlap), {} interface facets, neighbors {:?}",
                nodes.count(),
                elements.count(),
                cores.get(&id).map_or(0, |core| core.count()),
                submesh
                    .physical_groups
                    .get(INTERFACE_GROUP)
                    .map_or(0, |g| g.elements.len()),
                neighbors,
            );

            let subdomain = Subdomain {
                mesh: submesh,
                neighbors,
                intersections,
                partition_of_unity: weights
                    .remove(&id)
                    .unwrap_or_else(|| na::DVector::zeros(nodes.count())),
                local_to_global: nodes.iter().map(|global| conn.node_ids[global]).collect(),
                global_indices: nodes.iter().collect(),
            };
            subdomains.insert(id, subdomain);
        }

        log::info!(
            "built {} overlapping subdomains {depth} layers deep over {} elements",
            subdomains.len(),
            conn.element_count()
        );

        Ok(Self {
            subdomains,
            global_nodes: conn.node_ids,
        })
    }

    /// Look up a subdomain by its id.
    #[inline]
    pub fn get(&self, id: usize) -> Option<&Subdomain> {
        self.subdomains.get(&id)
    }

    /// Get all subdomains by id.
    #[inline]
    pub fn subdomains(&self) -> &BTreeMap<usize, Subdomain> {
        &self.subdomains
    }

    /// Consume the decomposition, returning the subdomains by id.
    pub fn into_subdomains(self) -> BTreeMap<usize, Subdomain> {
        self.subdomains
    }

    /// Number of subdomains.
    #[inline]
    pub fn len(&self) -> usize {
        self.subdomains.len()
    }

    /// Whether there are no subdomains.
    /// Never true for a successfully built decomposition.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.subdomains.is_empty()
    }

    /// The submesh of each subdomain.
    pub fn submeshes(&self) -> BTreeMap<usize, &MeshData> {
        self.subdomains.iter().map(|(id, s)| (*id, &s.mesh)).collect()
    }

    /// The neighbors of each subdomain.
    pub fn neighbors(&self) -> BTreeMap<usize, &BTreeSet<usize>> {
        self.subdomains
            .iter()
            .map(|(id, s)| (*id, &s.neighbors))
            .collect()
    }

    /// The local nodes each subdomain shares with each of its neighbors.
    pub fn intersections(&self) -> BTreeMap<usize, &BTreeMap<usize, Vec<usize>>> {
        self.subdomains
            .iter()
            .map(|(id, s)| (*id, &s.intersections))
            .collect()
    }

    /// The partition of unity weights of each subdomain.
    pub fn partition_of_unity(&self) -> BTreeMap<usize, &na::DVector<f64>> {
        self.subdomains
            .iter()
            .map(|(id, s)| (*id, &s.partition_of_unity))
            .collect()
    }

    /// Ids of the nodes used by the mesh's domain elements, in ascending order.
    ///
    /// This is the numbering of global vectors in
    /// [`restrict`][Self::restrict] and [`recombine`][Self::recombine].
    #[inline]
    pub fn global_node_ids(&self) -> &[usize] {
        &self.global_nodes
    }
}

/// Turn the partitions of a mesh into element subsets,
/// checking that they're a proper partition of the domain elements.
fn partition_subsets(
    mesh: &MeshData,
    conn: &Connectivity,
) -> Result<BTreeMap<usize, Subset<Elements>>, OverlapError> {
    if mesh.partitions.is_empty() {
        return Err(OverlapError::NoPartitions);
    }

    let mut owners: Vec<Option<usize>> = vec![None; conn.element_count()];
    let mut subsets = BTreeMap::new();
    for (&partition, element_ids) in &mesh.partitions {
        if element_ids.is_empty() {
            return Err(OverlapError::EmptySubdomain(partition));
        }

        let mut subset = Subset::new_empty(conn.element_count());
        for &element in element_ids {
            let elem_idx = conn
                .element_index(element)
                .ok_or(OverlapError::NotADomainElement { partition, element })?;
            if let Some(first) = owners[elem_idx] {
                return Err(OverlapError::OverlappingPartitions {
                    element,
                    first,
                    second: partition,
                });
            }
            owners[elem_idx] = Some(partition);
            subset.insert(elem_idx);
        }
        subsets.insert(partition, subset);
    }

    if let Some(elem_idx) = owners.iter().position(Option::is_none) {
        return Err(OverlapError::UncoveredElement(conn.element_ids[elem_idx]));
    }

    Ok(subsets)
}

/// Everything needed to cut one subdomain's submesh out of the global mesh.
struct SubmeshBuilder<'a> {
    mesh: &'a MeshData,
    conn: &'a Connectivity,
    nodes: &'a Subset<Nodes>,
    elements: &'a Subset<Elements>,
    /// local index of each dense global node, if it's in the subdomain
    to_local: &'a [Option<usize>],
}

impl SubmeshBuilder<'_> {
    fn build(&self, id: usize, first_new_id: usize) -> MeshData {
        let mut submesh = MeshData::new(self.mesh.dim);

        for (local, global) in self.nodes.iter().enumerate() {
            if let Some(coords) = self.mesh.nodes.get(&self.conn.node_ids[global]) {
                submesh.add_node(local, *coords);
            }
        }

        for elem_idx in self.elements.iter() {
            let element_id = self.conn.element_ids[elem_idx];
            if let Some(local) = self
                .mesh
                .elements
                .get(&element_id)
                .and_then(|el| self.localize(el))
            {
                submesh.elements.insert(element_id, local);
            }
        }

        // physical groups are restricted to the elements lying entirely in the subdomain.
        // lower-dimensional elements come along with them
        for (name, group) in &self.mesh.physical_groups {
            let mut kept = BTreeSet::new();
            for &element_id in &group.elements {
                let Some(element) = self.mesh.elements.get(&element_id) else {
                    continue;
                };
                if element.element_type.dim() == self.mesh.dim {
                    let inside = self
                        .conn
                        .element_index(element_id)
                        .is_some_and(|idx| self.elements.contains(idx));
                    if inside {
                        kept.insert(element_id);
                    }
                } else if let Some(local) = self.localize(element) {
                    submesh.elements.insert(element_id, local);
                    kept.insert(element_id);
                }
            }
            if !kept.is_empty() {
                submesh.physical_groups.insert(
                    name.clone(),
                    PhysicalGroup {
                        elements: kept,
                        ..group.clone()
                    },
                );
            }
        }

        // interface: facets between an element inside the subdomain and one outside it.
        // facets with a single element are on the boundary of the whole mesh
        let mut interface = BTreeSet::new();
        let mut next_id = first_new_id;
        for facet in &self.conn.facets {
            let inside = facet
                .elements
                .iter()
                .filter(|e| self.elements.contains(**e))
                .count();
            if inside == 0 || inside == facet.elements.len() {
                continue;
            }
            let nodes: Vec<usize> = facet.nodes.iter().filter_map(|n| self.to_local[*n]).collect();
            submesh
                .elements
                .insert(next_id, Element::new(facet.facet_type, nodes));
            interface.insert(next_id);
            next_id += 1;
        }
        submesh.add_physical_group(INTERFACE_GROUP, self.mesh.dim - 1, None, interface);

        let partition = self.mesh.partitions.get(&id).cloned().unwrap_or_default();
        submesh.partitions.insert(id, partition);

        submesh
    }

    /// Copy an element with its nodes renumbered to local indices.
    ///
    /// Returns None if any of its nodes is outside the subdomain.
    fn localize(&self, element: &Element) -> Option<Element> {
        let nodes = element
            .nodes
            .iter()
            .map(|id| self.conn.node_index(*id).and_then(|idx| self.to_local[idx]))
            .collect::<Option<Vec<usize>>>()?;
        Some(Element {
            nodes,
            ..element.clone()
        })
    }
}
