use itertools::Itertools;
use nalgebra_sparse as nas;

use super::{
    subset::{Elements, Nodes, Subset},
    ElementType, MeshData, MeshError,
};

/// Dense numbering of a mesh's domain elements and the nodes they use,
/// with incidence maps between them.
///
/// Node and element ids in a [`MeshData`] can be arbitrary integers;
/// here they are renumbered `0..n` in ascending id order
/// so that sets of them can be stored as bitsets.
/// Only nodes used by at least one domain element get a dense index.
#[derive(Clone, Debug)]
pub(crate) struct Connectivity {
    /// node ids in ascending order. position in this Vec is the dense index
    pub node_ids: Vec<usize>,
    /// domain element ids in ascending order
    pub element_ids: Vec<usize>,
    /// rows correspond to elements, columns to nodes.
    /// values are meaningless; only the sparsity pattern is used
    element_nodes: nas::CsrMatrix<i8>,
    /// transpose of `element_nodes`, stored separately for efficient row access
    node_elements: nas::CsrMatrix<i8>,
    /// every `dim - 1`-dimensional facet of the domain elements, deduplicated,
    /// in lexicographic order of their sorted dense node indices
    pub facets: Vec<Facet>,
}

/// A facet shared by one or more domain elements.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Facet {
    /// Type of the facet as an element.
    pub facet_type: ElementType,
    /// Dense node indices in the orientation seen from the first element containing the facet.
    pub nodes: Vec<usize>,
    /// Dense indices of the domain elements containing the facet.
    pub elements: Vec<usize>,
}

impl Connectivity {
    /// Build the connectivity of a mesh, validating it first.
    pub fn new(mesh: &MeshData) -> Result<Self, MeshError> {
        mesh.validate()?;

        let element_ids: Vec<usize> = mesh.domain_elements().map(|(id, _)| id).collect();
        let node_ids: Vec<usize> = mesh
            .domain_elements()
            .flat_map(|(_, el)| el.nodes.iter().copied())
            .sorted_unstable()
            .dedup()
            .collect();

        let unused_nodes = mesh.nodes.len() - node_ids.len();
        if unused_nodes > 0 {
            log::debug!(
                "{unused_nodes} nodes are not used by any {}-dimensional element and are left out",
                mesh.dim
            );
        }

        // node ids of domain elements are in `node_ids` by construction,
        // so the lookups in here always succeed
        let dense_node = |id: usize| node_ids.binary_search(&id).ok();

        let mut incidence: nas::CooMatrix<i8> =
            nas::CooMatrix::new(element_ids.len(), node_ids.len());
        // (sorted facet key, oriented facet, facet type, element index)
        let mut raw_facets: Vec<(Vec<usize>, Vec<usize>, ElementType, usize)> = Vec::new();
        for (elem_idx, (_, element)) in mesh.domain_elements().enumerate() {
            let dense: Vec<usize> = element.nodes.iter().filter_map(|n| dense_node(*n)).collect();
            for &node_idx in &dense {
                incidence.push(elem_idx, node_idx, 1);
            }

            let Some(facet_type) = element.element_type.facet_type() else {
                continue;
            };
            for local in element.element_type.facet_local_nodes() {
                let oriented: Vec<usize> = local.iter().map(|i| dense[*i]).collect();
                let key: Vec<usize> = oriented.iter().copied().sorted_unstable().collect();
                raw_facets.push((key, oriented, facet_type, elem_idx));
            }
        }
        let element_nodes = nas::CsrMatrix::from(&incidence);
        let node_elements = element_nodes.transpose();

        // sort the facets in lexicographic order by vertex indices to merge duplicates.
        // stable sort so the first element containing a facet stays first
        let mut facets: Vec<Facet> = Vec::new();
        let mut prev_key: Option<Vec<usize>> = None;
        for (key, oriented, facet_type, elem_idx) in
            raw_facets.into_iter().sorted_by(|a, b| a.0.cmp(&b.0))
        {
            if prev_key.as_ref() == Some(&key) {
                if let Some(facet) = facets.last_mut() {
                    facet.elements.push(elem_idx);
                }
                continue;
            }
            facets.push(Facet {
                facet_type,
                nodes: oriented,
                elements: vec![elem_idx],
            });
            prev_key = Some(key);
        }

        Ok(Self {
            node_ids,
            element_ids,
            element_nodes,
            node_elements,
            facets,
        })
    }

    /// Number of nodes used by domain elements.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.node_ids.len()
    }

    /// Number of domain elements.
    #[inline]
    pub fn element_count(&self) -> usize {
        self.element_ids.len()
    }

    /// Dense index of a node id, if the node is used by a domain element.
    #[inline]
    pub fn node_index(&self, id: usize) -> Option<usize> {
        self.node_ids.binary_search(&id).ok()
    }

    /// Dense index of an element id, if it's a domain element.
    #[inline]
    pub fn element_index(&self, id: usize) -> Option<usize> {
        self.element_ids.binary_search(&id).ok()
    }

    /// Get the set of nodes used by a set of elements.
    pub fn nodes_of(&self, elements: &Subset<Elements>) -> Subset<Nodes> {
        let mut nodes = Subset::new_empty(self.node_count());
        for elem_idx in elements.iter() {
            for &node_idx in self.element_nodes.row(elem_idx).col_indices() {
                nodes.insert(node_idx);
            }
        }
        nodes
    }

    /// Extend a set of elements by one layer:
    /// first every element touching one of `nodes` is added,
    /// then every node of the resulting elements.
    ///
    /// `nodes` is expected to contain the nodes of `elements` on entry,
    /// and does so again on exit.
    pub fn grow(&self, nodes: &mut Subset<Nodes>, elements: &mut Subset<Elements>) {
        for node_idx in nodes.iter() {
            for &elem_idx in self.node_elements.row(node_idx).col_indices() {
                elements.insert(elem_idx);
            }
        }
        *nodes = self.nodes_of(elements);
    }
}
