//! Utilities for loading meshes generated with [`gmsh`](https://www.gmsh.info/).
//!
//! Only version 4.1 of the MSH format is supported,
//! as per the [`mshio`] library.

use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::mesh::{Coords, Element, ElementType, MeshData, MeshError, PhysicalGroup};

/// Error in loading a mesh from a Gmsh .msh file.
#[derive(thiserror::Error, Debug)]
pub enum GmshError {
    /// Error parsing the .msh file.
    ///
    /// (Implementation note: parser error converted to string
    /// to avoid lifetime issues with the byte slices it contains)
    #[error("Parsing the .msh data failed: {0}")]
    ParseError(String),
    /// The given .msh file contains no nodes.
    #[error("Invalid .msh data: no nodes")]
    MissingNodes,
    /// The given .msh file contains no elements of a supported type.
    #[error("Invalid .msh data: no elements of a supported type")]
    MissingElements,
    /// The elements in the file don't form a valid mesh.
    #[error("Invalid .msh data")]
    InvalidMesh(#[from] MeshError),
}

mod sections;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct EntityId {
    dim: i32,
    tag: i32,
}

/// Physical tags are only unique within one dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct PhysicalId {
    dim: i32,
    tag: i32,
}

/// What we need to know about the entity an element block lives on.
#[derive(Clone, Debug, Default)]
struct EntityInfo {
    physical_tags: Vec<i32>,
    partitions: Vec<i32>,
}

/// Load a mesh from a `.msh` file.
///
/// Node and element ids are the tags gmsh gave them.
/// First-order elements of type `Lin2`, `Tri3`, `Qua4`, `Tet4` and `Hex8`
/// (see [`ElementType`][mshio::ElementType]) are read,
/// as well as single-node elements on point entities.
/// Other element types are skipped with a warning.
/// The dimension of the mesh is the highest dimension of the elements read.
///
/// ```
/// # use ddm_mesh::gmsh::{load_msh, GmshError};
/// # fn load() -> Result<(), GmshError> {
/// let mesh = load_msh(include_bytes!("gmsh/unit_square_2d.msh"))?;
/// assert_eq!(mesh.dim, 2);
/// # Ok(())
/// # }
/// # load().expect("Failed to load mesh");
/// ```
///
/// # Partitions
///
/// Files written after partitioning in gmsh (e.g. with `gmsh -part N`)
/// list the partition of every entity in a `$PartitionedEntities` section.
/// Domain elements are then put in [`MeshData::partitions`]
/// under gmsh's partition numbers, which start at 1.
/// Otherwise the mesh is not partitioned;
/// use [`MeshData::with_partitions`] or [`MeshData::partition_by`] for that.
///
/// # Physical groups
///
/// If the .msh file contains physical groups,
/// every element on an entity belonging to a group is put in a [`PhysicalGroup`].
/// Groups are named as in the `$PhysicalNames` section,
/// e.g. the elements of `Physical Curve("inlet", 100) = {1};` go in the group `"inlet"`.
/// Unnamed groups are named after their integer tag instead.
/// Since a tag can be reused for groups of different dimension,
/// names shared by several dimensions get the dimension appended,
/// as in `"1_1d"` and `"1_2d"`.
/// Each element also records the first physical tag of its entity
/// in [`Element::physical_tag`].
///
/// Note that gmsh does not save elements that aren't part of a physical group by default,
/// so either put the whole domain in a physical group or use `-save_all`.
pub fn load_msh(bytes: &[u8]) -> Result<MeshData, GmshError> {
    let msh = mshio::parse_msh_bytes(bytes).map_err(|e| GmshError::ParseError(format!("{}", e)))?;
    let encoding = sections::Encoding::detect(bytes, &msh.header)?;
    let nodes = msh.data.nodes.ok_or(GmshError::MissingNodes)?;
    let elements = msh.data.elements.ok_or(GmshError::MissingElements)?;

    let mut entities = gather_entities(msh.data.entities.as_ref());
    for entity in sections::partitioned_entities(bytes, encoding)? {
        entities.insert(
            entity.id,
            EntityInfo {
                physical_tags: entity.physical_tags,
                partitions: entity.partitions,
            },
        );
    }

    // mshio only keeps node tags when they are sparse
    let scanned_tags = if nodes.node_blocks.iter().any(|b| b.node_tags.is_none()) {
        sections::node_tags(bytes, encoding)?
    } else {
        Vec::new()
    };
    let mut node_map: BTreeMap<usize, Coords> = BTreeMap::new();
    for (block_idx, block) in nodes.node_blocks.iter().enumerate() {
        let tags = match &block.node_tags {
            Some(tag_indices) => {
                let mut tags = vec![0; block.nodes.len()];
                for (&tag, &idx) in tag_indices {
                    if let Some(slot) = tags.get_mut(idx) {
                        *slot = tag as usize;
                    }
                }
                tags
            }
            None => scanned_tags.get(block_idx).cloned().unwrap_or_default(),
        };
        if tags.len() != block.nodes.len() {
            return Err(GmshError::ParseError(format!(
                "node block on entity ({}, {}) has {} nodes but {} tags",
                block.entity_dim,
                block.entity_tag,
                block.nodes.len(),
                tags.len(),
            )));
        }
        for (tag, node) in tags.into_iter().zip(&block.nodes) {
            node_map.insert(tag, Coords::new(node.x, node.y, node.z));
        }
    }
    if node_map.is_empty() {
        return Err(GmshError::MissingNodes);
    }

    let mut element_map: BTreeMap<usize, Element> = BTreeMap::new();
    let mut element_partitions: Vec<(usize, usize)> = Vec::new();
    let mut groups: BTreeMap<PhysicalId, PhysicalGroup> = BTreeMap::new();
    for block in &elements.element_blocks {
        let element_type = match block.element_type {
            mshio::ElementType::Lin2 => ElementType::Line,
            mshio::ElementType::Tri3 => ElementType::Triangle,
            mshio::ElementType::Qua4 => ElementType::Quadrangle,
            mshio::ElementType::Tet4 => ElementType::Tetrahedron,
            mshio::ElementType::Hex8 => ElementType::Hexahedron,
            // point entities only ever hold single-node elements
            _ if block.entity_dim == 0 => ElementType::Point,
            other => {
                log::warn!(
                    "skipping {} elements of unsupported type {other:?} on entity ({}, {})",
                    block.elements.len(),
                    block.entity_dim,
                    block.entity_tag,
                );
                continue;
            }
        };

        let ent_id = EntityId {
            dim: block.entity_dim,
            tag: block.entity_tag,
        };
        let info = entities.get(&ent_id);
        let phys_tags: &[i32] = info.map(|i| i.physical_tags.as_slice()).unwrap_or_default();
        // entities of the partitioned dimension belong to exactly one partition
        let partition = info
            .and_then(|i| i.partitions.first())
            .and_then(|&p| usize::try_from(p).ok());

        for el in &block.elements {
            let id = el.element_tag as usize;
            element_map.insert(
                id,
                Element {
                    element_type,
                    nodes: el.nodes.iter().map(|tag| *tag as usize).collect(),
                    physical_tag: phys_tags.first().copied(),
                },
            );
            if let Some(partition) = partition {
                element_partitions.push((id, partition));
            }
            for &tag in phys_tags {
                let group_id = PhysicalId {
                    dim: block.entity_dim,
                    tag,
                };
                let group = groups.entry(group_id).or_insert_with(|| PhysicalGroup {
                    dim: element_type.dim(),
                    tag: Some(tag),
                    ..Default::default()
                });
                group.elements.insert(id);
            }
        }
    }

    let Some(dim) = element_map.values().map(|el| el.element_type.dim()).max() else {
        return Err(GmshError::MissingElements);
    };

    let mut partitions: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
    for (id, partition) in element_partitions {
        if element_map[&id].element_type.dim() == dim {
            partitions.entry(partition).or_default().insert(id);
        }
    }

    let names = group_names(groups.keys().copied(), &sections::physical_names(bytes)?);
    let mesh = MeshData {
        dim,
        nodes: node_map,
        elements: element_map,
        partitions,
        physical_groups: groups
            .into_iter()
            .map(|(id, group)| (names[&id].clone(), group))
            .collect(),
    };
    mesh.validate()?;

    log::info!(
        "loaded a {dim}-dimensional mesh with {} nodes, {} elements, {} partitions and {} physical groups",
        mesh.nodes.len(),
        mesh.elements.len(),
        mesh.partitions.len(),
        mesh.physical_groups.len(),
    );

    Ok(mesh)
}

/// Collect the physical tags of every entity defined in a .msh file
/// into a structure we can easily look them up from.
fn gather_entities(entities: Option<&mshio::Entities<i32, f64>>) -> HashMap<EntityId, EntityInfo> {
    let Some(entities) = entities else {
        return HashMap::new();
    };

    let points = entities
        .points
        .iter()
        .map(|p| (EntityId { dim: 0, tag: p.tag }, &p.physical_tags));
    let curves = entities
        .curves
        .iter()
        .map(|c| (EntityId { dim: 1, tag: c.tag }, &c.physical_tags));
    let surfaces = entities
        .surfaces
        .iter()
        .map(|s| (EntityId { dim: 2, tag: s.tag }, &s.physical_tags));
    let volumes = entities
        .volumes
        .iter()
        .map(|v| (EntityId { dim: 3, tag: v.tag }, &v.physical_tags));

    points
        .chain(curves)
        .chain(surfaces)
        .chain(volumes)
        .filter(|(_, tags)| !tags.is_empty())
        .map(|(id, tags)| {
            let info = EntityInfo {
                physical_tags: tags.clone(),
                ..Default::default()
            };
            (id, info)
        })
        .collect()
}

/// Unique names for the given physical groups.
fn group_names(
    ids: impl Iterator<Item = PhysicalId> + Clone,
    physical_names: &HashMap<PhysicalId, String>,
) -> BTreeMap<PhysicalId, String> {
    let preferred = |id: &PhysicalId| {
        physical_names
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.tag.to_string())
    };
    let uses = ids.clone().map(|id| preferred(&id)).counts();
    ids.map(|id| {
        let name = preferred(&id);
        if uses[&name] > 1 {
            (id, format!("{name}_{}d", id.dim))
        } else {
            (id, name)
        }
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlap::{add_overlap, INTERFACE_GROUP};
    use std::collections::BTreeSet;

    #[test]
    fn unit_square() {
        let mesh =
            load_msh(include_bytes!("gmsh/unit_square_2d.msh")).expect("Failed to load mesh");

        assert_eq!(mesh.dim, 2);
        assert_eq!(mesh.nodes.len(), 5);
        assert_eq!(mesh.nodes[&5], Coords::new(0.5, 0.5, 0.));
        assert_eq!(mesh.domain_elements().count(), 4);
        assert_eq!(mesh.elements[&1].element_type, ElementType::Line);
        assert_eq!(mesh.elements[&1].nodes, vec![1, 2]);
        assert_eq!(mesh.elements[&3].nodes, vec![2, 3, 5]);
        assert_eq!(mesh.elements[&3].physical_tag, Some(200));

        // one group for the bottom edge and one for the whole surface
        let bottom = &mesh.physical_groups["100"];
        assert_eq!(bottom.dim, 1);
        assert_eq!(bottom.tag, Some(100));
        assert_eq!(bottom.elements, BTreeSet::from([1]));
        let surface = &mesh.physical_groups["200"];
        assert_eq!(surface.dim, 2);
        assert_eq!(surface.elements, BTreeSet::from([2, 3, 4, 5]));

        // lower and upper halves
        let mesh = mesh.with_partitions([(2, 0), (3, 0), (4, 1), (5, 1)]);
        let dd = add_overlap(&mesh, 0).expect("valid partition");
        let lower = dd.get(0).unwrap();
        assert_eq!(lower.local_to_global, vec![1, 2, 3, 5]);
        assert_eq!(lower.intersections[&1], vec![0, 2, 3]);
        // the diagonals from the center to the corners 1 and 3
        assert_eq!(lower.mesh.physical_groups[INTERFACE_GROUP].elements.len(), 2);
        assert!(lower.mesh.physical_groups.contains_key("100"));
        assert!(!dd.get(1).unwrap().mesh.physical_groups.contains_key("100"));
    }

    #[test]
    fn interval_with_end_points() {
        let mesh =
            load_msh(include_bytes!("gmsh/unit_interval_1d.msh")).expect("Failed to load mesh");

        assert_eq!(mesh.dim, 1);
        assert_eq!(mesh.nodes.len(), 5);
        itertools::assert_equal(mesh.domain_elements().map(|(id, _)| id), [3, 4, 5, 6]);
        assert_eq!(mesh.elements[&1].element_type, ElementType::Point);
        assert_eq!(mesh.physical_groups["10"].elements, BTreeSet::from([3, 4, 5, 6]));
        let ends = &mesh.physical_groups["20"];
        assert_eq!(ends.dim, 0);
        assert_eq!(ends.elements, BTreeSet::from([1, 2]));

        let mesh = mesh.partition_by(|_, c| usize::from(c.x > 0.5));
        let dd = add_overlap(&mesh, 1).expect("valid partition");
        let left = dd.get(0).unwrap();
        assert_eq!(left.local_to_global, vec![1, 3, 4, 5]);
        // only the end point at x = 0 is in the left subdomain
        assert_eq!(left.mesh.physical_groups["20"].elements, BTreeSet::from([1]));
        assert_eq!(left.mesh.elements[&1].nodes, vec![0]);
    }

    #[test]
    fn node_ids_are_gmsh_tags() {
        // tags with gaps, listed out of order
        let mesh =
            load_msh(include_bytes!("gmsh/sparse_tags_2d.msh")).expect("Failed to load mesh");
        itertools::assert_equal(mesh.nodes.keys().copied(), [10, 20, 30, 40, 50]);
        assert_eq!(mesh.nodes[&40], Coords::new(0., 0., 0.));
        assert_eq!(mesh.nodes[&10], Coords::new(1., 0., 0.));
        assert_eq!(mesh.nodes[&30], Coords::new(1., 1., 0.));
        assert_eq!(mesh.nodes[&20], Coords::new(0., 1., 0.));
        assert_eq!(mesh.centroid(&mesh.elements[&3]), Some(Coords::new(2.5 / 3., 0.5, 0.)));

        // contiguous tags, but the first two blocks are swapped
        let mesh =
            load_msh(include_bytes!("gmsh/permuted_tags_2d.msh")).expect("Failed to load mesh");
        assert_eq!(mesh.nodes[&1], Coords::new(1., 0., 0.));
        assert_eq!(mesh.nodes[&2], Coords::new(0., 0., 0.));
        assert_eq!(mesh.elements[&1].nodes, vec![2, 1]);
        assert_eq!(mesh.centroid(&mesh.elements[&3]), Some(Coords::new(2.5 / 3., 0.5, 0.)));
    }

    #[test]
    fn physical_tags_are_per_dimension() {
        // `Physical Curve(1)` and `Physical Surface(1)` are different groups
        let mesh =
            load_msh(include_bytes!("gmsh/sparse_tags_2d.msh")).expect("Failed to load mesh");
        assert_eq!(mesh.physical_groups.len(), 2);
        let bottom = &mesh.physical_groups["1_1d"];
        assert_eq!(bottom.dim, 1);
        assert_eq!(bottom.tag, Some(1));
        assert_eq!(bottom.elements, BTreeSet::from([1]));
        let surface = &mesh.physical_groups["1_2d"];
        assert_eq!(surface.dim, 2);
        assert_eq!(surface.tag, Some(1));
        assert_eq!(surface.elements, BTreeSet::from([2, 3, 4, 5]));
    }

    #[test]
    fn partitioned_file() {
        let files: [&[u8]; 2] = [
            include_bytes!("gmsh/partitioned_square_2d.msh"),
            include_bytes!("gmsh/partitioned_square_2d_binary.msh"),
        ];
        for bytes in files {
            let mesh = load_msh(bytes).expect("Failed to load mesh");
            assert_eq!(mesh.nodes.len(), 5);
            assert_eq!(mesh.nodes[&4], Coords::new(0., 1., 0.));
            assert_eq!(mesh.nodes[&5], Coords::new(0.5, 0.5, 0.));
            assert_eq!(
                mesh.partitions,
                BTreeMap::from([(1, BTreeSet::from([2, 3])), (2, BTreeSet::from([4, 5]))])
            );

            // named groups
            itertools::assert_equal(mesh.physical_groups.keys(), ["bottom", "domain"]);
            assert_eq!(mesh.physical_groups["bottom"].tag, Some(100));
            assert_eq!(mesh.physical_groups["bottom"].elements, BTreeSet::from([1]));
            assert_eq!(
                mesh.physical_groups["domain"].elements,
                BTreeSet::from([2, 3, 4, 5])
            );
            assert_eq!(mesh.elements[&4].physical_tag, Some(200));

            // the partition gmsh made is ready for use
            let dd = add_overlap(&mesh, 0).expect("valid partition");
            itertools::assert_equal(dd.subdomains().keys().copied(), [1, 2]);
            let first = dd.get(1).unwrap();
            assert_eq!(first.local_to_global, vec![1, 2, 3, 5]);
            assert_eq!(first.mesh.physical_groups[INTERFACE_GROUP].elements.len(), 2);
            assert!(first.mesh.physical_groups.contains_key("bottom"));
            assert!(!dd.get(2).unwrap().mesh.physical_groups.contains_key("bottom"));
        }
    }

    #[test]
    fn unpartitioned_files_have_no_partitions() {
        let mesh =
            load_msh(include_bytes!("gmsh/unit_square_2d.msh")).expect("Failed to load mesh");
        assert!(mesh.partitions.is_empty());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            load_msh(b"definitely not a mesh"),
            Err(GmshError::ParseError(_))
        ));
    }
}
