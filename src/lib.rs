//! Overlapping domain decomposition of partitioned meshes.
//!
//! Start from a [`MeshData`], either loaded from a gmsh file with [`gmsh::load_msh`]
//! or assembled by hand, and assign its elements to partitions with
//! [`MeshData::with_partitions`] or [`MeshData::partition_by`].
//! [`Decomposition::build`] (or its shorthand [`add_overlap`])
//! then grows each partition into an overlapping subdomain
//! and computes the neighbors, shared nodes and partition of unity
//! needed to exchange data between them.
//!
//! ```
//! # use ddm_mesh::{mesh::fixtures, Decomposition, OverlapConfig};
//! let mesh = fixtures::square_mesh(8).partition_by(|_, centroid| {
//!     usize::from(centroid.x > 0.5) + 2 * usize::from(centroid.y > 0.5)
//! });
//! let dd = Decomposition::build(&mesh, &OverlapConfig { depth: 2, ..Default::default() })
//!     .expect("every element is in exactly one quadrant");
//! assert_eq!(dd.len(), 4);
//! ```

#![warn(missing_docs)]

pub mod mesh;
#[doc(inline)]
pub use mesh::{Coords, Element, ElementType, MeshData, MeshError, PhysicalGroup};

pub mod overlap;
#[doc(inline)]
pub use overlap::{
    add_overlap, Decomposition, OverlapConfig, OverlapError, Subdomain, TransferError, Weighting,
    INTERFACE_GROUP,
};

pub mod gmsh;

// nalgebra re-export for the vector types in the public API

pub use nalgebra as na;
