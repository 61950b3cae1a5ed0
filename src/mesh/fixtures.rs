//! Structured meshes of the unit interval, square and cube,
//! made of simplices or of quadrangles and hexahedra.
//!
//! Node and element ids start from 0.
//! None of these are partitioned; use [`slabs`] or [`MeshData::partition_by`].

use super::{Coords, ElementType, MeshData};

/// The interval `[0, 1]` split into `n` line segments,
/// with point elements in the groups `"left"` and `"right"` at the ends.
pub fn line_mesh(n: usize) -> MeshData {
    let mut mesh = MeshData::new(1);
    for i in 0..=n {
        mesh.add_node(i, Coords::new(i as f64 / n as f64, 0., 0.));
    }
    for i in 0..n {
        mesh.add_element(i, ElementType::Line, [i, i + 1]);
    }

    mesh.add_element(n, ElementType::Point, [0]);
    mesh.add_element(n + 1, ElementType::Point, [n]);
    mesh.add_physical_group("left", 0, None, [n]);
    mesh.add_physical_group("right", 0, None, [n + 1]);

    mesh
}

/// The unit square split into an `n` x `n` grid of cells,
/// each cell split into two triangles along the same diagonal.
///
/// The boundary edges are line elements
/// in the groups `"bottom"`, `"right"`, `"top"` and `"left"`.
pub fn square_mesh(n: usize) -> MeshData {
    let mut mesh = square_grid_nodes(n);
    let node_id = |i: usize, j: usize| j * (n + 1) + i;

    let mut next_id = 0;
    for j in 0..n {
        for i in 0..n {
            let (v00, v10) = (node_id(i, j), node_id(i + 1, j));
            let (v01, v11) = (node_id(i, j + 1), node_id(i + 1, j + 1));
            mesh.add_element(next_id, ElementType::Triangle, [v00, v10, v11]);
            mesh.add_element(next_id + 1, ElementType::Triangle, [v00, v11, v01]);
            next_id += 2;
        }
    }
    add_square_sides(&mut mesh, n, next_id);

    mesh
}

/// The unit square split into an `n` x `n` grid of quadrangles,
/// with the same boundary groups as [`square_mesh`].
pub fn quad_mesh(n: usize) -> MeshData {
    let mut mesh = square_grid_nodes(n);
    let node_id = |i: usize, j: usize| j * (n + 1) + i;

    let mut next_id = 0;
    for j in 0..n {
        for i in 0..n {
            let cell = [
                node_id(i, j),
                node_id(i + 1, j),
                node_id(i + 1, j + 1),
                node_id(i, j + 1),
            ];
            mesh.add_element(next_id, ElementType::Quadrangle, cell);
            next_id += 1;
        }
    }
    add_square_sides(&mut mesh, n, next_id);

    mesh
}

fn square_grid_nodes(n: usize) -> MeshData {
    let mut mesh = MeshData::new(2);
    for j in 0..=n {
        for i in 0..=n {
            let coords = Coords::new(i as f64 / n as f64, j as f64 / n as f64, 0.);
            mesh.add_node(j * (n + 1) + i, coords);
        }
    }
    mesh
}

/// Line elements on the sides of a square grid, starting from element id `next_id`.
fn add_square_sides(mesh: &mut MeshData, n: usize, mut next_id: usize) {
    let node_id = |i: usize, j: usize| j * (n + 1) + i;
    // counterclockwise around the square
    for (side, name) in ["bottom", "right", "top", "left"].into_iter().enumerate() {
        let first_id = next_id;
        for k in 0..n {
            let edge = match side {
                0 => [node_id(k, 0), node_id(k + 1, 0)],
                1 => [node_id(n, k), node_id(n, k + 1)],
                2 => [node_id(n - k, n), node_id(n - k - 1, n)],
                _ => [node_id(0, n - k), node_id(0, n - k - 1)],
            };
            mesh.add_element(next_id, ElementType::Line, edge);
            next_id += 1;
        }
        mesh.add_physical_group(name, 1, None, first_id..next_id);
    }
}

/// The unit cube split into an `n` x `n` x `n` grid of cells,
/// each cell split into six tetrahedra around its main diagonal.
///
/// The triangles on the `z = 0` face are in the group `"bottom"`.
pub fn cube_mesh(n: usize) -> MeshData {
    let mut mesh = cube_grid_nodes(n);
    let node_id = |i: usize, j: usize, k: usize| (k * (n + 1) + j) * (n + 1) + i;

    // each tetrahedron walks from the cell's lowest corner to its highest
    // one axis at a time, in one of the 6 possible axis orders
    const AXIS_ORDERS: [[usize; 3]; 6] = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];

    let mut next_id = 0;
    for k in 0..n {
        for j in 0..n {
            for i in 0..n {
                for order in AXIS_ORDERS {
                    let mut corner = [i, j, k];
                    let mut nodes = vec![node_id(i, j, k)];
                    for axis in order {
                        corner[axis] += 1;
                        nodes.push(node_id(corner[0], corner[1], corner[2]));
                    }
                    mesh.add_element(next_id, ElementType::Tetrahedron, nodes);
                    next_id += 1;
                }
            }
        }
    }

    let first_id = next_id;
    for j in 0..n {
        for i in 0..n {
            let (v00, v10) = (node_id(i, j, 0), node_id(i + 1, j, 0));
            let (v01, v11) = (node_id(i, j + 1, 0), node_id(i + 1, j + 1, 0));
            mesh.add_element(next_id, ElementType::Triangle, [v00, v10, v11]);
            mesh.add_element(next_id + 1, ElementType::Triangle, [v00, v01, v11]);
            next_id += 2;
        }
    }
    mesh.add_physical_group("bottom", 2, None, first_id..next_id);

    mesh
}

/// The unit cube split into an `n` x `n` x `n` grid of hexahedra.
///
/// The quadrangles on the `z = 0` face are in the group `"bottom"`.
pub fn hex_mesh(n: usize) -> MeshData {
    let mut mesh = cube_grid_nodes(n);
    let node_id = |i: usize, j: usize, k: usize| (k * (n + 1) + j) * (n + 1) + i;

    let mut next_id = 0;
    for k in 0..n {
        for j in 0..n {
            for i in 0..n {
                // bottom face counterclockwise, then the top face above it
                let cell = [
                    node_id(i, j, k),
                    node_id(i + 1, j, k),
                    node_id(i + 1, j + 1, k),
                    node_id(i, j + 1, k),
                    node_id(i, j, k + 1),
                    node_id(i + 1, j, k + 1),
                    node_id(i + 1, j + 1, k + 1),
                    node_id(i, j + 1, k + 1),
                ];
                mesh.add_element(next_id, ElementType::Hexahedron, cell);
                next_id += 1;
            }
        }
    }

    let first_id = next_id;
    for j in 0..n {
        for i in 0..n {
            let face = [
                node_id(i, j, 0),
                node_id(i + 1, j, 0),
                node_id(i + 1, j + 1, 0),
                node_id(i, j + 1, 0),
            ];
            mesh.add_element(next_id, ElementType::Quadrangle, face);
            next_id += 1;
        }
    }
    mesh.add_physical_group("bottom", 2, None, first_id..next_id);

    mesh
}

fn cube_grid_nodes(n: usize) -> MeshData {
    let mut mesh = MeshData::new(3);
    for k in 0..=n {
        for j in 0..=n {
            for i in 0..=n {
                let coords = Coords::new(i as f64, j as f64, k as f64) / n as f64;
                mesh.add_node((k * (n + 1) + j) * (n + 1) + i, coords);
            }
        }
    }
    mesh
}

/// Partition a mesh of the unit interval, square or cube
/// into `parts` slabs of equal width along the x axis.
///
/// # Panics
///
/// If `parts` is zero.
pub fn slabs(mesh: &MeshData, parts: usize) -> MeshData {
    assert!(parts > 0, "a mesh can't be cut into zero slabs");
    mesh.partition_by(|_, centroid| ((centroid.x * parts as f64) as usize).min(parts - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slabs_along_x() {
        let mesh = slabs(&quad_mesh(4), 2);
        assert_eq!(mesh.partitions.len(), 2);
        assert_eq!(mesh.partitions[&0].len(), 8);
        assert_eq!(mesh.partitions[&1].len(), 8);
        // a single slab holds everything
        let whole = slabs(&hex_mesh(2), 1);
        itertools::assert_equal(whole.partitions.keys().copied(), [0]);
        assert_eq!(whole.partitions[&0].len(), 8);
    }

    #[test]
    #[should_panic(expected = "zero slabs")]
    fn zero_slabs() {
        slabs(&line_mesh(4), 0);
    }
}
