use nalgebra as na;
use nalgebra_sparse as nas;
use std::collections::BTreeMap;

use super::Decomposition;
use crate::mesh::subset::{Nodes, Subset};

/// How the partition of unity distributes weight between overlapping subdomains.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weighting {
    /// Only nodes of a subdomain's original partition get weight,
    /// split evenly between the partitions sharing the node.
    /// Nodes added by the overlap get zero.
    #[default]
    Restricted,
    /// Every node of a subdomain gets weight,
    /// split evenly between all the overlapping subdomains containing it.
    Uniform,
}

impl Weighting {
    /// Compute the weights of every subdomain's nodes in local order.
    ///
    /// `cores` holds the nodes of each original partition
    /// and `extended` the nodes of each subdomain after growing.
    pub(crate) fn weights(
        self,
        node_count: usize,
        cores: &BTreeMap<usize, Subset<Nodes>>,
        extended: &BTreeMap<usize, &Subset<Nodes>>,
    ) -> BTreeMap<usize, na::DVector<f64>> {
        let support: BTreeMap<usize, &Subset<Nodes>> = match self {
            Self::Restricted => cores.iter().map(|(id, nodes)| (*id, nodes)).collect(),
            Self::Uniform => extended.clone(),
        };

        let mut multiplicity = vec![0usize; node_count];
        for nodes in support.values() {
            for node_idx in nodes.iter() {
                multiplicity[node_idx] += 1;
            }
        }

        extended
            .iter()
            .map(|(id, nodes)| {
                let weights = nodes.iter().map(|node_idx| {
                    let in_support = support.get(id).is_some_and(|s| s.contains(node_idx));
                    if in_support {
                        1. / multiplicity[node_idx] as f64
                    } else {
                        0.
                    }
                });
                (*id, na::DVector::from_iterator(nodes.count(), weights))
            })
            .collect()
    }
}

/// Error in moving vectors between the global mesh and subdomains.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// No subdomain with the given id exists.
    #[error("No subdomain with id {0}")]
    UnknownSubdomain(usize),
    /// A vector had the wrong length for the space it was supposed to live in.
    #[error("Expected a vector of length {expected}, got {found}")]
    LengthMismatch {
        /// Length of the space.
        expected: usize,
        /// Length of the given vector.
        found: usize,
    },
}

impl Decomposition {
    /// The boolean matrix mapping a global vector to a subdomain's local nodes.
    ///
    /// Global vectors are indexed like [`global_node_ids`][Self::global_node_ids].
    pub fn restriction_matrix(&self, id: usize) -> Result<nas::CsrMatrix<f64>, TransferError> {
        let sub = self.get(id).ok_or(TransferError::UnknownSubdomain(id))?;
        let mut coo = nas::CooMatrix::new(sub.node_count(), self.global_nodes.len());
        for (local, &global) in sub.global_indices.iter().enumerate() {
            coo.push(local, global, 1.);
        }
        Ok(nas::CsrMatrix::from(&coo))
    }

    /// Take the values of a global vector at a subdomain's nodes.
    pub fn restrict(
        &self,
        id: usize,
        global: &na::DVector<f64>,
    ) -> Result<na::DVector<f64>, TransferError> {
        let sub = self.get(id).ok_or(TransferError::UnknownSubdomain(id))?;
        self.check_global_len(global.len())?;
        Ok(na::DVector::from_iterator(
            sub.node_count(),
            sub.global_indices.iter().map(|&i| global[i]),
        ))
    }

    /// Glue local vectors back into a global one,
    /// weighting each by its subdomain's partition of unity.
    ///
    /// Subdomains missing from `locals` contribute nothing.
    /// Recombining the restrictions of a global vector gives back the same vector.
    pub fn recombine(
        &self,
        locals: &BTreeMap<usize, na::DVector<f64>>,
    ) -> Result<na::DVector<f64>, TransferError> {
        let mut global = na::DVector::zeros(self.global_nodes.len());
        for (&id, local) in locals {
            let sub = self.get(id).ok_or(TransferError::UnknownSubdomain(id))?;
            if local.len() != sub.node_count() {
                return Err(TransferError::LengthMismatch {
                    expected: sub.node_count(),
                    found: local.len(),
                });
            }
            for ((&global_idx, value), weight) in sub
                .global_indices
                .iter()
                .zip(local.iter())
                .zip(sub.partition_of_unity.iter())
            {
                global[global_idx] += weight * value;
            }
        }
        Ok(global)
    }

    fn check_global_len(&self, len: usize) -> Result<(), TransferError> {
        if len == self.global_nodes.len() {
            Ok(())
        } else {
            Err(TransferError::LengthMismatch {
                expected: self.global_nodes.len(),
                found: len,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mesh::fixtures,
        overlap::{add_overlap, OverlapConfig},
    };
    use approx::assert_relative_eq;

    fn square_in_quadrants(weighting: Weighting) -> Decomposition {
        let mesh = fixtures::square_mesh(4).partition_by(|_, c| {
            usize::from(c.x > 0.5) + 2 * usize::from(c.y > 0.5)
        });
        Decomposition::build(
            &mesh,
            &OverlapConfig {
                depth: 1,
                weighting,
            },
        )
        .expect("valid partition")
    }

    #[test]
    fn uniform_weights_cover_the_overlap() {
        let mesh = fixtures::slabs(&fixtures::line_mesh(4), 2);
        let dd = Decomposition::build(
            &mesh,
            &OverlapConfig {
                depth: 1,
                weighting: Weighting::Uniform,
            },
        )
        .expect("valid partition");

        // global nodes 1, 2 and 3 are in both subdomains
        assert_relative_eq!(
            dd.get(0).unwrap().partition_of_unity,
            na::DVector::from_vec(vec![1.0, 0.5, 0.5, 0.5])
        );
        assert_relative_eq!(
            dd.get(1).unwrap().partition_of_unity,
            na::DVector::from_vec(vec![0.5, 0.5, 0.5, 1.0])
        );
    }

    #[test]
    fn restriction_matrix_picks_local_nodes() {
        let mesh = fixtures::slabs(&fixtures::line_mesh(4), 2);
        let dd = add_overlap(&mesh, 1).expect("valid partition");

        let r = dd.restriction_matrix(1).expect("subdomain exists");
        assert_eq!((r.nrows(), r.ncols()), (4, 5));
        assert_eq!(r.nnz(), 4);

        let global = na::DVector::from_vec(vec![10., 11., 12., 13., 14.]);
        let by_matrix = &r * &global;
        let by_index = dd.restrict(1, &global).expect("lengths match");
        assert_relative_eq!(by_matrix, by_index);
        assert_relative_eq!(by_index, na::DVector::from_vec(vec![11., 12., 13., 14.]));
    }

    #[test]
    fn restrict_then_recombine_is_identity() {
        for weighting in [Weighting::Restricted, Weighting::Uniform] {
            let dd = square_in_quadrants(weighting);
            let global = na::DVector::from_iterator(
                dd.global_node_ids().len(),
                dd.global_node_ids().iter().map(|&id| (id as f64).sin()),
            );

            let locals: BTreeMap<usize, na::DVector<f64>> = dd
                .subdomains()
                .keys()
                .map(|&id| (id, dd.restrict(id, &global).expect("lengths match")))
                .collect();
            let recombined = dd.recombine(&locals).expect("lengths match");
            assert_relative_eq!(recombined, global, epsilon = 1e-12);

            // the same thing with explicit matrices: sum of R^T D R is the identity
            let n = dd.global_node_ids().len();
            let mut sum = na::DMatrix::<f64>::zeros(n, n);
            for (id, sub) in dd.subdomains() {
                let r = na::DMatrix::from(&dd.restriction_matrix(*id).expect("subdomain exists"));
                let d = na::DMatrix::from_diagonal(&sub.partition_of_unity);
                sum += r.transpose() * d * r;
            }
            assert_relative_eq!(sum, na::DMatrix::identity(n, n), epsilon = 1e-12);
        }
    }

    #[test]
    fn transfer_errors() {
        let dd = square_in_quadrants(Weighting::Restricted);

        assert_eq!(
            dd.restriction_matrix(9).unwrap_err(),
            TransferError::UnknownSubdomain(9)
        );
        assert_eq!(
            dd.restrict(0, &na::DVector::zeros(3)).unwrap_err(),
            TransferError::LengthMismatch {
                expected: 25,
                found: 3
            }
        );

        let expected = dd.get(2).unwrap().node_count();
        let bad = BTreeMap::from([(2, na::DVector::zeros(expected + 1))]);
        assert_eq!(
            dd.recombine(&bad).unwrap_err(),
            TransferError::LengthMismatch {
                expected,
                found: expected + 1
            }
        );
        let unknown = BTreeMap::from([(4, na::DVector::zeros(1))]);
        assert_eq!(
            dd.recombine(&unknown).unwrap_err(),
            TransferError::UnknownSubdomain(4)
        );
    }
}
