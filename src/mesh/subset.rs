use fixedbitset as fb;

/// Marker type indicating a [`Subset`] of mesh nodes.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Nodes;
/// Marker type indicating a [`Subset`] of domain elements.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Elements;

/// A subset of the densely numbered nodes or elements of a
/// [`Connectivity`][super::Connectivity].
///
/// The marker type keeps node sets and element sets from being mixed up,
/// since both are just bitsets underneath.
#[derive(Clone, Debug)]
pub(crate) struct Subset<Kind> {
    /// A bitset containing the dense indices present in the subset.
    ///
    /// Its length is the total number of entities of this kind,
    /// so any valid index can be inserted without growing it.
    pub indices: fb::FixedBitSet,
    _marker: std::marker::PhantomData<Kind>,
}

impl<Kind> PartialEq for Subset<Kind> {
    fn eq(&self, other: &Self) -> bool {
        self.indices.eq(&other.indices)
    }
}
impl<Kind> Eq for Subset<Kind> {}

impl<Kind> Subset<Kind> {
    #[inline]
    fn new(indices: fb::FixedBitSet) -> Self {
        Self {
            indices,
            _marker: std::marker::PhantomData,
        }
    }

    /// Create an empty subset of a collection with `len` entities.
    pub fn new_empty(len: usize) -> Self {
        Self::new(fb::FixedBitSet::with_capacity(len))
    }

    /// Create a subset of a collection with `len` entities
    /// containing the indices yielded by an iterator.
    pub fn from_indices(len: usize, indices: impl IntoIterator<Item = usize>) -> Self {
        let mut bits = fb::FixedBitSet::with_capacity(len);
        bits.extend(indices);
        Self::new(bits)
    }

    /// Add an index to the subset.
    #[inline]
    pub fn insert(&mut self, idx: usize) {
        self.indices.insert(idx);
    }

    /// Check if the subset contains an index.
    #[inline]
    pub fn contains(&self, idx: usize) -> bool {
        self.indices.contains(idx)
    }

    /// Iterate over the indices in the subset in ascending order.
    #[inline]
    pub fn iter(&self) -> fb::Ones<'_> {
        self.indices.ones()
    }

    /// Take the intersection (i.e. set of indices that are in both)
    /// of this subset with another of the same kind.
    #[inline]
    pub fn intersection(&self, other: &Self) -> Self {
        // fixedbitset's in-place operations are probably more efficient
        // than collecting a new bitset from an iterator
        let mut indices = self.indices.clone();
        indices.intersect_with(&other.indices);
        Self::new(indices)
    }

    /// Check whether this subset and another have no indices in common.
    #[inline]
    pub fn is_disjoint(&self, other: &Self) -> bool {
        self.indices.is_disjoint(&other.indices)
    }

    /// Get the number of indices in this subset.
    #[inline]
    pub fn count(&self) -> usize {
        self.indices.count_ones(..)
    }
}
