//! Track which mapped columns of a model a query loads.
//!
//! A record loaded with a strict subset of its columns cannot be written back
//! without overwriting the columns it never saw, so the query compiler records
//! the projection here and the result set checks [`ColumnSet::is_full`].

/// A compact bitset over column indices `0..len`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnSet {
    len: usize,
    bits: Box<[u64]>,
}

impl ColumnSet {
    /// Create an empty set for `len` columns.
    #[must_use]
    pub fn empty(len: usize) -> Self {
        let words = len.div_ceil(64);
        Self {
            len,
            bits: vec![0u64; words].into_boxed_slice(),
        }
    }

    /// Create a full set for `len` columns.
    #[must_use]
    pub fn all(len: usize) -> Self {
        let mut s = Self::empty(len);
        for idx in 0..len {
            s.insert(idx);
        }
        s
    }

    /// Number of columns the set ranges over.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True if the set ranges over no columns.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Add a column index. Indices outside `0..len` are ignored.
    pub fn insert(&mut self, idx: usize) {
        if idx >= self.len {
            return;
        }
        if let Some(w) = self.bits.get_mut(idx / 64) {
            *w |= 1u64 << (idx % 64);
        }
    }

    /// Remove a column index.
    pub fn remove(&mut self, idx: usize) {
        if let Some(w) = self.bits.get_mut(idx / 64) {
            *w &= !(1u64 << (idx % 64));
        }
    }

    /// Whether a column index is in the set.
    #[must_use]
    pub fn contains(&self, idx: usize) -> bool {
        if idx >= self.len {
            return false;
        }
        self.bits
            .get(idx / 64)
            .is_some_and(|w| (w & (1u64 << (idx % 64))) != 0)
    }

    /// Number of columns in the set.
    #[must_use]
    pub fn count(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Whether every column is in the set.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.count() == self.len
    }

    /// Column indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(|i| self.contains(*i))
    }
}
