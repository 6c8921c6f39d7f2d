//! Partitioned tables
//!
//! A [`Bag`] is an ordered sequence of row-disjoint sub-tables. Concatenating
//! the partitions in order always reproduces the source table.

use crate::error::TableError;
use crate::table::Table;
use serde::{Deserialize, Serialize};

/// Balanced partition sizes for `rows` rows over `n` partitions
///
/// The first `rows % n` partitions get one extra row. Returns an empty plan
/// when `n` is zero.
#[must_use]
pub fn partition_sizes(rows: usize, n: usize) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    let base = rows / n;
    let extra = rows % n;
    (0..n).map(|i| if i < extra { base + 1 } else { base }).collect()
}

/// Ordered, row-disjoint split of a table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bag {
    partitions: Vec<Table>,
}

impl Bag {
    /// Wrap existing partitions
    #[inline]
    #[must_use]
    pub fn new(partitions: Vec<Table>) -> Self {
        Self { partitions }
    }

    /// Split a table into `n` balanced partitions
    ///
    /// # Errors
    /// - `TableError::InvalidPartitionCount` if `n` is zero
    pub fn partition(table: &Table, n: usize) -> Result<Self, TableError> {
        if n == 0 {
            return Err(TableError::InvalidPartitionCount(n));
        }

        let mut partitions = Vec::with_capacity(n);
        let mut start = 0;
        for size in partition_sizes(table.len(), n) {
            partitions.push(table.slice(start..start + size)?);
            start += size;
        }

        Ok(Self { partitions })
    }

    /// Number of partitions
    #[inline]
    #[must_use]
    pub fn npartitions(&self) -> usize {
        self.partitions.len()
    }

    /// Partitions in order
    #[inline]
    #[must_use]
    pub fn partitions(&self) -> &[Table] {
        &self.partitions
    }

    /// Consume into partitions
    #[inline]
    #[must_use]
    pub fn into_partitions(self) -> Vec<Table> {
        self.partitions
    }

    /// Row count of each partition
    #[must_use]
    pub fn partition_lengths(&self) -> Vec<usize> {
        self.partitions.iter().map(Table::len).collect()
    }

    /// Total rows across partitions
    #[must_use]
    pub fn total_rows(&self) -> usize {
        self.partitions.iter().map(Table::len).sum()
    }

    /// Concatenate partitions in order
    #[must_use]
    pub fn concat(&self) -> Table {
        Table::concat(self.partitions.iter().cloned())
    }

    /// Consume and concatenate partitions in order
    #[must_use]
    pub fn into_table(self) -> Table {
        Table::concat(self.partitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::row;
    use proptest::prelude::*;

    fn table(n: usize) -> Table {
        (0..n).map(|i| row([("id", i as u64)])).collect()
    }

    #[test]
    fn sizes_are_balanced() {
        assert_eq!(partition_sizes(10, 3), vec![4, 3, 3]);
        assert_eq!(partition_sizes(9, 3), vec![3, 3, 3]);
        assert_eq!(partition_sizes(2, 4), vec![1, 1, 0, 0]);
        assert!(partition_sizes(5, 0).is_empty());
    }

    #[test]
    fn zero_partitions_rejected() {
        assert_eq!(
            Bag::partition(&table(3), 0),
            Err(TableError::InvalidPartitionCount(0))
        );
    }

    #[test]
    fn more_partitions_than_rows_yields_empty_partitions() {
        let bag = Bag::partition(&table(3), 5).unwrap();
        assert_eq!(bag.partition_lengths(), vec![1, 1, 1, 0, 0]);
        assert_eq!(bag.concat(), table(3));
    }

    #[test]
    fn empty_table_partitions() {
        let bag = Bag::partition(&Table::new(), 3).unwrap();
        assert_eq!(bag.npartitions(), 3);
        assert_eq!(bag.total_rows(), 0);
    }

    proptest! {
        #[test]
        fn prop_partition_is_complete_and_balanced(rows in 1..200usize, n in 1..50usize) {
            let n = n.min(rows);
            let source = table(rows);
            let bag = Bag::partition(&source, n).unwrap();

            prop_assert_eq!(bag.npartitions(), n);
            prop_assert_eq!(bag.total_rows(), rows);

            let lengths = bag.partition_lengths();
            let max = *lengths.iter().max().unwrap();
            let min = *lengths.iter().min().unwrap();
            prop_assert!(max - min <= 1);

            prop_assert_eq!(bag.into_table(), source);
        }
    }
}
