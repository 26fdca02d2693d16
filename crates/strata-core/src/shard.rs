//! Deterministic partitioning of event streams across physical tables.
//!
//! The partition of an aggregate is derived from its identifier alone, so the
//! hash must never change: rows written by one process are located by every
//! later process through the same function.

/// Stable 32-bit polynomial hash of an aggregate identifier.
///
/// Seeded with 23, each UTF-16 code unit `c` folds in as `h * 31 + c` with
/// wrapping 32-bit signed arithmetic; the result is folded to non-negative.
#[must_use]
pub fn stable_hash(id: &str) -> u32 {
    id.encode_utf16()
        .fold(23_i32, |hash, unit| {
            hash.wrapping_mul(31).wrapping_add(i32::from(unit))
        })
        .unsigned_abs()
}

/// Returns the partition index for `id`, or `None` when `table_count <= 1`.
#[must_use]
pub fn partition_of(id: &str, table_count: u32) -> Option<u32> {
    (table_count > 1).then(|| stable_hash(id) % table_count)
}

/// Names the physical table (and per-table constraints) of a sharded relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardedTable {
    base_name: String,
    table_count: u32,
}

impl ShardedTable {
    /// Creates a naming scheme for `table_count` partitions of `base_name`.
    #[must_use]
    pub fn new(base_name: impl Into<String>, table_count: u32) -> Self {
        Self {
            base_name: base_name.into(),
            table_count,
        }
    }

    /// Longest name [`ShardedTable::suffixed`] produces for `name` across
    /// every partition.
    #[must_use]
    pub fn longest_suffixed(&self, name: &str) -> String {
        let last = self.table_count.checked_sub(1).filter(|&last| last > 0);
        self.suffixed(name, last)
    }

    /// Partition holding `aggregate_root_id`.
    #[must_use]
    pub fn partition_of(&self, aggregate_root_id: &str) -> Option<u32> {
        partition_of(aggregate_root_id, self.table_count)
    }

    /// Physical table holding `aggregate_root_id`.
    #[must_use]
    pub fn table_for(&self, aggregate_root_id: &str) -> String {
        self.suffixed(&self.base_name, self.partition_of(aggregate_root_id))
    }

    /// Name of `constraint` on the table holding `aggregate_root_id`.
    #[must_use]
    pub fn constraint_for(&self, constraint: &str, aggregate_root_id: &str) -> String {
        self.suffixed(constraint, self.partition_of(aggregate_root_id))
    }

    /// Every physical table, with its partition index.
    #[must_use]
    pub fn partitions(&self) -> Vec<(Option<u32>, String)> {
        if self.table_count <= 1 {
            return vec![(None, self.base_name.clone())];
        }
        (0..self.table_count)
            .map(|index| (Some(index), self.suffixed(&self.base_name, Some(index))))
            .collect()
    }

    /// Applies the `{name}_{index}` suffix scheme.
    #[must_use]
    pub fn suffixed(&self, name: &str, partition: Option<u32>) -> String {
        match partition {
            Some(index) => format!("{name}_{index}"),
            None => name.to_owned(),
        }
    }
}
