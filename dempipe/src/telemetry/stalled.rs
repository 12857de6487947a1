//! Registry of branches left incomplete by a failed task.

use chrono::{DateTime, Local};
use dashmap::DashMap;

use crate::executor::BranchKey;

/// One stalled branch.
#[derive(Clone, Debug)]
pub struct StalledBranch {
    pub branch: BranchKey,
    pub reason: String,
    pub at: DateTime<Local>,
}

/// Concurrent map of stalled branches keyed by (tile, stage).
///
/// A branch is recorded once; a later failure of the same branch replaces
/// the earlier reason.
#[derive(Debug, Default)]
pub struct StalledRegistry {
    branches: DashMap<BranchKey, StalledBranch>,
}

impl StalledRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, branch: BranchKey, reason: impl Into<String>) {
        let entry = StalledBranch {
            branch: branch.clone(),
            reason: reason.into(),
            at: Local::now(),
        };
        self.branches.insert(branch, entry);
    }

    pub fn contains(&self, branch: &BranchKey) -> bool {
        self.branches.contains_key(branch)
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Stalled branches, oldest first.
    pub fn list(&self) -> Vec<StalledBranch> {
        let mut list: Vec<StalledBranch> = self.branches.iter().map(|e| e.value().clone()).collect();
        list.sort_by_key(|b| b.at);
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::TaskKind;
    use crate::tile::{Product, TileId};

    fn key(tile: &str, product: Option<Product>) -> BranchKey {
        BranchKey {
            tile: TileId::new(tile),
            kind: TaskKind::Interpolate,
            product,
        }
    }

    #[test]
    fn test_record_and_list() {
        let registry = StalledRegistry::new();
        assert!(registry.is_empty());

        registry.record(key("37EN1_3", Some(Product::Dtm)), "read failed");
        registry.record(key("37EN1_3", Some(Product::Dsm)), "read failed");
        registry.record(key("37EN1_3", Some(Product::Dtm)), "panicked");

        assert_eq!(registry.len(), 2);
        assert!(registry.contains(&key("37EN1_3", Some(Product::Dsm))));
        let reasons: Vec<String> = registry.list().into_iter().map(|b| b.reason).collect();
        assert!(reasons.contains(&"panicked".to_string()));
    }
}
