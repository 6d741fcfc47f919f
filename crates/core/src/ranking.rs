//! Bounded, fitness-ordered store of the best nest results.

use crate::result::NestResult;
use crate::{Error, Result};
use std::sync::Mutex;

/// Outcome of offering a result to [`TopNestResults`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryAddResult {
    /// The result was inserted at `position`; `elite` is true when it landed in the
    /// protected range.
    Added { position: usize, elite: bool },
    /// A result with the same placement signature is already retained.
    Duplicate,
    /// The store is full and the result is not better than the worst entry.
    Rejected,
}

impl TryAddResult {
    /// Returns true if the result was retained.
    pub fn is_added(&self) -> bool {
        matches!(self, TryAddResult::Added { .. })
    }
}

/// Ascending-by-fitness collection of the best results seen so far.
///
/// Entries `0..elite_count` form the protected elite range. The capacity is never
/// smaller than the elite range, so evicting the last entry can never remove an elite.
#[derive(Debug)]
pub struct TopNestResults {
    items: Mutex<Vec<NestResult>>,
    capacity: usize,
    elite_count: usize,
}

impl TopNestResults {
    /// Creates an empty store.
    pub fn new(capacity: usize, elite_count: usize) -> Self {
        let capacity = capacity.max(elite_count).max(1);
        Self {
            items: Mutex::new(Vec::with_capacity(capacity + 1)),
            capacity,
            elite_count,
        }
    }

    /// Maximum number of retained results.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Size of the protected range.
    pub fn elite_count(&self) -> usize {
        self.elite_count
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<NestResult>>> {
        self.items
            .lock()
            .map_err(|e| Error::Internal(format!("ranking store lock poisoned: {}", e)))
    }

    /// Offers a result, keeping the store sorted, bounded and free of duplicates.
    pub fn try_add(&self, result: NestResult) -> Result<TryAddResult> {
        let signature = result.signature();
        let mut items = self.lock()?;

        if items.iter().any(|r| r.signature() == signature) {
            return Ok(TryAddResult::Duplicate);
        }

        if items.len() >= self.capacity {
            if let Some(worst) = items.last() {
                if result.fitness >= worst.fitness {
                    return Ok(TryAddResult::Rejected);
                }
            }
        }

        // Equal fitness goes after existing entries so earlier results keep their rank.
        let position = items.partition_point(|r| r.fitness <= result.fitness);
        items.insert(position, result);
        if items.len() > self.capacity {
            items.pop();
        }

        Ok(TryAddResult::Added {
            position,
            elite: position < self.elite_count,
        })
    }

    /// Returns a copy of the best result.
    pub fn top(&self) -> Result<Option<NestResult>> {
        Ok(self.lock()?.first().cloned())
    }

    /// Returns the fitness of the best result.
    pub fn best_fitness(&self) -> Result<Option<f64>> {
        Ok(self.lock()?.first().map(|r| r.fitness))
    }

    /// Returns a copy of all retained results, best first.
    pub fn snapshot(&self) -> Result<Vec<NestResult>> {
        Ok(self.lock()?.clone())
    }

    /// Returns copies of the elite range.
    pub fn elites(&self) -> Result<Vec<NestResult>> {
        let items = self.lock()?;
        Ok(items.iter().take(self.elite_count).cloned().collect())
    }

    /// Number of retained results.
    pub fn len(&self) -> usize {
        self.lock().map(|items| items.len()).unwrap_or(0)
    }

    /// Returns true if nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every result.
    pub fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{PartPlacement, SheetPlacement};

    fn result(fitness: f64, x: f64) -> NestResult {
        let mut sheet = SheetPlacement::new(0, 0, 100.0);
        sheet.placements.push(PartPlacement {
            id: 0,
            source: 0,
            x,
            y: 0.0,
            rotation: 0.0,
            order: 0,
        });
        let mut r = NestResult::new();
        r.sheets.push(sheet);
        r.fitness = fitness;
        r
    }

    fn fitnesses(store: &TopNestResults) -> Vec<f64> {
        store
            .snapshot()
            .unwrap()
            .iter()
            .map(|r| r.fitness)
            .collect()
    }

    #[test]
    fn test_sorted_insert() {
        let store = TopNestResults::new(5, 1);
        store.try_add(result(3.0, 3.0)).unwrap();
        store.try_add(result(1.0, 1.0)).unwrap();
        let outcome = store.try_add(result(2.0, 2.0)).unwrap();

        assert_eq!(
            outcome,
            TryAddResult::Added {
                position: 1,
                elite: false
            }
        );
        assert_eq!(fitnesses(&store), vec![1.0, 2.0, 3.0]);
        assert_eq!(store.best_fitness().unwrap(), Some(1.0));
    }

    #[test]
    fn test_duplicate_rejected() {
        let store = TopNestResults::new(5, 1);
        assert!(store.try_add(result(1.0, 10.0)).unwrap().is_added());
        // Same layout, different fitness.
        assert_eq!(
            store.try_add(result(0.5, 10.0)).unwrap(),
            TryAddResult::Duplicate
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_bound_and_rejection() {
        let store = TopNestResults::new(3, 1);
        for (i, f) in [5.0, 4.0, 3.0].iter().enumerate() {
            store.try_add(result(*f, i as f64)).unwrap();
        }
        assert_eq!(
            store.try_add(result(6.0, 10.0)).unwrap(),
            TryAddResult::Rejected
        );
        assert_eq!(
            store.try_add(result(5.0, 11.0)).unwrap(),
            TryAddResult::Rejected
        );

        assert!(store.try_add(result(1.0, 12.0)).unwrap().is_added());
        assert_eq!(store.len(), 3);
        assert_eq!(fitnesses(&store), vec![1.0, 3.0, 4.0]);
    }

    #[test]
    fn test_elites_survive_inserts() {
        let store = TopNestResults::new(3, 2);
        store.try_add(result(1.0, 1.0)).unwrap();
        store.try_add(result(2.0, 2.0)).unwrap();
        store.try_add(result(9.0, 9.0)).unwrap();

        for i in 0..20 {
            store.try_add(result(3.0 + i as f64 * 0.1, 100.0 + i as f64)).unwrap();
        }

        let elites = store.elites().unwrap();
        assert_eq!(elites.len(), 2);
        assert_eq!(elites[0].fitness, 1.0);
        assert_eq!(elites[1].fitness, 2.0);
        assert!(store.len() <= store.capacity());
    }

    #[test]
    fn test_capacity_covers_elites() {
        let store = TopNestResults::new(1, 4);
        assert_eq!(store.capacity(), 4);
    }

    #[test]
    fn test_new_best_reports_elite() {
        let store = TopNestResults::new(4, 2);
        store.try_add(result(5.0, 5.0)).unwrap();
        assert_eq!(
            store.try_add(result(1.0, 1.0)).unwrap(),
            TryAddResult::Added {
                position: 0,
                elite: true
            }
        );
        store.clear().unwrap();
        assert!(store.is_empty());
    }
}
