//! Breakdown-density search: uniform cost rescaling plus an oscillating
//! halving binary search over the scheduler (spec §4.6).

use std::collections::VecDeque;

use crate::prelude::*;

pub mod prelude {
    pub use super::{multiprocessor_breakdown_density, uniprocessor_breakdown_density};
}

const MEMO_CAPACITY: usize = 10;
const MAX_ITERATIONS: usize = 10_000;

/// A small exact-key LRU cache over tested weights, mirroring the Python
/// original's `functools.lru_cache(maxsize=10)` around the per-weight trial.
struct WeightMemo {
    entries: VecDeque<(u64, (bool, f64))>,
}

impl WeightMemo {
    fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(MEMO_CAPACITY),
        }
    }

    fn get(&mut self, weight: f64) -> Option<(bool, f64)> {
        let key = weight.to_bits();
        if let Some(pos) = self.entries.iter().position(|(k, _)| *k == key) {
            let entry = self.entries.remove(pos).unwrap();
            let value = entry.1;
            self.entries.push_back(entry);
            Some(value)
        } else {
            None
        }
    }

    fn insert(&mut self, weight: f64, value: (bool, f64)) {
        let key = weight.to_bits();
        if self.entries.len() == MEMO_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back((key, value));
    }
}

/// Runs one breakdown-density trial at `weight`: rescale costs, generate the
/// schedule, and report `(schedulable, density_at_this_weight)`.
fn trial(
    scheduler: &mut Scheduler,
    system: &TaskSystem,
    weight: f64,
    memo: &mut WeightMemo,
) -> Result<(bool, f64), SimError> {
    if let Some(cached) = memo.get(weight) {
        return Ok(cached);
    }
    let rescaled = system.rescaled(weight);
    let (_, schedulable) = scheduler.generate_schedule(&rescaled, None)?;
    let result = (schedulable, rescaled.density());
    memo.insert(weight, result);
    Ok(result)
}

/// Shared oscillating-halving search, parameterized only by the initial
/// weight's `m` term (1 for uniprocessor, `num_processors` for
/// multiprocessor) — the rest of §4.6's algorithm is identical between the
/// two entry points.
fn breakdown_density_search(
    scheduler: &mut Scheduler,
    system: &TaskSystem,
    tol: f64,
    warm_cache_rate: f64,
    num_processors: usize,
) -> Result<f64, SimError> {
    let utilization = system.utilization();
    if utilization <= 0.0 {
        return Ok(system.density());
    }
    let min_period = system
        .tasks
        .iter()
        .filter_map(|t| t.period.finite())
        .min()
        .unwrap_or(1) as f64;

    let m = num_processors as f64;
    let n = system.len() as f64;
    let mut w = warm_cache_rate * (m + n / min_period) / utilization;
    let mut step = w;

    let mut memo = WeightMemo::new();
    let mut last_density: Option<f64> = None;
    let mut last_schedulable: Option<bool> = None;

    for _ in 0..MAX_ITERATIONS {
        let (schedulable, density) = trial(scheduler, system, w, &mut memo)?;

        if schedulable
            && last_schedulable == Some(false)
            && last_density.is_some_and(|prev| (density - prev).abs() < tol)
        {
            log::info!("breakdown-density search converged at w={w}, density={density}");
            return Ok(density);
        }

        if !schedulable {
            w -= step;
            step /= 2.0;
        } else {
            w += step;
        }

        last_schedulable = Some(schedulable);
        last_density = Some(density);
    }

    Err(SimError::NonConverged)
}

/// Largest density at which the task system remains schedulable on a
/// uniprocessor, found via the oscillating-halving search of spec §4.6.
pub fn uniprocessor_breakdown_density(
    scheduler: &mut Scheduler,
    system: &TaskSystem,
    tol: f64,
    warm_cache_rate: f64,
) -> Result<f64, SimError> {
    breakdown_density_search(scheduler, system, tol, warm_cache_rate, 1)
}

/// Multiprocessor counterpart of [`uniprocessor_breakdown_density`]; `m` in
/// the initial-weight formula is the scheduler's processor count.
pub fn multiprocessor_breakdown_density(
    scheduler: &mut Scheduler,
    system: &TaskSystem,
    tol: f64,
    warm_cache_rate: f64,
) -> Result<f64, SimError> {
    let num_processors = scheduler.processors().len();
    breakdown_density_search(scheduler, system, tol, warm_cache_rate, num_processors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memo_evicts_oldest_entry_past_capacity() {
        let mut memo = WeightMemo::new();
        for i in 0..MEMO_CAPACITY {
            memo.insert(i as f64, (true, i as f64));
        }
        assert!(memo.get(0.0).is_some());
        memo.insert(MEMO_CAPACITY as f64, (true, MEMO_CAPACITY as f64));
        assert!(memo.get(1.0).is_none());
        assert!(memo.get(MEMO_CAPACITY as f64).is_some());
    }

    #[test]
    fn zero_utilization_system_returns_its_density_without_searching() {
        let task = Task::new(0, TimeSpan::Infinite, 5, Some(TimeSpan::Finite(20)), None).unwrap();
        let system = TaskSystem::new(vec![task]);
        assert_eq!(system.utilization(), 0.0);

        let processor = Processor::new(ProcessorParams::default());
        let mut scheduler = Scheduler::new(PriorityPolicy::edf(), vec![processor], false).unwrap();
        let density = uniprocessor_breakdown_density(&mut scheduler, &system, 1e-3, 1.0).unwrap();
        assert_eq!(density, system.density());
    }
}
