//! The discrete-event scheduling loops: uniprocessor and multiprocessor,
//! the latter with optional restricted migration.

use std::collections::HashMap;
use std::rc::Rc;

use crate::priority;
use crate::prelude::*;

pub mod prelude {
    pub use super::Scheduler;
}

/// Computes the simulation horizon when the caller does not supply one.
///
/// The tight `hyperperiod` bound only holds when every task is synchronous
/// (`phase == 0`) and has an implicit-or-tighter deadline; otherwise the
/// Leung–Merrill bound is used.
fn compute_final_time(system: &TaskSystem) -> u64 {
    let hyperperiod = system.hyperperiod();
    let all_synchronous_and_constrained = system
        .tasks
        .iter()
        .all(|t| t.phase == 0 && t.relative_deadline <= t.period);

    if all_synchronous_and_constrained {
        return hyperperiod;
    }

    let max_relative_deadline = system
        .tasks
        .iter()
        .filter_map(|t| t.relative_deadline.finite())
        .max()
        .unwrap_or(0);
    let max_phase = system.tasks.iter().map(|t| t.phase).max().unwrap_or(0);

    2 * hyperperiod + max_relative_deadline + max_phase
}

/// Is `deadline` strictly after `t`? (An infinite deadline is always after
/// any finite time.) Used by the final schedulability check of §4.4/§4.5:
/// every job still pending at the horizon must have a deadline beyond it.
fn deadline_after(deadline: TimeSpan, t: u64) -> bool {
    match deadline {
        TimeSpan::Finite(d) => d > t,
        TimeSpan::Infinite => true,
    }
}

/// Drives a [`PriorityPolicy`] across one or several [`Processor`]s.
///
/// Construct with [`Scheduler::new`], which rejects the Pfair-plus-warmup
/// combination up front (§9's "Open question — Pfair with warmup", resolved
/// to fail fast with [`SimError::UnsupportedConfig`]).
pub struct Scheduler {
    priority: PriorityPolicy,
    processors: Vec<Processor>,
    restrict_migration: bool,
}

impl Scheduler {
    pub fn new(
        priority: PriorityPolicy,
        processors: Vec<Processor>,
        restrict_migration: bool,
    ) -> Result<Self, SimError> {
        if priority.base() == BasePriority::Pfair
            && processors.iter().any(|p| p.cache_warmup_time().is_some())
        {
            return Err(SimError::unsupported_config(
                "Pfair priority cannot be combined with cache warmup",
            ));
        }
        Ok(Self {
            priority,
            processors,
            restrict_migration,
        })
    }

    pub fn processors(&self) -> &[Processor] {
        &self.processors
    }

    fn max_warm_cache_rate(&self) -> f64 {
        let max = self
            .processors
            .iter()
            .map(|p| ordered_float::OrderedFloat(p.warm_cache_rate()))
            .max();

        match max {
            Some(max) => *max,
            None => 0f64,
        }
    }

    /// Resets every processor's clock, trace, and execution rate so the
    /// scheduler can be reused across successive breakdown-density trials.
    pub fn reset(&mut self) {
        for processor in &mut self.processors {
            processor.reset();
        }
    }

    /// Produces the execution trace(s) for `system` and decides
    /// schedulability.
    ///
    /// Dispatches to the uniprocessor loop when there is exactly one
    /// processor and to the multiprocessor loop otherwise, per spec §4.4/§4.5.
    pub fn generate_schedule(
        &mut self,
        system: &TaskSystem,
        final_time: Option<u64>,
    ) -> Result<(Vec<Trace>, bool), SimError> {
        let final_time = final_time.unwrap_or_else(|| compute_final_time(system));
        self.reset();

        if self.processors.len() == 1 {
            let schedulable = self.run_uniprocessor(system, final_time)?;
            Ok((vec![self.processors[0].trace.clone()], schedulable))
        } else {
            let schedulable = self.run_multiprocessor(system, final_time)?;
            let traces = self.processors.iter().map(|p| p.trace.clone()).collect();
            Ok((traces, schedulable))
        }
    }

    fn run_uniprocessor(&mut self, system: &TaskSystem, final_time: u64) -> Result<bool, SimError> {
        log::debug!("uniprocessor schedule start, final_time={final_time}");

        if system.utilization() > self.processors[0].warm_cache_rate() {
            log::debug!("fast reject: utilization exceeds warm cache rate");
            return Ok(false);
        }

        // Descending by release so jobs are consumed by popping the tail
        // (smallest release first, matching spec §5's ordering discipline).
        let mut remaining_jobs = system.generate_jobs(final_time);
        remaining_jobs.sort_by(|a, b| b.release.cmp(&a.release));

        let mut released: Vec<Rc<Job>> = Vec::new();
        let cpu = &mut self.processors[0];

        while cpu.time < final_time && (!remaining_jobs.is_empty() || !released.is_empty()) {
            while let Some(job) = remaining_jobs.last() {
                if job.release > cpu.time {
                    break;
                }
                released.push(remaining_jobs.pop().unwrap());
            }

            if released.is_empty() {
                let next_release = remaining_jobs.last().map(|j| j.release).unwrap_or(final_time);
                cpu.idle_until(next_release.min(final_time));
                continue;
            }

            let incumbent_job = cpu.last_job_scheduled().filter(|j| !j.has_completed());
            let mut candidate_idx = None;
            let mut candidate_priority = match &incumbent_job {
                Some(job) => self.priority.evaluate(job, cpu.time)?,
                None => f64::INFINITY,
            };
            for (idx, job) in released.iter().enumerate() {
                if incumbent_job
                    .as_ref()
                    .is_some_and(|incumbent| Rc::ptr_eq(incumbent, job))
                {
                    continue;
                }
                let p = self.priority.evaluate(job, cpu.time)?;
                if priority::strictly_better(p, candidate_priority) {
                    candidate_priority = p;
                    candidate_idx = Some(idx);
                }
            }

            let candidate = match candidate_idx {
                Some(idx) => Rc::clone(&released[idx]),
                None => Rc::clone(incumbent_job.as_ref().expect(
                    "no candidate index means the incumbent beat every released job, so it must exist",
                )),
            };

            cpu.schedule_job(Rc::clone(&candidate));

            if candidate.has_completed() {
                released.retain(|j| !Rc::ptr_eq(j, &candidate));
            } else if candidate.deadline.exceeded_by(cpu.time) {
                log::debug!("deadline miss: {candidate}");
                return Ok(false);
            }
        }

        let schedulable = remaining_jobs
            .iter()
            .chain(released.iter())
            .all(|j| deadline_after(j.deadline, final_time));

        log::debug!("uniprocessor schedule end, schedulable={schedulable}");
        Ok(schedulable)
    }

    fn run_multiprocessor(&mut self, system: &TaskSystem, final_time: u64) -> Result<bool, SimError> {
        log::debug!("multiprocessor schedule start, final_time={final_time}");

        let n = self.processors.len() as f64;
        if system.utilization() > n * self.max_warm_cache_rate() {
            log::debug!("fast reject: utilization exceeds aggregate warm cache rate");
            return Ok(false);
        }

        let mut remaining_jobs = system.generate_jobs(final_time);
        remaining_jobs.sort_by(|a, b| b.release.cmp(&a.release));

        let mut released: Vec<Rc<Job>> = Vec::new();
        // Keyed by job identity: jobs stay alive for the scheduler run via
        // Rc clones held in `released` and in processors' trace segments,
        // so the raw pointer can never be reused by a different job while
        // it is a key here (no ABA).
        let mut home: HashMap<*const Job, usize> = HashMap::new();

        while self.processors[0].time < final_time
            && (!remaining_jobs.is_empty() || !released.is_empty())
        {
            let t = self.processors[0].time;

            while let Some(job) = remaining_jobs.last() {
                if job.release > t {
                    break;
                }
                released.push(remaining_jobs.pop().unwrap());
            }

            if released.is_empty() {
                let next_release = remaining_jobs.last().map(|j| j.release).unwrap_or(final_time);
                let target = next_release.min(final_time);
                for cpu in &mut self.processors {
                    cpu.idle_until(target);
                }
                continue;
            }

            let mut assignments: Vec<Option<Rc<Job>>> = self
                .processors
                .iter()
                .map(|cpu| cpu.last_job_scheduled().filter(|j| !j.has_completed()))
                .collect();

            if self.restrict_migration {
                for job in &released {
                    if let Some(&cpu_idx) = home.get(&(Rc::as_ptr(job))) {
                        let replace = match &assignments[cpu_idx] {
                            Some(current) if Rc::ptr_eq(current, job) => false,
                            Some(current) => {
                                let p = self.priority.evaluate(job, t)?;
                                let current_p = self.priority.evaluate(current, t)?;
                                priority::strictly_better(p, current_p)
                            }
                            None => true,
                        };
                        if replace {
                            assignments[cpu_idx] = Some(Rc::clone(job));
                        }
                    }
                }
            }

            for job in &released {
                let already_assigned = assignments.iter().any(|a| a.as_ref().is_some_and(|j| Rc::ptr_eq(j, job)));
                if already_assigned {
                    continue;
                }
                if self.restrict_migration && home.contains_key(&(Rc::as_ptr(job))) {
                    continue;
                }

                if let Some(empty_idx) = assignments.iter().position(|a| a.is_none()) {
                    assignments[empty_idx] = Some(Rc::clone(job));
                    continue;
                }

                let job_priority = self.priority.evaluate(job, t)?;
                let priorities = assignments
                    .iter()
                    .enumerate()
                    .filter_map(|(idx, assigned)| assigned.as_ref().map(|assigned_job| (idx, assigned_job)))
                    .map(|(idx, assigned_job)| {
                        self.priority
                            .evaluate(assigned_job, t)
                            .map(|p| (idx, ordered_float::OrderedFloat(p)))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let worst = priorities.into_iter().max_by_key(|&(_, p)| p);

                if let Some((worst_idx, worst_priority)) = worst {
                    if priority::strictly_better(job_priority, *worst_priority) {
                        assignments[worst_idx] = Some(Rc::clone(job));
                    }
                }
            }

            for (idx, assignment) in assignments.iter().enumerate() {
                if let Some(job) = assignment {
                    self.processors[idx].schedule_job(Rc::clone(job));
                }
            }
            for cpu in &mut self.processors {
                cpu.idle_until(t + 1);
            }

            if self.restrict_migration {
                for (idx, assignment) in assignments.iter().enumerate() {
                    if let Some(job) = assignment {
                        home.insert(Rc::as_ptr(job), idx);
                    }
                }
            }

            for (idx, assignment) in assignments.iter().enumerate() {
                if let Some(job) = assignment {
                    if job.has_completed() {
                        home.remove(&Rc::as_ptr(job));
                        released.retain(|j| !Rc::ptr_eq(j, job));
                    } else if job.deadline.exceeded_by(self.processors[idx].time) {
                        log::debug!("deadline miss: {job}");
                        return Ok(false);
                    }
                }
            }
        }

        let final_clock = self.processors[0].time;
        let schedulable = remaining_jobs
            .iter()
            .chain(released.iter())
            .all(|j| deadline_after(j.deadline, final_clock));

        log::debug!("multiprocessor schedule end, schedulable={schedulable}");
        Ok(schedulable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(phase: u64, period: u64, cost: u64, deadline: u64, id: u64) -> Task {
        Task::new(
            phase,
            TimeSpan::Finite(period),
            cost,
            Some(TimeSpan::Finite(deadline)),
            Some(id),
        )
        .unwrap()
    }

    fn zero_overhead_cpu() -> Processor {
        Processor::new(ProcessorParams::default())
    }

    // S1 — RM uniprocessor, synchronous three-task system. The first three
    // segments are exact; later ticks are exercised for schedulability only.
    #[test]
    fn s1_rm_uniprocessor_synchronous() {
        let system = TaskSystem::new(vec![
            task(0, 6, 1, 6, 0),
            task(0, 8, 2, 8, 1),
            task(0, 12, 4, 12, 2),
        ]);
        let mut scheduler =
            Scheduler::new(PriorityPolicy::rm(), vec![zero_overhead_cpu()], false).unwrap();
        let (traces, schedulable) = scheduler.generate_schedule(&system, None).unwrap();

        assert!(schedulable);
        let segments = &traces[0].segments;
        assert_eq!((segments[0].start, segments[0].end), (0, 1));
        assert_eq!((segments[1].start, segments[1].end), (1, 3));
        assert_eq!((segments[2].start, segments[2].end), (3, 6));
        assert_eq!(segments[0].job.task.id, Some(0));
        assert_eq!(segments[1].job.task.id, Some(1));
        assert_eq!(segments[2].job.task.id, Some(2));
    }

    // S2 — EDF uniprocessor, two identical tasks at utilization 0.8.
    #[test]
    fn s2_edf_uniprocessor_identical_tasks() {
        let system = TaskSystem::new(vec![task(0, 5, 2, 5, 0), task(0, 5, 2, 5, 1)]);
        assert_eq!(system.utilization(), 0.8);

        let mut scheduler =
            Scheduler::new(PriorityPolicy::edf(), vec![zero_overhead_cpu()], false).unwrap();
        let (_, schedulable) = scheduler.generate_schedule(&system, None).unwrap();
        assert!(schedulable);
    }

    // S3 — G-EDF over 3 processors, overloaded (utilization 2.4 <= 3).
    #[test]
    fn s3_gedf_three_processors_overloaded() {
        let costs = [60, 60, 60, 40, 20];
        let deadlines = [100, 80, 60, 40, 20];
        let tasks = (0..5)
            .map(|i| task(i as u64 * 10, 100, costs[i], deadlines[i], i as u64))
            .collect();
        let system = TaskSystem::new(tasks);
        assert_eq!(system.utilization(), 2.4);

        let cpus = (0..3).map(|_| zero_overhead_cpu()).collect();
        let mut scheduler = Scheduler::new(PriorityPolicy::edf(), cpus, false).unwrap();
        let (traces, schedulable) = scheduler.generate_schedule(&system, None).unwrap();
        assert!(schedulable);
        assert_eq!(traces.len(), 3);
    }

    // S4 — NP-EDF: the tight task system meets every deadline, but tightening
    // the first task's cost by one tick causes a miss.
    #[test]
    fn s4_np_edf_deadline_miss() {
        let schedulable_system = TaskSystem::new(vec![task(0, 10, 5, 20, 0), task(0, 20, 5, 25, 1)]);
        let mut scheduler = Scheduler::new(
            PriorityPolicy::edf().nonpreemptive(),
            vec![zero_overhead_cpu()],
            false,
        )
        .unwrap();
        let (_, schedulable) = scheduler.generate_schedule(&schedulable_system, None).unwrap();
        assert!(schedulable);

        let unschedulable_system = TaskSystem::new(vec![task(0, 10, 6, 20, 0), task(0, 20, 5, 25, 1)]);
        let mut scheduler = Scheduler::new(
            PriorityPolicy::edf().nonpreemptive(),
            vec![zero_overhead_cpu()],
            false,
        )
        .unwrap();
        let (_, schedulable) = scheduler.generate_schedule(&unschedulable_system, None).unwrap();
        assert!(!schedulable);
    }

    // S6 — restricted migration: once a task first runs on a CPU, every later
    // slot for it stays on that CPU, which need not hold for plain G-EDF.
    #[test]
    fn s6_restricted_migration_pins_task_to_its_first_cpu() {
        let system = TaskSystem::new(vec![
            task(0, 4, 3, 4, 0),
            task(0, 4, 3, 4, 1),
            task(0, 4, 2, 4, 2),
        ]);
        let cpus = (0..2).map(|_| zero_overhead_cpu()).collect();
        let mut scheduler = Scheduler::new(PriorityPolicy::edf(), cpus, true).unwrap();
        let (traces, _) = scheduler.generate_schedule(&system, Some(16)).unwrap();

        let mut home: std::collections::HashMap<u64, usize> = std::collections::HashMap::new();
        for (cpu_idx, trace) in traces.iter().enumerate() {
            for segment in &trace.segments {
                if let Some(id) = segment.job.task.id {
                    let recorded = *home.entry(id).or_insert(cpu_idx);
                    assert_eq!(
                        recorded, cpu_idx,
                        "task {id} ran on CPU {cpu_idx} after being pinned to CPU {recorded}"
                    );
                }
            }
        }
    }

    // Universal invariant: all processors' clocks match after every tick.
    #[test]
    fn multiprocessor_clocks_stay_aligned() {
        let system = TaskSystem::new(vec![task(0, 5, 2, 5, 0), task(0, 7, 3, 7, 1)]);
        let cpus = (0..2).map(|_| zero_overhead_cpu()).collect();
        let mut scheduler = Scheduler::new(PriorityPolicy::edf(), cpus, false).unwrap();
        scheduler.generate_schedule(&system, None).unwrap();
        let times: Vec<u64> = scheduler.processors().iter().map(|p| p.time).collect();
        assert!(times.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn final_time_override_is_honored() {
        // Two releases of a period-10 task fit in final_time=25; a third
        // would not, so the override must cap the horizon below its own
        // hyperperiod of 10.
        let system = TaskSystem::new(vec![task(0, 10, 1, 10, 0)]);
        let mut scheduler =
            Scheduler::new(PriorityPolicy::rm(), vec![zero_overhead_cpu()], false).unwrap();
        let (traces, _) = scheduler.generate_schedule(&system, Some(25)).unwrap();
        assert!(scheduler.processors()[0].time <= 25);
        assert!(traces[0].segments.iter().all(|s| s.end <= 25));
        assert_eq!(traces[0].segments.len(), 3);
    }
}
