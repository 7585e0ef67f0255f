//! Black-box coverage of the seed scenarios of spec §8, driven entirely
//! through the crate's public interface (no internal test-only helpers).

use rtsim_core::prelude::*;

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

#[test]
fn rejects_invalid_task_construction() {
    assert!(Task::new(0, TimeSpan::Finite(0), 1, None, None).is_err());
    assert!(Task::new(0, TimeSpan::Finite(10), 0, None, None).is_err());
    assert!(Task::new(0, TimeSpan::Infinite, 1, Some(TimeSpan::Infinite), None).is_err());
}

#[test]
fn s1_rm_uniprocessor_is_schedulable_within_hyperperiod() {
    let system = TaskSystem::new(vec![
        task(0, 6, 1, 6, 0),
        task(0, 8, 2, 8, 1),
        task(0, 12, 4, 12, 2),
    ]);
    assert_eq!(system.hyperperiod(), 24);

    let mut scheduler = Scheduler::new(PriorityPolicy::rm(), vec![zero_overhead_cpu()], false).unwrap();
    let (_, schedulable) = scheduler.generate_schedule(&system, None).unwrap();
    assert!(schedulable);
}

#[test]
fn s2_edf_uniprocessor_identical_tasks_schedulable() {
    let system = TaskSystem::new(vec![task(0, 5, 2, 5, 0), task(0, 5, 2, 5, 1)]);
    assert_eq!(system.utilization(), 0.8);

    let mut scheduler = Scheduler::new(PriorityPolicy::edf(), vec![zero_overhead_cpu()], false).unwrap();
    let (_, schedulable) = scheduler.generate_schedule(&system, None).unwrap();
    assert!(schedulable);
}

#[test]
fn s4_np_edf_tightened_cost_misses_deadline() {
    let loose = TaskSystem::new(vec![task(0, 10, 5, 20, 0), task(0, 20, 5, 25, 1)]);
    let mut scheduler = Scheduler::new(
        PriorityPolicy::edf().nonpreemptive(),
        vec![zero_overhead_cpu()],
        false,
    )
    .unwrap();
    let (_, schedulable) = scheduler.generate_schedule(&loose, None).unwrap();
    assert!(schedulable);

    let tight = TaskSystem::new(vec![task(0, 10, 6, 20, 0), task(0, 20, 5, 25, 1)]);
    let mut scheduler = Scheduler::new(
        PriorityPolicy::edf().nonpreemptive(),
        vec![zero_overhead_cpu()],
        false,
    )
    .unwrap();
    let (_, schedulable) = scheduler.generate_schedule(&tight, None).unwrap();
    assert!(!schedulable);
}

#[test]
fn s5_cache_warmup_strictly_increases_breakdown_density() {
    let system = TaskSystem::new(
        (0..10)
            .map(|i| task(0, 20 + i * 5, 2 + (i % 3), 20 + i * 5, i as u64))
            .collect(),
    );

    let cold = Processor::new(ProcessorParams {
        schedule_cost: 4,
        dispatch_cost: 1,
        preemption_cost: 2,
        cache_warmup_time: Some(65),
        warm_cache_rate: 1.0,
    });
    let mut cold_scheduler = Scheduler::new(PriorityPolicy::edf(), vec![cold], false).unwrap();
    let cold_density = uniprocessor_breakdown_density(&mut cold_scheduler, &system, 1e-3, 1.0).unwrap();

    let warm = Processor::new(ProcessorParams {
        schedule_cost: 4,
        dispatch_cost: 1,
        preemption_cost: 2,
        cache_warmup_time: Some(65),
        warm_cache_rate: 50.0,
    });
    let mut warm_scheduler = Scheduler::new(PriorityPolicy::edf(), vec![warm], false).unwrap();
    let warm_density = uniprocessor_breakdown_density(&mut warm_scheduler, &system, 1e-3, 50.0).unwrap();

    assert!(warm_density > cold_density);
}

#[test]
fn s6_restricted_migration_pins_each_task_to_its_first_cpu() {
    // Three processors but only two tasks competing for two of them at a
    // time: under GR-EDF a displaced incumbent can never reclaim a CPU other
    // than the one it was first dispatched on, unlike plain G-EDF.
    let system = TaskSystem::new(vec![
        task(0, 6, 4, 6, 0),
        task(2, 6, 4, 6, 1),
        task(4, 6, 2, 6, 2),
    ]);

    let cpus = (0..2).map(|_| zero_overhead_cpu()).collect();
    let mut scheduler = Scheduler::new(PriorityPolicy::edf(), cpus, true).unwrap();
    let (traces, _) = scheduler.generate_schedule(&system, Some(18)).unwrap();

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

#[test]
fn plain_taskset_round_trips_through_the_text_format() {
    let rendered = "0, 10, 3, 10, 0\n5, inf, 2, 20, 1\n";
    let path = std::env::temp_dir().join(format!("rtsim-core-test-{}.txt", std::process::id()));
    std::fs::write(&path, rendered).unwrap();

    let tasks = parse_taskset(path.to_str().unwrap(), TasksetFileType::Plain).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].period, TimeSpan::Finite(10));
    assert_eq!(tasks[1].period, TimeSpan::Infinite);
    assert_eq!(tasks[1].relative_deadline, TimeSpan::Finite(20));
}
