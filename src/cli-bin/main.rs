use crate::prelude::*;
use rtsim_core::prelude::*;

pub mod prelude {
    pub use super::args::prelude::*;
}

pub mod args;

fn main() {
    env_logger::init();

    let args = match <Args as clap::Parser>::try_parse() {
        Ok(args) => args,
        Err(err) => {
            use clap::error::ErrorKind::*;

            let exit_code = match err.kind() {
                DisplayHelp | DisplayHelpOnMissingArgumentOrSubcommand | DisplayVersion => 0,
                _ => 2,
            };

            err.print().unwrap();
            std::process::exit(exit_code);
        }
    };

    let quiet = args.quiet;
    match run(args) {
        Ok(schedulable) => {
            if quiet {
                std::process::exit(if schedulable { 0 } else { 1 });
            } else if schedulable {
                println!("schedulable");
            } else {
                println!("not schedulable");
            }
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    }
}

fn run(args: Args) -> Result<bool, Box<dyn std::error::Error>> {
    if args.policy.num_processors == 0 {
        return Err("must specify a positive number of CPUs".into());
    }

    let tasks = parse_taskset(&args.taskset.taskset_file, args.taskset.taskset_file_ty)?;
    let system = TaskSystem::new(tasks);

    let (priority, restrict_migration) = args.policy.algorithm.resolve();

    let processor_params = ProcessorParams {
        schedule_cost: args.processor.schedule_cost,
        dispatch_cost: args.processor.dispatch_cost,
        preemption_cost: args.processor.preemption_cost,
        cache_warmup_time: args.processor.cache_warmup_time,
        warm_cache_rate: args.processor.warm_cache_rate,
    };
    let processors = (0..args.policy.num_processors)
        .map(|_| Processor::new(processor_params))
        .collect();

    let mut scheduler = Scheduler::new(priority, processors, restrict_migration)?;

    if args.breakdown.enabled {
        let density = if args.policy.num_processors == 1 {
            uniprocessor_breakdown_density(
                &mut scheduler,
                &system,
                args.breakdown.tol,
                args.processor.warm_cache_rate,
            )?
        } else {
            multiprocessor_breakdown_density(
                &mut scheduler,
                &system,
                args.breakdown.tol,
                args.processor.warm_cache_rate,
            )?
        };
        println!("breakdown density: {density}");
        return Ok(true);
    }

    let (traces, schedulable) = scheduler.generate_schedule(&system, args.policy.final_time)?;
    if !args.quiet {
        for (idx, trace) in traces.iter().enumerate() {
            println!("--- processor {idx} ---");
            println!("{}", render_trace(trace));
        }
    }

    Ok(schedulable)
}
