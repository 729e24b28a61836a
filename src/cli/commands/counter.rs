//! Counter command implementation
//!
//! Starts N workers that each bump a shared counter M times, taking the same
//! lock around every increment. The final value must be exactly N * M.

use anyhow::{Result, bail};
use clap::Args;
use crossbeam::channel::{Receiver, Sender, unbounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::cli::Output;
use crate::config::RegistryConfig;
use crate::registry::ThreadRegistry;
use crate::sync::Lock;
use crate::worker::{Task, Worker, WorkerId};

#[derive(Args, Debug, Clone)]
pub struct CounterArgs {
    /// Number of workers (defaults to the number of CPUs)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Increments performed by each worker
    #[arg(short, long, default_value_t = 1000)]
    pub iterations: usize,
}

/// Counter shared by every worker. The read-modify-write is deliberately
/// split into a load and a store so only the lock keeps it correct.
#[derive(Default)]
struct SharedCounter {
    lock: Lock,
    value: AtomicUsize,
}

impl SharedCounter {
    fn increment(&self) {
        let _held = self.lock.guard();
        let current = self.value.load(Ordering::Relaxed);
        self.value.store(current + 1, Ordering::Relaxed);
    }
}

struct CounterTask {
    counter: Arc<SharedCounter>,
    iterations: usize,
    done: Sender<(WorkerId, usize)>,
}

impl Task for CounterTask {
    fn run(&mut self, worker: &Worker) {
        let mut performed = 0;
        while performed < self.iterations && !worker.exit_state() {
            self.counter.increment();
            performed += 1;
        }
        let _ = self.done.send((worker.id(), performed));
    }
}

/// Execute the counter command
pub fn execute(args: CounterArgs, config: RegistryConfig, output: &Output) -> Result<()> {
    let worker_count = args.workers.unwrap_or_else(num_cpus::get);
    if worker_count == 0 {
        bail!("At least one worker is required");
    }

    output.step(&format!(
        "Starting {worker_count} workers, {} increments each",
        args.iterations
    ));

    let registry = ThreadRegistry::with_config(config)?;
    let counter = Arc::new(SharedCounter::default());
    let (done_tx, done_rx) = unbounded();
    let started = Instant::now();

    for _ in 0..worker_count {
        let worker = Worker::new(CounterTask {
            counter: Arc::clone(&counter),
            iterations: args.iterations,
            done: done_tx.clone(),
        });
        registry.start(&worker)?;
    }
    drop(done_tx);

    collect_reports(&done_rx, worker_count, output);
    reap_all(&registry);

    let expected = worker_count * args.iterations;
    let total = counter.value.load(Ordering::Relaxed);
    output.table_row("Workers", &worker_count.to_string());
    output.table_row("Counter", &total.to_string());
    output.table_row("Elapsed", &format!("{:.2?}", started.elapsed()));

    if total != expected {
        bail!("Lost updates: counter is {total}, expected {expected}");
    }

    output.success(&format!("Counter reached {expected} with no lost updates"));
    Ok(())
}

/// Wait for every worker to report how many increments it performed
fn collect_reports(done_rx: &Receiver<(WorkerId, usize)>, expected: usize, output: &Output) {
    for (id, performed) in done_rx.iter().take(expected) {
        output.verbose(&format!("worker {id} finished after {performed} increments"));
    }
}

/// Process the registry until every worker has been reaped
fn reap_all(registry: &ThreadRegistry) {
    while !registry.is_empty() {
        if registry.process() == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}
