//! Handoff command implementation
//!
//! A consumer worker sleeps on a wait condition until a producer worker sets
//! a shared flag under the lock and wakes it.

use anyhow::{Context, Result, bail};
use clap::Args;
use crossbeam::channel::bounded;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::cli::Output;
use crate::config::RegistryConfig;
use crate::registry::ThreadRegistry;
use crate::sync::WaitCondition;
use crate::worker::Worker;

#[derive(Args, Debug, Clone)]
pub struct HandoffArgs {
    /// Milliseconds the producer waits before setting the flag
    #[arg(long, default_value_t = 50)]
    pub delay_ms: u64,
}

/// Flag guarded by the wait condition's lock
#[derive(Default)]
struct Handoff {
    cond: WaitCondition,
    ready: AtomicBool,
}

impl Handoff {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    fn publish(&self) {
        self.cond.lock();
        self.ready.store(true, Ordering::Relaxed);
        self.cond.wakeup();
        self.cond.unlock();
    }

    /// Returns the flag as observed right after the final wait returned,
    /// along with how many times the consumer slept.
    fn consume(&self) -> (bool, usize) {
        let mut waits = 0;
        self.cond.lock();
        while !self.is_ready() {
            self.cond.wait();
            waits += 1;
        }
        let observed = self.is_ready();
        self.cond.unlock();
        (observed, waits)
    }
}

/// The producer goes first: a consumer started without one would wait
/// forever and hang the registry's shutdown.
fn start_pair(registry: &ThreadRegistry, producer: &Worker, consumer: &Worker) -> Result<()> {
    registry.start(producer)?;
    registry.start(consumer)?;
    Ok(())
}

/// Execute the handoff command
pub fn execute(args: HandoffArgs, config: RegistryConfig, output: &Output) -> Result<()> {
    let registry = ThreadRegistry::with_config(config)?;
    let handoff = Arc::new(Handoff::default());
    let (result_tx, result_rx) = bounded(1);

    let consumer = {
        let handoff = Arc::clone(&handoff);
        Worker::new(move |_: &Worker| {
            let _ = result_tx.send(handoff.consume());
        })
    };

    let producer = {
        let handoff = Arc::clone(&handoff);
        let delay = Duration::from_millis(args.delay_ms);
        Worker::new(move |_: &Worker| {
            thread::sleep(delay);
            handoff.publish();
        })
    };

    output.step("Starting producer and consumer");
    start_pair(&registry, &producer, &consumer)?;

    let (observed, waits) = result_rx.recv().context("Consumer exited without reporting")?;
    producer.join()?;
    consumer.join()?;
    registry.process();

    output.table_row("Flag observed", &observed.to_string());
    output.table_row("Waits", &waits.to_string());

    if !observed {
        bail!("Consumer returned from wait without seeing the flag");
    }

    output.success("Consumer observed the flag after wakeup");
    Ok(())
}
