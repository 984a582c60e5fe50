//! # Example: device
//!
//! Simulates a device through several boots, each ending in a different way.
//!
//! Shows how to:
//! - Run the task set on a [`SimHost`] with a [`LogWriter`] status stream.
//! - Inject faults (heap pressure, allocation failure, low stack) while it runs.
//! - Treat [`RuntimeError::DeviceRestart`] as a reboot and boot again.
//!
//! ## Flow
//! ```text
//! boot1: heap shrinks to 12 KiB, allocations fail
//!        └─► consumer dies, supervisor recreates it 3 times ─► MemoryExhausted ─► reboot
//! boot2: producer stack runs low, heap drains below 8 KiB
//!        └─► CriticalHeapFloor ─► reboot
//! boot3: healthy; shutdown requested after 8 s ─► graceful stop
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example device
//! ```

use std::sync::Arc;
use std::time::Duration;

use rtvisor::{Config, LogWriter, Runtime, SimHost, Subscribe, TaskKind};
use tokio_util::sync::CancellationToken;

const MAX_BOOTS: u32 = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let host = Arc::new(SimHost::new());

    for boot in 1..=MAX_BOOTS {
        let mut cfg = Config::default();
        cfg.handle_os_signals = boot == MAX_BOOTS;
        cfg.logger_period = Duration::from_secs(3);

        let subs: Vec<Arc<dyn Subscribe>> =
            vec![Arc::new(LogWriter::with_prefix(format!("boot{boot}")))];
        let runtime = Runtime::builder(cfg)
            .with_host(host.clone())
            .with_subscribers(subs)
            .build()?;

        let injector = tokio::spawn(inject_faults(
            boot,
            Arc::clone(&host),
            runtime.shutdown_token(),
        ));
        let outcome = runtime.run().await;
        injector.abort();

        match outcome {
            Ok(()) => {
                println!("== boot{boot}: shut down cleanly ==");
                return Ok(());
            }
            Err(e) => match e.restart_reason() {
                Some(reason) => {
                    println!("== boot{boot}: device restart ({reason}), rebooting ==");
                    host.set_stack_headroom(TaskKind::Producer, None);
                    host.reboot(SimHost::DEFAULT_FREE_HEAP);
                }
                None => return Err(e.into()),
            },
        }
    }

    println!("== giving up after {MAX_BOOTS} boots ==");
    Ok(())
}

async fn inject_faults(boot: u32, host: Arc<SimHost>, shutdown: CancellationToken) {
    match boot {
        1 => {
            tokio::time::sleep(Duration::from_secs(4)).await;
            host.set_free_heap(12 * 1024);
            host.fail_alloc(true);
        }
        2 => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            host.set_stack_headroom(TaskKind::Producer, Some(64));
            for kib in [48usize, 32, 20, 12, 6] {
                tokio::time::sleep(Duration::from_secs(1)).await;
                host.set_free_heap(kib * 1024);
            }
        }
        _ => {
            tokio::time::sleep(Duration::from_secs(8)).await;
            shutdown.cancel();
        }
    }
}
