//! Single-threaded script runtime.
//!
//! Script code never runs on host threads. It runs on one dedicated OS thread
//! with a current-thread tokio runtime inside a `LocalSet`, so nothing it
//! spawns is ever moved to another thread. Host threads reach it only through
//! the relay and through [`ScriptRuntime::submit`].

use anyhow::{anyhow, Context, Result};
use bridge_core::{EventRelay, RelayInbox};
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Work queued onto the script thread.
pub type ScriptTask = Box<dyn FnOnce(&EventRelay) + Send + 'static>;

enum Command {
    Run(ScriptTask),
    Shutdown,
}

/// Handle to the script thread.
pub struct ScriptRuntime {
    name: String,
    cmd_tx: mpsc::UnboundedSender<Command>,
    thread: Option<JoinHandle<()>>,
}

impl ScriptRuntime {
    /// Start the script thread.
    ///
    /// `init` runs on the new thread before any relay event is delivered, so
    /// listeners it attaches see every event. Returns once `init` finished.
    pub fn spawn<F>(name: &str, inbox: RelayInbox, init: F) -> Result<Self>
    where
        F: FnOnce(&EventRelay) + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel::<Result<(), String>>(1);

        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("failed to build runtime: {e}")));
                        return;
                    }
                };

                // All script work stays on this thread.
                let local = tokio::task::LocalSet::new();
                local.block_on(&rt, async move {
                    let mut relay = inbox.into_relay();

                    if panic::catch_unwind(AssertUnwindSafe(|| init(&relay))).is_err() {
                        let _ = ready_tx.send(Err("script init panicked".to_string()));
                        return;
                    }
                    let _ = ready_tx.send(Ok(()));

                    run_loop(&mut relay, cmd_rx).await;
                });
            })
            .context("Failed to spawn script thread")?;

        ready_rx
            .recv()
            .map_err(|_| anyhow!("Script thread exited during startup"))?
            .map_err(|e| anyhow!("Script runtime failed to start: {}", e))?;

        info!("Script runtime '{}' started", name);
        Ok(Self {
            name: name.to_string(),
            cmd_tx,
            thread: Some(thread),
        })
    }

    /// Queue `task` to run on the script thread. Returns `false` if the
    /// runtime has stopped.
    pub fn submit(&self, task: impl FnOnce(&EventRelay) + Send + 'static) -> bool {
        self.cmd_tx.send(Command::Run(Box::new(task))).is_ok()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the loop and wait for the thread. Safe to call more than once.
    pub fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        let _ = self.cmd_tx.send(Command::Shutdown);
        if thread.join().is_err() {
            error!("Script runtime '{}' thread panicked", self.name);
        }
        info!("Script runtime '{}' stopped", self.name);
    }
}

impl Drop for ScriptRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_loop(relay: &mut EventRelay, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
    let mut relay_open = true;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Run(task)) => run_task(task, relay),
                Some(Command::Shutdown) | None => break,
            },
            open = relay.run_once(), if relay_open => {
                if !open {
                    debug!("Relay closed, script runtime keeps serving tasks");
                    relay_open = false;
                }
            }
        }
    }

    let remaining = relay.drain();
    if remaining > 0 {
        debug!("Delivered {} queued relay events at shutdown", remaining);
    }
}

fn run_task(task: ScriptTask, relay: &EventRelay) {
    if panic::catch_unwind(AssertUnwindSafe(|| task(relay))).is_err() {
        error!("Script task panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::relay;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[test]
    fn test_listeners_run_on_script_thread() {
        let (sender, inbox) = relay::channel();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&seen);
        let mut runtime = ScriptRuntime::spawn("script-test", inbox, move |relay| {
            relay.on_opened(move |event| {
                let thread = thread::current().name().unwrap_or_default().to_string();
                log.lock().unwrap().push((event.object_id, thread));
            });
        })
        .unwrap();

        sender.post_opened(3, 9, "mymod:crate", "Crate");
        sender.post_opened(4, 9, "mymod:crate", "Crate");

        // Delivery is asynchronous; wait for the listener.
        for _ in 0..100 {
            if seen.lock().unwrap().len() == 2 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        runtime.shutdown();

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (3, "script-test".to_string()),
                (4, "script-test".to_string())
            ]
        );
        assert_eq!(sender.ledger().outstanding(), 0);
    }

    #[test]
    fn test_submit_runs_tasks_in_order() {
        let (_sender, inbox) = relay::channel();
        let mut runtime = ScriptRuntime::spawn("script-tasks", inbox, |_| {}).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let order = Arc::clone(&order);
            assert!(runtime.submit(move |_| order.lock().unwrap().push(i)));
        }
        runtime.shutdown();

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert!(!runtime.submit(|_| {}));
    }

    #[test]
    fn test_task_panic_does_not_stop_runtime() {
        let (_sender, inbox) = relay::channel();
        let mut runtime = ScriptRuntime::spawn("script-panic", inbox, |_| {}).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));

        runtime.submit(|_| panic!("script bug"));
        let counter = Arc::clone(&ran);
        runtime.submit(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        runtime.shutdown();

        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_init_panic_fails_spawn() {
        let (_sender, inbox) = relay::channel();
        let result = ScriptRuntime::spawn("script-bad-init", inbox, |_| panic!("bad init"));
        assert!(result.is_err());
    }

    #[test]
    fn test_shutdown_delivers_queued_events() {
        let (sender, inbox) = relay::channel();
        let closed = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&closed);
        let mut runtime = ScriptRuntime::spawn("script-drain", inbox, move |relay| {
            relay.on_closed(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        })
        .unwrap();

        for id in 0..50 {
            sender.post_closed(id);
        }
        runtime.shutdown();
        runtime.shutdown();

        assert_eq!(closed.load(Ordering::SeqCst), 50);
    }
}
