//! Thread-per-node scheduler
//!
//! Spawns a dedicated thread for each node and calls `work()` in a loop until
//! the node reports `Shutdown`, asks to stop, or the shared stop signal is set.
//! The stop signal is checked between `work()` calls only, so a node is never
//! interrupted halfway through producing an item.

use super::node::{ProcessNode, WorkError};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver as StdReceiver, Sender as StdSender, channel};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

/// Runtime scheduler that executes process nodes
pub struct Scheduler {
    threads: Vec<(String, JoinHandle<()>)>,
    stop_signal: Arc<AtomicBool>,
    completion_tx: StdSender<String>,
    completion_rx: StdReceiver<String>,
}

impl Scheduler {
    /// Create a new scheduler
    pub fn new() -> Self {
        let (completion_tx, completion_rx) = channel();
        Self {
            threads: Vec::new(),
            stop_signal: Arc::new(AtomicBool::new(false)),
            completion_tx,
            completion_rx,
        }
    }

    /// Shared stop flag, for requesting cancellation from another thread
    pub fn stop_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_signal)
    }

    /// Start a process node in its own thread
    pub fn start_process(&mut self, mut node: Box<dyn ProcessNode>) {
        let stop_signal = Arc::clone(&self.stop_signal);
        let completion_tx = self.completion_tx.clone();
        let name = node.name().to_string();
        let thread_name = name.clone();

        debug!("Starting process node: {}", name);

        let handle = thread::spawn(move || {
            let mut items_produced = 0usize;

            loop {
                if stop_signal.load(Ordering::Relaxed) || node.should_stop() {
                    break;
                }

                match node.work() {
                    Ok(n) => {
                        items_produced += n;
                    }
                    Err(WorkError::Shutdown) => {
                        debug!("[{}] Input exhausted", thread_name);
                        break;
                    }
                    Err(e) => {
                        error!("[{}] Work error: {}", thread_name, e);
                        break;
                    }
                }
            }

            info!(
                "[{}] Shutdown. Produced {} items.",
                thread_name, items_produced
            );

            // Dropping the node closes its channels
            drop(node);

            let _ = completion_tx.send(thread_name);
        });

        self.threads.push((name, handle));
    }

    /// Signal all nodes to stop
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::Relaxed);
    }

    /// Wait for all node threads to complete
    pub fn wait(self) {
        let Scheduler {
            threads,
            completion_tx,
            completion_rx,
            ..
        } = self;

        // Channel closes once every node thread has dropped its sender
        drop(completion_tx);

        let total_threads = threads.len();
        let mut completed = 0;

        info!("Waiting for {} threads to complete...", total_threads);

        let mut threads_by_name: HashMap<String, JoinHandle<()>> = threads.into_iter().collect();

        while completed < total_threads {
            match completion_rx.recv() {
                Ok(thread_name) => {
                    completed += 1;
                    if let Some(handle) = threads_by_name.remove(&thread_name) {
                        match handle.join() {
                            Ok(_) => info!(
                                "[{}] Thread completed ({}/{})",
                                thread_name, completed, total_threads
                            ),
                            Err(e) => error!(
                                "[{}] Thread panicked ({}/{}): {:?}",
                                thread_name, completed, total_threads, e
                            ),
                        }
                    }
                }
                Err(_) => break,
            }
        }

        // Threads that panicked never reported completion
        for (thread_name, handle) in threads_by_name {
            if handle.join().is_err() {
                error!("[{}] Thread panicked", thread_name);
            }
        }

        info!("All {} threads completed", total_threads);
    }

    /// Get the number of started threads
    pub fn num_threads(&self) -> usize {
        self.threads.len()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::node::WorkResult;
    use crate::runtime::receiver::Receiver;
    use crate::runtime::sender::{ChannelMessage, Sender};
    use crossbeam_channel::bounded;
    use std::sync::Mutex;
    use std::time::Duration;

    struct TestSource {
        output: Sender<u32>,
        count: usize,
        max: usize,
    }

    impl ProcessNode for TestSource {
        fn name(&self) -> &str {
            "test_source"
        }

        fn work(&mut self) -> WorkResult<usize> {
            if self.count < self.max {
                self.output.send(self.count as u32)?;
                self.count += 1;
                Ok(1)
            } else {
                self.output.close();
                Err(WorkError::Shutdown)
            }
        }
    }

    struct TestSink {
        input: Receiver<u32>,
        received: Arc<Mutex<Vec<u32>>>,
    }

    impl ProcessNode for TestSink {
        fn name(&self) -> &str {
            "test_sink"
        }

        fn work(&mut self) -> WorkResult<usize> {
            let value = self.input.recv()?;
            self.received.lock().unwrap().push(value);
            Ok(1)
        }
    }

    #[test]
    fn test_scheduler_basic() {
        let mut scheduler = Scheduler::new();
        let (tx, rx) = bounded::<ChannelMessage<u32>>(10);
        let received = Arc::new(Mutex::new(Vec::new()));

        scheduler.start_process(Box::new(TestSource {
            output: Sender::new(vec![tx]),
            count: 0,
            max: 5,
        }));
        scheduler.start_process(Box::new(TestSink {
            input: Receiver::new(rx),
            received: Arc::clone(&received),
        }));
        assert_eq!(scheduler.num_threads(), 2);

        scheduler.wait();

        assert_eq!(*received.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    struct Spinner {
        calls: Arc<Mutex<usize>>,
    }

    impl ProcessNode for Spinner {
        fn name(&self) -> &str {
            "spinner"
        }

        fn work(&mut self) -> WorkResult<usize> {
            *self.calls.lock().unwrap() += 1;
            thread::sleep(Duration::from_millis(1));
            Ok(0)
        }
    }

    #[test]
    fn test_scheduler_stop_signal() {
        let mut scheduler = Scheduler::new();
        let calls = Arc::new(Mutex::new(0));
        scheduler.start_process(Box::new(Spinner {
            calls: Arc::clone(&calls),
        }));

        thread::sleep(Duration::from_millis(20));
        scheduler.stop_signal().store(true, Ordering::Relaxed);

        let start = std::time::Instant::now();
        scheduler.wait();
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(*calls.lock().unwrap() > 0);
    }
}
