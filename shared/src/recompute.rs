//! Debounced recomputation.
//!
//! Interactive edits arrive in bursts. Both schedulers here coalesce a burst into a
//! single recompute once input has been quiet for a while, and always recompute with
//! the most recently submitted input: an older input never overwrites a newer one.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender};

/// Quiet period used by the calculator front ends
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(150);

/// Clock-driven debounce for single-threaded event loops.
///
/// The caller supplies `now` on every call, so the schedule is fully deterministic.
#[derive(Debug, Clone)]
pub struct PendingRecompute<T> {
    quiet: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> PendingRecompute<T> {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: None,
        }
    }

    /// Schedule `value`, replacing anything still pending and restarting the quiet period.
    pub fn submit(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now + self.quiet));
    }

    /// Take the pending value if its quiet period has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((_, due)) if *due <= now => self.pending.take().map(|(value, _)| value),
            _ => None,
        }
    }

    /// When the pending value becomes due, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, due)| *due)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Background debouncer.
///
/// Values submitted from any thread are delivered to `on_settled` on a worker thread
/// once no new value has arrived for the quiet period. Dropping the debouncer flushes
/// the last pending value and joins the worker.
pub struct Debouncer<T: Send + 'static> {
    tx: Option<Sender<T>>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn spawn<F>(quiet: Duration, mut on_settled: F) -> std::io::Result<Self>
    where
        F: FnMut(T) + Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::unbounded::<T>();

        let worker = thread::Builder::new()
            .name("recompute".to_string())
            .spawn(move || {
                let mut pending: Option<T> = None;
                loop {
                    let next = if pending.is_some() {
                        rx.recv_timeout(quiet)
                    } else {
                        rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
                    };

                    match next {
                        Ok(value) => pending = Some(value),
                        Err(RecvTimeoutError::Timeout) => {
                            if let Some(value) = pending.take() {
                                on_settled(value);
                            }
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            if let Some(value) = pending.take() {
                                on_settled(value);
                            }
                            break;
                        }
                    }
                }
                log::trace!("Recompute worker stopped");
            })?;

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    /// Submit a new input. Returns false if the worker has gone away.
    pub fn submit(&self, value: T) -> bool {
        self.tx
            .as_ref()
            .map(|tx| tx.send(value).is_ok())
            .unwrap_or(false)
    }
}

impl<T: Send + 'static> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Recompute worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_waits_for_quiet_period() {
        let start = Instant::now();
        let mut pending = PendingRecompute::new(Duration::from_millis(150));

        pending.submit(1, start);
        assert_eq!(pending.poll(start + Duration::from_millis(100)), None);
        assert_eq!(pending.poll(start + Duration::from_millis(150)), Some(1));
        assert!(!pending.is_pending());
        assert_eq!(pending.poll(start + Duration::from_millis(500)), None);
    }

    #[test]
    fn test_pending_last_write_wins() {
        let start = Instant::now();
        let mut pending = PendingRecompute::new(Duration::from_millis(150));

        pending.submit("a", start);
        pending.submit("b", start + Duration::from_millis(100));
        // First deadline has passed but the second submit restarted the timer
        assert_eq!(pending.poll(start + Duration::from_millis(160)), None);
        assert_eq!(
            pending.deadline(),
            Some(start + Duration::from_millis(250))
        );
        assert_eq!(pending.poll(start + Duration::from_millis(250)), Some("b"));
    }

    #[test]
    fn test_debouncer_coalesces_burst() {
        let (out_tx, out_rx) = crossbeam_channel::unbounded();
        let debouncer = Debouncer::spawn(Duration::from_millis(50), move |v: u32| {
            let _ = out_tx.send(v);
        })
        .unwrap();

        for v in 1..=3 {
            assert!(debouncer.submit(v));
        }

        assert_eq!(out_rx.recv_timeout(Duration::from_secs(2)), Ok(3));
        assert!(out_rx.recv_timeout(Duration::from_millis(200)).is_err());

        debouncer.submit(4);
        assert_eq!(out_rx.recv_timeout(Duration::from_secs(2)), Ok(4));
    }

    #[test]
    fn test_debouncer_flushes_on_drop() {
        let (out_tx, out_rx) = crossbeam_channel::unbounded();
        let debouncer = Debouncer::spawn(Duration::from_secs(30), move |v: u32| {
            let _ = out_tx.send(v);
        })
        .unwrap();

        debouncer.submit(7);
        drop(debouncer);

        assert_eq!(out_rx.try_recv(), Ok(7));
    }
}
