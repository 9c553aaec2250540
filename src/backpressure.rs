use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Demand value meaning "emit without limit"
pub const UNBOUNDED: u64 = u64::MAX;

#[derive(Debug)]
struct DemandSlot {
    outstanding: u64,
    cancelled: bool,
}

/// Outstanding demand between one producer and one consumer
///
/// The consumer calls [`request`](Self::request) to authorize more items,
/// the producer calls [`acquire`](Self::acquire) before each emission.
/// Cloning yields another handle to the same counter.
#[derive(Debug, Clone)]
pub struct DemandCounter {
    shared: Arc<(Mutex<DemandSlot>, Condvar)>,
}

impl DemandCounter {
    /// Create a counter with no outstanding demand
    pub fn new() -> Self {
        Self {
            shared: Arc::new((
                Mutex::new(DemandSlot {
                    outstanding: 0,
                    cancelled: false,
                }),
                Condvar::new(),
            )),
        }
    }

    /// Authorize `n` more items. Saturates at [`UNBOUNDED`].
    pub fn request(&self, n: u64) {
        if n == 0 {
            return;
        }
        let (lock, cond) = &*self.shared;
        let mut slot = lock.lock();
        slot.outstanding = slot.outstanding.saturating_add(n);
        let outstanding = slot.outstanding;
        drop(slot);
        cond.notify_all();
        tracing::debug!(n, outstanding, "demand requested");
    }

    /// Items authorized but not yet taken
    pub fn outstanding(&self) -> u64 {
        self.shared.0.lock().outstanding
    }

    /// Check if demand is unbounded
    pub fn is_unbounded(&self) -> bool {
        self.outstanding() == UNBOUNDED
    }

    /// Take one unit of demand without waiting
    pub fn try_acquire(&self) -> bool {
        let mut slot = self.shared.0.lock();
        take_one(&mut slot)
    }

    /// Take one unit of demand, suspending while none is outstanding.
    /// Returns false once the counter is cancelled.
    pub fn acquire(&self) -> bool {
        let (lock, cond) = &*self.shared;
        let mut slot = lock.lock();
        loop {
            if slot.cancelled {
                return false;
            }
            if take_one(&mut slot) {
                return true;
            }
            tracing::trace!("waiting for demand");
            cond.wait(&mut slot);
        }
    }

    /// Like [`acquire`](Self::acquire) but gives up after `timeout`
    pub fn acquire_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let (lock, cond) = &*self.shared;
        let mut slot = lock.lock();
        loop {
            if slot.cancelled {
                return false;
            }
            if take_one(&mut slot) {
                return true;
            }
            if cond.wait_until(&mut slot, deadline).timed_out() {
                return !slot.cancelled && take_one(&mut slot);
            }
        }
    }

    /// Wake every waiter and refuse all further acquisitions
    pub fn cancel(&self) {
        let (lock, cond) = &*self.shared;
        lock.lock().cancelled = true;
        cond.notify_all();
    }

    /// Check if the counter was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.shared.0.lock().cancelled
    }
}

fn take_one(slot: &mut DemandSlot) -> bool {
    match slot.outstanding {
        0 => false,
        UNBOUNDED => true,
        _ => {
            slot.outstanding -= 1;
            true
        }
    }
}

impl Default for DemandCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_request_and_acquire() {
        let demand = DemandCounter::new();
        assert!(!demand.try_acquire());

        demand.request(2);
        assert_eq!(demand.outstanding(), 2);
        assert!(demand.try_acquire());
        assert!(demand.try_acquire());
        assert!(!demand.try_acquire());
        assert_eq!(demand.outstanding(), 0);
    }

    #[test]
    fn test_request_saturates() {
        let demand = DemandCounter::new();
        demand.request(UNBOUNDED - 1);
        demand.request(10);
        assert!(demand.is_unbounded());

        // Unbounded demand is never consumed
        assert!(demand.try_acquire());
        assert!(demand.is_unbounded());
    }

    #[test]
    fn test_zero_request_is_ignored() {
        let demand = DemandCounter::new();
        demand.request(0);
        assert_eq!(demand.outstanding(), 0);
    }

    #[test]
    fn test_acquire_waits_for_request() {
        let demand = DemandCounter::new();
        let producer_side = demand.clone();
        let waiter = thread::spawn(move || producer_side.acquire());

        thread::sleep(Duration::from_millis(20));
        demand.request(1);

        assert!(waiter.join().unwrap());
        assert_eq!(demand.outstanding(), 0);
    }

    #[test]
    fn test_cancel_releases_waiter() {
        let demand = DemandCounter::new();
        let producer_side = demand.clone();
        let waiter = thread::spawn(move || producer_side.acquire());

        thread::sleep(Duration::from_millis(20));
        demand.cancel();

        assert!(!waiter.join().unwrap());
        assert!(demand.is_cancelled());
    }

    #[test]
    fn test_acquire_timeout() {
        let demand = DemandCounter::new();
        assert!(!demand.acquire_timeout(Duration::from_millis(10)));
        demand.request(1);
        assert!(demand.acquire_timeout(Duration::from_millis(10)));
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_request_is_logged() {
        let captured = CapturedLogs::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let demand = DemandCounter::new();
        tracing::subscriber::with_default(subscriber, || {
            demand.request(3);
            demand.request(0);
            demand.request(2);
        });

        let logs = String::from_utf8(captured.0.lock().clone()).unwrap();
        assert_eq!(logs.matches("demand requested").count(), 2);
        assert!(logs.contains("n=3 outstanding=3"));
        assert!(logs.contains("n=2 outstanding=5"));
    }
}
