use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug)]
struct Shared {
    sem: Arc<tokio::sync::Semaphore>,
    capacity: usize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// Caps the number of operations running at the same time.
///
/// Admission is FIFO (see [`tokio::sync::Semaphore`]) so a waiting task is admitted as soon as all
/// tasks queued before it got a slot and one more slot is released. The limiter is cheap to clone,
/// all clones share the same slots.
#[derive(Debug, Clone)]
pub struct Limiter {
    shared: Arc<Shared>,
}

/// Slot held by an admitted operation, released on drop.
#[derive(Debug)]
pub struct LimiterGuard {
    shared: Arc<Shared>,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl Limiter {
    /// Create a limiter admitting at most `capacity` concurrent holders.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero, such limiter would never admit anything.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "limiter capacity must be at least 1");
        Self {
            shared: Arc::new(Shared {
                sem: Arc::new(tokio::sync::Semaphore::new(capacity)),
                capacity,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
        }
    }

    pub async fn acquire(&self) -> LimiterGuard {
        let permit = self
            .shared
            .sem
            .clone()
            .acquire_owned()
            .await
            .expect("limiter semaphore is never closed");
        let current = self.shared.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.shared.peak.fetch_max(current, Ordering::AcqRel);
        tracing::trace!("limiter slot acquired, in flight: {}", current);
        LimiterGuard {
            shared: self.shared.clone(),
            _permit: permit,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Number of slots currently held.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Highest number of slots ever held at the same time.
    #[must_use]
    pub fn peak(&self) -> usize {
        self.shared.peak.load(Ordering::Acquire)
    }
}

impl Drop for LimiterGuard {
    fn drop(&mut self) {
        // decrement before the permit is released so in_flight never exceeds capacity
        self.shared.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
