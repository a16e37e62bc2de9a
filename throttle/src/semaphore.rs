use std::sync::atomic::{AtomicBool, Ordering};

/// Token bucket that is a no-op until [`Semaphore::setup`] is called with a non-zero value.
pub struct Semaphore {
    flag: AtomicBool,
    sem: tokio::sync::Semaphore,
}

impl Semaphore {
    pub const fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
            sem: tokio::sync::Semaphore::const_new(0),
        }
    }

    pub fn setup(&self, value: usize) {
        self.flag.store(value > 0, Ordering::Release);
        if value == 0 {
            return;
        }
        self.sem.forget_permits(self.sem.available_permits());
        self.sem.add_permits(value);
    }

    pub fn enabled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub async fn consume(&self) {
        if !self.enabled() {
            return;
        }
        // the semaphore is never closed
        if let Ok(permit) = self.sem.acquire().await {
            permit.forget();
        }
    }

    pub async fn consume_many(&self, value: u32) {
        if !self.enabled() {
            return;
        }
        if let Ok(permit) = self.sem.acquire_many(value).await {
            permit.forget();
        }
    }

    pub async fn run_replenish_thread(&self, replenish: usize, interval: std::time::Duration) {
        if !self.enabled() {
            return;
        }
        loop {
            tokio::time::sleep(interval).await;
            let curr_permits = self.sem.available_permits();
            if curr_permits >= replenish {
                continue;
            }
            self.sem.add_permits(replenish - curr_permits);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_semaphore_never_blocks() {
        let sem = Semaphore::new();
        for _ in 0..1000 {
            sem.consume().await;
        }
        sem.consume_many(u32::MAX >> 4).await;
        assert!(!sem.enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn tokens_are_replenished() {
        static SEM: Semaphore = Semaphore::new();
        SEM.setup(2);
        SEM.consume().await;
        SEM.consume().await;
        assert_eq!(SEM.sem.available_permits(), 0);
        let replenish =
            tokio::spawn(SEM.run_replenish_thread(2, std::time::Duration::from_millis(100)));
        // blocks until the replenish task adds tokens, paused clock auto-advances
        SEM.consume_many(2).await;
        replenish.abort();
    }
}
