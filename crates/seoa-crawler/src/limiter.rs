use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::time::{sleep, sleep_until, Instant};

use crate::config::Throttle;

const REFILL_PERIOD: Duration = Duration::from_secs(1);

/// Gate every outgoing request goes through.
#[derive(Debug, Clone)]
pub enum Limiter {
    Concurrent(Arc<Semaphore>),
    PerSecond(RateLimiter),
    Delay(DelayLimiter),
}

impl Limiter {
    /// Fails on a delay that isn't a finite, non negative number of seconds.
    pub fn new(throttle: Throttle) -> Result<Self> {
        let limiter = match throttle {
            Throttle::Concurrent(n) => Self::Concurrent(Arc::new(Semaphore::new(n.get()))),
            Throttle::PerSecond(n) => Self::PerSecond(RateLimiter::new(n.get())),
            Throttle::Delay(secs) => {
                let gap = Duration::try_from_secs_f32(secs)
                    .map_err(|e| anyhow!("Invalid throttle delay {secs} got: {e}"))?;
                Self::Delay(DelayLimiter::new(gap))
            }
        };
        Ok(limiter)
    }

    /// Waits until a request may start. The returned guard must be kept
    /// alive for the whole request.
    pub async fn acquire(&self) -> Permit {
        match self {
            Self::Concurrent(permits) => {
                // The semaphore is never closed
                let permit = permits.clone().acquire_owned().await.ok();
                Permit(permit)
            }
            Self::PerSecond(limiter) => {
                limiter.acquire().await;
                Permit(None)
            }
            Self::Delay(limiter) => {
                limiter.acquire().await;
                Permit(None)
            }
        }
    }

    /// Number of requests that could start right now, if bounded.
    pub fn available(&self) -> Option<usize> {
        match self {
            Self::Concurrent(permits) => Some(permits.available_permits()),
            Self::PerSecond(limiter) => Some(limiter.permits.available_permits()),
            Self::Delay(_) => None,
        }
    }
}

#[derive(Debug)]
pub struct Permit(Option<OwnedSemaphorePermit>);

/// Hands out at most `per_second` permits per one second window.
///
/// Consumed permits are forgotten and the pool is topped up lazily once the
/// window has elapsed.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    permits: Arc<Semaphore>,
    per_second: usize,
    last_refill: Arc<Mutex<Instant>>,
}

impl RateLimiter {
    pub fn new(per_second: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(per_second)),
            per_second,
            last_refill: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub async fn acquire(&self) {
        loop {
            let next_refill = self.refill();
            match self.permits.clone().try_acquire_owned() {
                Ok(permit) => {
                    permit.forget();
                    return;
                }
                Err(TryAcquireError::NoPermits) => sleep_until(next_refill).await,
                Err(TryAcquireError::Closed) => return,
            }
        }
    }

    fn refill(&self) -> Instant {
        let mut last = self.last_refill.lock().unwrap_or_else(|e| e.into_inner());
        if last.elapsed() >= REFILL_PERIOD {
            let available = self.permits.available_permits();
            self.permits
                .add_permits(self.per_second.saturating_sub(available));
            *last = Instant::now();
        }
        *last + REFILL_PERIOD
    }
}

/// Enforces a minimum gap between the start of two consecutive requests.
#[derive(Debug, Clone)]
pub struct DelayLimiter {
    gap: Duration,
    next_start: Arc<tokio::sync::Mutex<Option<Instant>>>,
}

impl DelayLimiter {
    pub fn new(gap: Duration) -> Self {
        Self {
            gap,
            next_start: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    pub async fn acquire(&self) {
        let mut next_start = self.next_start.lock().await;
        let now = Instant::now();
        let start = match *next_start {
            Some(at) if at > now => at,
            _ => now,
        };
        *next_start = Some(start + self.gap);
        drop(next_start);

        if start > now {
            sleep(start - now).await;
        }
    }
}
