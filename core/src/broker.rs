//! Credential broker
//!
//! A [`TokenBroker`] holds exactly one *current delivery*: either pending
//! (waiters queued, no value yet) or resolved (a value is available).
//!
//! The first [`TokenBroker::set`] resolves the pending delivery and every
//! waiter queued before it receives that first value, even when another
//! `set` follows before the waiter is polled. Any later `set` replaces the
//! resolved value for future readers only; values already handed out are
//! never changed retroactively. This first-write-wins-then-overwrite
//! asymmetry is a preserved contract: rotation must work both before and
//! after the initial consumption.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::BrokerError;

/// Opaque bearer token. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl From<&str> for Credential {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<String> for Credential {
    fn from(token: String) -> Self {
        Self::new(token)
    }
}

enum Delivery {
    Pending(Vec<oneshot::Sender<Credential>>),
    Resolved(Credential),
}

/// Resettable single-slot credential holder with bounded waits.
pub struct TokenBroker {
    delivery: Mutex<Delivery>,
}

impl TokenBroker {
    pub fn new() -> Self {
        Self {
            delivery: Mutex::new(Delivery::Pending(Vec::new())),
        }
    }

    // The guard is never held across an await point.
    fn lock(&self) -> MutexGuard<'_, Delivery> {
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_resolved(&self) -> bool {
        matches!(*self.lock(), Delivery::Resolved(_))
    }

    /// Current value without waiting
    pub fn current(&self) -> Option<Credential> {
        match &*self.lock() {
            Delivery::Resolved(credential) => Some(credential.clone()),
            Delivery::Pending(_) => None,
        }
    }

    /// Resolve the pending delivery, or replace the resolved value.
    pub fn set(&self, value: impl Into<Credential>) {
        let value = value.into();
        let previous = {
            let mut delivery = self.lock();
            std::mem::replace(&mut *delivery, Delivery::Resolved(value.clone()))
        };

        match previous {
            Delivery::Pending(waiters) => {
                let woken = waiters
                    .into_iter()
                    .filter_map(|waiter| waiter.send(value.clone()).ok())
                    .count();
                tracing::debug!("Credential delivered to {} pending waiter(s)", woken);
            }
            Delivery::Resolved(_) => {
                tracing::debug!("Credential replaced");
            }
        }
    }

    /// Wait for the current or next-resolved value.
    ///
    /// `None` or a zero timeout waits indefinitely. A timed-out wait leaves
    /// the pending delivery in place for every other waiter.
    pub async fn wait(&self, timeout: Option<Duration>) -> Result<Credential, BrokerError> {
        let receiver = {
            let mut delivery = self.lock();
            match &mut *delivery {
                Delivery::Resolved(credential) => return Ok(credential.clone()),
                Delivery::Pending(waiters) => {
                    // Drop slots left behind by waiters that timed out.
                    waiters.retain(|waiter| !waiter.is_closed());
                    let (sender, receiver) = oneshot::channel();
                    waiters.push(sender);
                    receiver
                }
            }
        };

        let delivered = async { receiver.await.map_err(|_| BrokerError::Closed) };
        match timeout.filter(|limit| !limit.is_zero()) {
            None => delivered.await,
            Some(limit) => tokio::time::timeout(limit, delivered)
                .await
                .map_err(|_| BrokerError::Timeout(limit))?,
        }
    }

    #[cfg(test)]
    fn pending_waiters(&self) -> usize {
        match &*self.lock() {
            Delivery::Pending(waiters) => waiters.iter().filter(|w| !w.is_closed()).count(),
            Delivery::Resolved(_) => 0,
        }
    }
}

impl Default for TokenBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TokenBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBroker")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::Instant;

    async fn until_waiting(broker: &TokenBroker, count: usize) {
        while broker.pending_waiters() < count {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_wait_after_set_returns_value() {
        let broker = TokenBroker::new();
        broker.set("tok123");
        let value = broker.wait(Some(Duration::from_millis(10))).await.unwrap();
        assert_eq!(value.expose(), "tok123");
    }

    #[tokio::test]
    async fn test_later_set_replaces_for_new_readers() {
        let broker = TokenBroker::new();
        broker.set("first");
        let early = broker.wait(None).await.unwrap();
        broker.set("second");
        broker.set("third");

        assert_eq!(early.expose(), "first");
        assert_eq!(broker.wait(None).await.unwrap().expose(), "third");
        assert_eq!(broker.current().unwrap().expose(), "third");
    }

    #[tokio::test]
    async fn test_early_waiters_observe_first_set() {
        let broker = Arc::new(TokenBroker::new());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let broker = Arc::clone(&broker);
                tokio::spawn(async move { broker.wait(None).await })
            })
            .collect();
        until_waiting(&broker, 3).await;

        broker.set("first");
        broker.set("second");

        for waiter in waiters {
            assert_eq!(waiter.await.unwrap().unwrap().expose(), "first");
        }
        assert_eq!(broker.wait(None).await.unwrap().expose(), "second");
    }

    #[tokio::test]
    async fn test_repeated_set_before_any_wait_keeps_last() {
        let broker = TokenBroker::new();
        broker.set("a");
        broker.set("b");

        assert_eq!(broker.wait(None).await.unwrap().expose(), "b");
        assert_eq!(broker.wait(Some(Duration::from_millis(10))).await.unwrap().expose(), "b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_wait_times_out_without_cancelling_delivery() {
        let broker = Arc::new(TokenBroker::new());
        let unbounded = {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move { broker.wait(None).await })
        };
        until_waiting(&broker, 1).await;

        let started = Instant::now();
        let err = broker.wait(Some(Duration::from_millis(3000))).await.unwrap_err();
        assert_eq!(err, BrokerError::Timeout(Duration::from_millis(3000)));
        assert!(started.elapsed() >= Duration::from_millis(3000));
        assert!(!broker.is_resolved());

        broker.set("late");
        assert_eq!(unbounded.await.unwrap().unwrap().expose(), "late");
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_waits_indefinitely() {
        let broker = Arc::new(TokenBroker::new());
        let waiter = {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move { broker.wait(Some(Duration::ZERO)).await })
        };
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(!waiter.is_finished());

        broker.set("eventually");
        assert_eq!(waiter.await.unwrap().unwrap().expose(), "eventually");
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential::new("super-secret");
        assert_eq!(format!("{:?}", credential), "Credential(***)");
    }
}
