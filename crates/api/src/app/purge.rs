//! Background sweep of consumed sign-in challenges.
//!
//! Replay records only matter until their challenge expires; after that the
//! login path rejects the message on its own, so the record can go.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use lockgate_auth::{ChallengeStore, StoreError};
use lockgate_core::Clock;

/// One sweep over a challenge store, timed by the injected clock.
#[derive(Clone)]
pub struct ChallengePurge {
    store: Arc<dyn ChallengeStore>,
    clock: Arc<dyn Clock>,
}

impl ChallengePurge {
    pub fn new(store: Arc<dyn ChallengeStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn run_once(&self) -> Result<u64, StoreError> {
        let purged = self.store.purge_expired(self.clock.now()).await?;
        if purged > 0 {
            debug!(purged, "purged expired challenge records");
        }
        Ok(purged)
    }

    /// Sweep every `every` until the returned handle is shut down.
    pub fn spawn(self, every: Duration) -> PurgeHandle {
        let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            warn!(error = %e, "challenge purge failed");
                        }
                    }
                }
            }
            info!("challenge purge stopped");
        });
        PurgeHandle { shutdown, join }
    }
}

/// Handle to stop a running purge task.
#[derive(Debug)]
pub struct PurgeHandle {
    shutdown: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

impl PurgeHandle {
    /// Request shutdown and wait for the task to stop.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        let _ = self.join.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use lockgate_auth::ChallengeFingerprint;
    use lockgate_auth::memory::InMemoryChallengeStore;
    use lockgate_core::{Address, ManualClock};

    fn fingerprint(nonce: &str) -> ChallengeFingerprint {
        ChallengeFingerprint::for_challenge(&Address::ZERO, nonce)
    }

    #[tokio::test]
    async fn sweep_drops_only_closed_windows() {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(InMemoryChallengeStore::new());
        let now = clock.now();
        store
            .consume(&fingerprint("shortlived1"), now + ChronoDuration::minutes(5), now)
            .await
            .unwrap();
        store
            .consume(&fingerprint("longlived01"), now + ChronoDuration::hours(1), now)
            .await
            .unwrap();

        let purge = ChallengePurge::new(store.clone(), clock.clone());
        assert_eq!(purge.run_once().await.unwrap(), 0);

        clock.advance(ChronoDuration::minutes(10));
        assert_eq!(purge.run_once().await.unwrap(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn spawned_task_sweeps_until_shut_down() {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(InMemoryChallengeStore::new());
        let now = clock.now();
        store
            .consume(&fingerprint("abcdefgh12"), now + ChronoDuration::minutes(5), now)
            .await
            .unwrap();
        clock.advance(ChronoDuration::minutes(6));

        let handle = ChallengePurge::new(store.clone(), clock).spawn(Duration::from_millis(10));
        for _ in 0..100 {
            if store.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(store.is_empty());
        handle.shutdown().await;
    }
}
