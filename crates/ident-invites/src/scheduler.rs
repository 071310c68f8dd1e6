//! Periodic re-check of pending invites.
//!
//! The timer task only emits ticks on a channel; the consumer task turns each
//! tick into one lookup check per pending invite, submitted to the worker pool.
//! When the pool is full the consumer waits for room, so a large backlog is
//! checked in full on every tick. A tick that arrives while the previous one
//! is still being fanned out is dropped rather than queued.

use std::sync::Arc;
use std::time::Duration;

use ident_common::models::ThreePidInviteReply;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::collaborators::MappingLookup;
use crate::pool::WorkerPool;
use crate::publisher::FederationPublisher;
use crate::store::InviteStore;

/// Delay between `start` and the first tick.
pub const FIRST_TICK_DELAY: Duration = Duration::from_secs(5);

// ─── Reconciler ──────────────────────────────────────────────────────────────

/// Work done on each tick.
pub struct Reconciler {
    store: Arc<InviteStore>,
    lookup: Arc<dyn MappingLookup>,
    publisher: Arc<FederationPublisher>,
    pool: Arc<WorkerPool>,
    recursive: bool,
}

impl Reconciler {
    pub fn new(
        store: Arc<InviteStore>,
        lookup: Arc<dyn MappingLookup>,
        publisher: Arc<FederationPublisher>,
        pool: Arc<WorkerPool>,
        recursive: bool,
    ) -> Self {
        Self { store, lookup, publisher, pool, recursive }
    }

    /// Submit one check per pending invite, waiting for pool capacity as
    /// needed. Returns how many were submitted.
    pub async fn run_tick(self: &Arc<Self>) -> usize {
        if self.store.is_empty().await {
            debug!("No pending invites, skipping reconciliation");
            return 0;
        }

        let snapshot = self.store.snapshot().await;
        let total = snapshot.len();
        info!(count = total, "Checking pending invites for new mappings");

        let mut submitted = 0;
        for reply in snapshot {
            let this = Arc::clone(self);
            if let Err(e) = self.pool.spawn(async move { this.check(reply).await }).await {
                warn!(submitted, total, error = %e, "Stopping reconciliation tick");
                break;
            }
            submitted += 1;
        }
        submitted
    }

    async fn check(&self, reply: Arc<ThreePidInviteReply>) {
        let invite = &reply.invite;
        debug!(invite = %invite.log_id(), "Looking up mapping for pending invite");
        match self.lookup.find(&invite.medium, &invite.address, self.recursive).await {
            Ok(Some(mapping)) => {
                info!(invite = %invite.log_id(), mxid = %mapping.mxid, "Found mapping for pending invite");
                let outcome = self.publisher.deliver(&reply, &mapping.mxid).await;
                debug!(id = %reply.id, ?outcome, "Pending invite check done");
            }
            Ok(None) => debug!(invite = %invite.log_id(), "No mapping for pending invite yet"),
            Err(e) => error!(invite = %invite.log_id(), error = %e, "Mapping lookup failed"),
        }
    }
}

// ─── Scheduler ───────────────────────────────────────────────────────────────

struct Tick;

enum State {
    Stopped,
    Running {
        cancel: CancellationToken,
        timer: JoinHandle<()>,
        consumer: JoinHandle<()>,
    },
}

/// Owns the timer and tick consumer tasks. `Stopped → Running → Stopped`.
pub struct ReconciliationScheduler {
    state: Mutex<State>,
}

impl Default for ReconciliationScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconciliationScheduler {
    pub fn new() -> Self {
        Self { state: Mutex::new(State::Stopped) }
    }

    /// Start ticking: first after [`FIRST_TICK_DELAY`], then every `period`.
    /// Calling it while running is a no-op.
    pub async fn start(&self, period: Duration, reconciler: Arc<Reconciler>) {
        let mut state = self.state.lock().await;
        if matches!(*state, State::Running { .. }) {
            warn!("Reconciliation scheduler already running");
            return;
        }

        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel::<Tick>(1);

        let timer_cancel = cancel.clone();
        let timer = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + FIRST_TICK_DELAY, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = timer_cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if tx.try_send(Tick).is_err() {
                            debug!("Previous reconciliation tick still running, dropping tick");
                        }
                    }
                }
            }
        });

        let consumer_cancel = cancel.clone();
        let consumer = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = consumer_cancel.cancelled() => break,
                    tick = rx.recv() => match tick {
                        Some(Tick) => tokio::select! {
                            _ = consumer_cancel.cancelled() => break,
                            _ = reconciler.run_tick() => {}
                        },
                        None => break,
                    },
                }
            }
        });

        info!(period_secs = period.as_secs(), "Reconciliation scheduler started");
        *state = State::Running { cancel, timer, consumer };
    }

    /// Cancel the timer and wait for the tick tasks to exit.
    ///
    /// Checks already handed to the worker pool are drained by the pool owner.
    pub async fn stop(&self) {
        let previous = std::mem::replace(&mut *self.state.lock().await, State::Stopped);
        if let State::Running { cancel, timer, consumer } = previous {
            cancel.cancel();
            for (name, handle) in [("timer", timer), ("consumer", consumer)] {
                if let Err(e) = handle.await {
                    error!(task = name, error = %e, "Scheduler task ended abnormally");
                }
            }
            info!("Reconciliation scheduler stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.state.lock().await, State::Running { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{DeliveryTracker, RetryPolicy};
    use crate::testing::{Answer, FakeLookup, FakeTransport, MemoryStorage, invite, resolver, signer};
    use std::sync::atomic::Ordering;

    struct Fixture {
        reconciler: Arc<Reconciler>,
        store: Arc<InviteStore>,
        lookup: Arc<FakeLookup>,
        transport: Arc<FakeTransport>,
        pool: Arc<WorkerPool>,
    }

    async fn fixture(workers: usize, queue: usize, addresses: &[&str]) -> Fixture {
        let store = Arc::new(InviteStore::new(Arc::new(MemoryStorage::default())));
        for addr in addresses {
            store
                .insert(ThreePidInviteReply::create(invite("@a:hs.tld", "email", addr, "!r:hs.tld")))
                .await
                .unwrap();
        }
        let lookup = Arc::new(FakeLookup::default());
        let transport = FakeTransport::answering(Answer::Status(200));
        let pool = Arc::new(WorkerPool::new("test", workers, queue));
        let publisher = Arc::new(FederationPublisher::new(
            resolver(&[]),
            signer(),
            transport.clone(),
            store.clone(),
            pool.clone(),
            DeliveryTracker::new(RetryPolicy::Immediate),
        ));
        let reconciler = Arc::new(Reconciler::new(store.clone(), lookup.clone(), publisher, pool.clone(), true));
        Fixture { reconciler, store, lookup, transport, pool }
    }

    #[tokio::test]
    async fn tick_checks_every_invite_and_publishes_bound_ones() {
        let f = fixture(4, 16, &["a@x.y", "b@x.y", "c@x.y"]).await;
        f.lookup.bind("email", "B@X.Y", "@b:example.org");

        assert_eq!(f.reconciler.run_tick().await, 3);
        assert!(f.pool.shutdown(Duration::from_secs(5)).await);

        assert_eq!(f.lookup.calls.load(Ordering::SeqCst), 3);
        assert_eq!(f.transport.count(), 1);
        assert_eq!(f.store.len().await, 2);
    }

    #[tokio::test]
    async fn lookup_failure_does_not_affect_other_checks() {
        let f = fixture(2, 8, &["a@x.y", "b@x.y"]).await;
        f.lookup.failing.store(true, Ordering::SeqCst);

        assert_eq!(f.reconciler.run_tick().await, 2);
        assert!(f.pool.shutdown(Duration::from_secs(5)).await);
        assert_eq!(f.lookup.calls.load(Ordering::SeqCst), 2);
        assert_eq!(f.store.len().await, 2);
    }

    #[tokio::test]
    async fn empty_store_skips_tick() {
        let f = fixture(1, 1, &[]).await;
        assert_eq!(f.reconciler.run_tick().await, 0);
        assert_eq!(f.lookup.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn saturated_pool_still_checks_every_invite() {
        let addresses: Vec<String> = (0..8).map(|i| format!("user{i}@x.y")).collect();
        let refs: Vec<&str> = addresses.iter().map(String::as_str).collect();
        let f = fixture(1, 1, &refs).await;
        *f.lookup.delay.lock().unwrap() = Some(Duration::from_secs(1));

        assert_eq!(f.reconciler.run_tick().await, 8);
        assert!(f.pool.shutdown(Duration::from_secs(30)).await);
        assert_eq!(f.lookup.calls.load(Ordering::SeqCst), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_mid_tick_abandons_waiting_submissions() {
        let addresses: Vec<String> = (0..8).map(|i| format!("user{i}@x.y")).collect();
        let refs: Vec<&str> = addresses.iter().map(String::as_str).collect();
        let f = fixture(1, 1, &refs).await;
        *f.lookup.delay.lock().unwrap() = Some(Duration::from_secs(3600));

        let scheduler = ReconciliationScheduler::new();
        scheduler.start(Duration::from_secs(60), f.reconciler.clone()).await;
        tokio::time::sleep(FIRST_TICK_DELAY + Duration::from_secs(1)).await;
        assert_eq!(f.pool.pending(), 2);

        tokio::time::timeout(Duration::from_secs(1), scheduler.stop()).await.unwrap();
        assert!(!scheduler.is_running().await);
        assert_eq!(f.pool.pending(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_after_delay_then_every_period() {
        let f = fixture(4, 16, &["a@x.y"]).await;
        let scheduler = ReconciliationScheduler::new();
        scheduler.start(Duration::from_secs(60), f.reconciler.clone()).await;
        assert!(scheduler.is_running().await);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(f.lookup.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(f.lookup.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(f.lookup.calls.load(Ordering::SeqCst), 2);

        scheduler.stop().await;
        assert!(!scheduler.is_running().await);
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(f.lookup.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stop_without_start_is_a_no_op() {
        let scheduler = ReconciliationScheduler::new();
        scheduler.stop().await;
        assert!(!scheduler.is_running().await);
    }
}
