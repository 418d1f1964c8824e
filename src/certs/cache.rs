//! Per-hostname certificate cache with single-flight provisioning.
//!
//! # State Transitions
//! ```text
//! (absent) ──lookup──▶ Pending ──issued──▶ Ready ──renewal due──▶ Pending
//!                         │                                        │
//!                         └──error/timeout──▶ Failed ◀─────────────┘
//!                                               │
//!                                   negative window elapsed
//!                                               ▼
//!                                            Pending
//! ```
//!
//! # Design Decisions
//! - One record per canonical hostname in a sharded `DashMap`; shard locks are only held
//!   to read or swap a record, never across an await
//! - Provisioning runs in its own task and publishes its outcome on a `watch` channel, so
//!   every waiter sees the same result and a cancelled handshake does not cancel issuance
//! - While a renewal is in flight the previous certificate keeps serving until it expires
//! - Hostnames outside the switchboard are rejected before the authority is called

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::watch;

use crate::certs::authority::{CertificateAuthority, IssuanceError};
use crate::certs::certificate::Certificate;
use crate::certs::store::DiskStore;
use crate::config::TlsConfig;
use crate::observability::metrics;
use crate::routing::{canonicalize, SharedSwitchboard, Switchboard};

/// Error returned to the handshake path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CertificateError {
    #[error("no switchboard entry for {0}")]
    UnknownHost(String),
    #[error(transparent)]
    Issuance(#[from] IssuanceError),
}

/// Timing knobs for the cache.
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    /// Re-provision once less than this much validity remains.
    pub renew_before: Duration,
    /// How long a failure is served from cache before issuance is retried.
    pub negative_ttl: Duration,
    /// Upper bound on a single issuance.
    pub issue_timeout: Duration,
}

impl CachePolicy {
    pub fn from_config(config: &TlsConfig) -> Self {
        Self {
            renew_before: config.renew_before(),
            negative_ttl: config.negative_cache(),
            issue_timeout: config.issue_timeout(),
        }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::from_config(&TlsConfig::default())
    }
}

/// Observable state of a hostname's record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertStatus {
    Pending,
    Ready,
    Failed,
}

type Outcome = Result<Arc<Certificate>, IssuanceError>;

enum CertState {
    Pending {
        done: watch::Receiver<Option<Outcome>>,
        previous: Option<Arc<Certificate>>,
    },
    Ready(Arc<Certificate>),
    Failed {
        error: IssuanceError,
        retry_at: Instant,
        previous: Option<Arc<Certificate>>,
    },
}

/// Decided under the shard lock, acted on after it is released.
enum Lookup {
    Serve(Arc<Certificate>),
    Wait(watch::Receiver<Option<Outcome>>),
    Fail(IssuanceError),
}

struct Inner {
    authority: Arc<dyn CertificateAuthority>,
    switchboard: SharedSwitchboard,
    store: Option<DiskStore>,
    policy: CachePolicy,
    records: DashMap<String, CertState>,
}

/// Concurrency-safe certificate cache. Cheap to clone.
#[derive(Clone)]
pub struct CertificateCache {
    inner: Arc<Inner>,
}

impl CertificateCache {
    pub fn new(
        authority: Arc<dyn CertificateAuthority>,
        switchboard: SharedSwitchboard,
        policy: CachePolicy,
        store: Option<DiskStore>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                authority,
                switchboard,
                store,
                policy,
                records: DashMap::new(),
            }),
        }
    }

    /// Certificate for `hostname`, provisioning it on first use.
    ///
    /// Concurrent callers for the same hostname share one issuance. Callers for other
    /// hostnames are never blocked by it.
    pub async fn get_certificate(&self, hostname: &str) -> Result<Arc<Certificate>, CertificateError> {
        let hostname = canonicalize(hostname);
        if !self.inner.switchboard.load().contains(&hostname) {
            metrics::record_certificate_lookup("unknown");
            return Err(CertificateError::UnknownHost(hostname));
        }

        match self.lookup(&hostname) {
            Lookup::Serve(cert) => Ok(cert),
            Lookup::Fail(error) => Err(error.into()),
            Lookup::Wait(done) => Ok(wait(&hostname, done).await?),
        }
    }

    /// Current state of the record for `hostname`, if one exists.
    pub fn status(&self, hostname: &str) -> Option<CertStatus> {
        self.inner
            .records
            .get(&canonicalize(hostname))
            .map(|record| match record.value() {
                CertState::Pending { .. } => CertStatus::Pending,
                CertState::Ready(_) => CertStatus::Ready,
                CertState::Failed { .. } => CertStatus::Failed,
            })
    }

    /// Drop records for hostnames that are no longer routed.
    pub fn retain_routed(&self, switchboard: &Switchboard) {
        let before = self.inner.records.len();
        self.inner.records.retain(|hostname, _| switchboard.contains(hostname));
        let removed = before.saturating_sub(self.inner.records.len());
        if removed > 0 {
            tracing::info!(removed, "Pruned certificates for removed hosts");
        }
    }

    pub fn len(&self) -> usize {
        self.inner.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.records.is_empty()
    }

    fn lookup(&self, hostname: &str) -> Lookup {
        let now = SystemTime::now();
        let policy = self.inner.policy;

        let mut entry = match self.inner.records.entry(hostname.to_string()) {
            Entry::Vacant(vacant) => {
                metrics::record_certificate_lookup("miss");
                let done = self.spawn_provisioning(hostname, None);
                vacant.insert(CertState::Pending {
                    done: done.clone(),
                    previous: None,
                });
                return Lookup::Wait(done);
            }
            Entry::Occupied(occupied) => occupied,
        };

        // `restart` is false when the previous task died: that is recorded as a failure
        // so a crashing authority is not called again before the negative window ends.
        let (previous, restart) = match entry.get() {
            CertState::Ready(cert) if !cert.needs_renewal(now, policy.renew_before) => {
                metrics::record_certificate_lookup("hit");
                return Lookup::Serve(Arc::clone(cert));
            }
            CertState::Ready(cert) => {
                tracing::info!(hostname, not_after = ?cert.not_after(), "Certificate due for renewal");
                (Some(Arc::clone(cert)), true)
            }
            CertState::Pending { done, previous } if !abandoned(done) => {
                return match usable(previous, now) {
                    Some(cert) => {
                        metrics::record_certificate_lookup("stale");
                        Lookup::Serve(cert)
                    }
                    None => {
                        metrics::record_certificate_lookup("wait");
                        Lookup::Wait(done.clone())
                    }
                };
            }
            CertState::Pending { previous, .. } => {
                tracing::warn!(hostname, "Provisioning task died without an outcome");
                (previous.clone(), false)
            }
            CertState::Failed {
                error,
                retry_at,
                previous,
            } if Instant::now() < *retry_at => {
                return match usable(previous, now) {
                    Some(cert) => {
                        metrics::record_certificate_lookup("stale");
                        Lookup::Serve(cert)
                    }
                    None => {
                        metrics::record_certificate_lookup("failed");
                        Lookup::Fail(error.clone())
                    }
                };
            }
            CertState::Failed { previous, .. } => (previous.clone(), true),
        };

        if !restart {
            let error = IssuanceError::Aborted(hostname.to_string());
            let lookup = match usable(&previous, now) {
                Some(cert) => {
                    metrics::record_certificate_lookup("stale");
                    Lookup::Serve(cert)
                }
                None => {
                    metrics::record_certificate_lookup("failed");
                    Lookup::Fail(error.clone())
                }
            };
            entry.insert(CertState::Failed {
                error,
                retry_at: Instant::now() + policy.negative_ttl,
                previous,
            });
            return lookup;
        }

        let done = self.spawn_provisioning(hostname, previous.clone());
        let lookup = match usable(&previous, now) {
            Some(cert) => {
                metrics::record_certificate_lookup("stale");
                Lookup::Serve(cert)
            }
            None => {
                metrics::record_certificate_lookup("miss");
                Lookup::Wait(done.clone())
            }
        };
        entry.insert(CertState::Pending { done, previous });
        lookup
    }

    /// Start the single provisioning task for `hostname`.
    ///
    /// Must be called while holding the record's entry so no second task can start.
    fn spawn_provisioning(
        &self,
        hostname: &str,
        previous: Option<Arc<Certificate>>,
    ) -> watch::Receiver<Option<Outcome>> {
        let (tx, rx) = watch::channel(None);
        let own = rx.clone();
        let inner = Arc::clone(&self.inner);
        let hostname = hostname.to_string();

        tokio::spawn(async move {
            let outcome = inner.provision(&hostname).await;
            let state = match &outcome {
                Ok(cert) => CertState::Ready(Arc::clone(cert)),
                Err(error) => CertState::Failed {
                    error: error.clone(),
                    retry_at: Instant::now() + inner.policy.negative_ttl,
                    previous,
                },
            };
            // Record first, then wake waiters, so anyone woken sees the settled state.
            // Only this task's own Pending record is replaced; if a reload pruned it,
            // the host stays out of the cache.
            if let Entry::Occupied(mut record) = inner.records.entry(hostname) {
                if matches!(record.get(), CertState::Pending { done, .. } if done.same_channel(&own)) {
                    record.insert(state);
                }
            }
            let _ = tx.send(Some(outcome));
        });

        rx
    }
}

impl Inner {
    async fn provision(&self, hostname: &str) -> Outcome {
        let started = Instant::now();

        if let Some(cert) = self.load_stored(hostname).await {
            metrics::record_issuance("stored", started);
            return Ok(cert);
        }

        tracing::info!(hostname, "Requesting certificate");
        let issued = match tokio::time::timeout(self.policy.issue_timeout, self.authority.issue(hostname)).await {
            Ok(Ok(issued)) => issued,
            Ok(Err(error)) => {
                tracing::warn!(hostname, error = %error, "Certificate issuance failed");
                metrics::record_issuance("failed", started);
                return Err(error);
            }
            Err(_) => {
                tracing::warn!(hostname, timeout = ?self.policy.issue_timeout, "Certificate issuance timed out");
                metrics::record_issuance("timeout", started);
                return Err(IssuanceError::Timeout(hostname.to_string()));
            }
        };

        let cert = match Certificate::from_issued(hostname, &issued) {
            Ok(cert) => Arc::new(cert),
            Err(error) => {
                tracing::warn!(hostname, error = %error, "Authority returned an unusable certificate");
                metrics::record_issuance("invalid", started);
                return Err(error);
            }
        };

        if let Some(store) = self.store.clone() {
            let hostname = hostname.to_string();
            tokio::spawn(async move {
                if let Err(e) = store.save(&hostname, &issued).await {
                    tracing::warn!(hostname, error = %e, "Failed to persist certificate");
                }
            });
        }

        tracing::info!(hostname, not_after = ?cert.not_after(), "Certificate issued");
        metrics::record_issuance("issued", started);
        Ok(cert)
    }

    /// A stored certificate that is still comfortably valid, if there is one.
    async fn load_stored(&self, hostname: &str) -> Option<Arc<Certificate>> {
        let store = self.store.as_ref()?;
        let issued = match store.load(hostname).await {
            Ok(found) => found?,
            Err(e) => {
                tracing::warn!(hostname, error = %e, "Ignoring unreadable stored certificate");
                return None;
            }
        };

        match Certificate::from_issued(hostname, &issued) {
            Ok(cert) if !cert.needs_renewal(SystemTime::now(), self.policy.renew_before) => {
                tracing::info!(hostname, not_after = ?cert.not_after(), "Loaded certificate from store");
                Some(Arc::new(cert))
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(hostname, error = %e, "Ignoring invalid stored certificate");
                None
            }
        }
    }
}

/// The provisioning task died without publishing an outcome.
fn abandoned(done: &watch::Receiver<Option<Outcome>>) -> bool {
    done.has_changed().is_err() && done.borrow().is_none()
}

fn usable(previous: &Option<Arc<Certificate>>, now: SystemTime) -> Option<Arc<Certificate>> {
    previous.as_ref().filter(|cert| !cert.is_expired(now)).cloned()
}

async fn wait(hostname: &str, mut done: watch::Receiver<Option<Outcome>>) -> Outcome {
    let outcome = match done.wait_for(Option::is_some).await {
        Ok(value) => value.clone(),
        Err(_) => None,
    };
    outcome.unwrap_or_else(|| Err(IssuanceError::Aborted(hostname.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certs::authority::{mint, IssuedCertificate};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    /// Test double that counts calls per hostname.
    struct FakeAuthority {
        calls: Mutex<HashMap<String, usize>>,
        total: AtomicUsize,
        delay: Duration,
        slow_host: Option<(&'static str, Duration)>,
        fail: bool,
        crash: bool,
        /// Validity for the first certificate; later ones get 90 days.
        first_validity: Duration,
    }

    impl FakeAuthority {
        fn new() -> Self {
            Self {
                calls: Mutex::new(HashMap::new()),
                total: AtomicUsize::new(0),
                delay: Duration::from_millis(50),
                slow_host: None,
                fail: false,
                crash: false,
                first_validity: 90 * DAY,
            }
        }

        fn calls(&self) -> usize {
            self.total.load(Ordering::SeqCst)
        }

        fn calls_for(&self, hostname: &str) -> usize {
            self.calls.lock().unwrap().get(hostname).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl CertificateAuthority for FakeAuthority {
        async fn issue(&self, hostname: &str) -> Result<IssuedCertificate, IssuanceError> {
            let previous = self.total.fetch_add(1, Ordering::SeqCst);
            *self.calls.lock().unwrap().entry(hostname.to_string()).or_default() += 1;
            if self.crash {
                panic!("authority crashed issuing {hostname}");
            }

            let delay = match self.slow_host {
                Some((slow, delay)) if slow == hostname => delay,
                _ => self.delay,
            };
            tokio::time::sleep(delay).await;

            if self.fail {
                return Err(IssuanceError::Rejected {
                    hostname: hostname.to_string(),
                    reason: "rate limited".into(),
                });
            }

            let validity = if previous == 0 { self.first_validity } else { 90 * DAY };
            let now = SystemTime::now();
            mint(hostname, now, now + validity)
        }
    }

    fn switchboard() -> SharedSwitchboard {
        SharedSwitchboard::new(
            Switchboard::from_entries([("a.test", 9001), ("b.test", 9002), ("slow.test", 9003)]).unwrap(),
        )
    }

    fn policy() -> CachePolicy {
        CachePolicy {
            renew_before: 30 * DAY,
            negative_ttl: Duration::from_secs(60),
            issue_timeout: Duration::from_secs(5),
        }
    }

    fn cache_with(authority: Arc<FakeAuthority>, policy: CachePolicy) -> CertificateCache {
        CertificateCache::new(authority, switchboard(), policy, None)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_lookups_issue_once() {
        let authority = Arc::new(FakeAuthority::new());
        let cache = cache_with(authority.clone(), policy());

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move { cache.get_certificate("a.test").await }));
        }

        let mut certs = Vec::new();
        for task in tasks {
            certs.push(task.await.unwrap().unwrap());
        }

        assert_eq!(authority.calls(), 1);
        assert!(certs.iter().all(|c| Arc::ptr_eq(c, &certs[0])));
        assert_eq!(cache.status("a.test"), Some(CertStatus::Ready));
    }

    #[tokio::test]
    async fn test_ready_certificate_served_without_issuance() {
        let authority = Arc::new(FakeAuthority::new());
        let cache = cache_with(authority.clone(), policy());

        let first = cache.get_certificate("a.test").await.unwrap();
        let second = cache.get_certificate("a.test").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(authority.calls(), 1);
    }

    #[tokio::test]
    async fn test_hostnames_are_canonicalized() {
        let authority = Arc::new(FakeAuthority::new());
        let cache = cache_with(authority.clone(), policy());

        let plain = cache.get_certificate("a.test").await.unwrap();
        let www = cache.get_certificate("WWW.A.Test").await.unwrap();

        assert!(Arc::ptr_eq(&plain, &www));
        assert_eq!(authority.calls_for("a.test"), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_host_never_reaches_authority() {
        let authority = Arc::new(FakeAuthority::new());
        let cache = cache_with(authority.clone(), policy());

        let err = cache.get_certificate("c.test").await.unwrap_err();

        assert_eq!(err, CertificateError::UnknownHost("c.test".into()));
        assert_eq!(authority.calls(), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failure_shared_and_negatively_cached() {
        let mut fake = FakeAuthority::new();
        fake.fail = true;
        let authority = Arc::new(fake);
        let cache = cache_with(authority.clone(), policy());

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move { cache.get_certificate("a.test").await }));
        }
        for task in tasks {
            let err = task.await.unwrap().unwrap_err();
            assert!(matches!(err, CertificateError::Issuance(IssuanceError::Rejected { .. })));
        }
        assert_eq!(authority.calls(), 1);
        assert_eq!(cache.status("a.test"), Some(CertStatus::Failed));

        // Inside the negative window: no new attempt.
        assert!(cache.get_certificate("a.test").await.is_err());
        assert_eq!(authority.calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_retried_after_negative_window() {
        let mut fake = FakeAuthority::new();
        fake.fail = true;
        fake.delay = Duration::from_millis(1);
        let authority = Arc::new(fake);
        let mut policy = policy();
        policy.negative_ttl = Duration::from_millis(50);
        let cache = cache_with(authority.clone(), policy);

        assert!(cache.get_certificate("a.test").await.is_err());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.get_certificate("a.test").await.is_err());

        assert_eq!(authority.calls(), 2);
    }

    #[tokio::test]
    async fn test_issuance_timeout() {
        let mut fake = FakeAuthority::new();
        fake.delay = Duration::from_millis(500);
        let authority = Arc::new(fake);
        let mut policy = policy();
        policy.issue_timeout = Duration::from_millis(20);
        let cache = cache_with(authority, policy);

        let err = cache.get_certificate("a.test").await.unwrap_err();
        assert_eq!(err, CertificateError::Issuance(IssuanceError::Timeout("a.test".into())));
        assert_eq!(cache.status("a.test"), Some(CertStatus::Failed));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_renewal_issues_once_and_keeps_serving_old_certificate() {
        let mut fake = FakeAuthority::new();
        fake.first_validity = Duration::from_secs(60 * 60);
        let authority = Arc::new(fake);
        let cache = cache_with(authority.clone(), policy());

        let original = cache.get_certificate("a.test").await.unwrap();
        assert_eq!(authority.calls(), 1);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move { cache.get_certificate("a.test").await }));
        }
        for task in tasks {
            let served = task.await.unwrap().unwrap();
            assert!(Arc::ptr_eq(&served, &original));
        }

        for _ in 0..100 {
            if cache.status("a.test") == Some(CertStatus::Ready) && authority.calls() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(authority.calls(), 2);

        let renewed = cache.get_certificate("a.test").await.unwrap();
        assert!(!Arc::ptr_eq(&renewed, &original));
        assert!(renewed.not_after() > original.not_after());
        assert_eq!(authority.calls(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_slow_issuance_does_not_block_other_hosts() {
        let mut fake = FakeAuthority::new();
        fake.delay = Duration::from_millis(1);
        fake.slow_host = Some(("slow.test", Duration::from_secs(3)));
        let authority = Arc::new(fake);
        let cache = cache_with(authority, policy());

        let slow = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_certificate("slow.test").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let fast = tokio::time::timeout(Duration::from_secs(1), cache.get_certificate("b.test")).await;
        assert!(matches!(fast, Ok(Ok(_))));
        assert_eq!(cache.status("slow.test"), Some(CertStatus::Pending));

        slow.abort();
    }

    #[tokio::test]
    async fn test_store_is_written_and_used_on_cold_start() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path());

        let first_authority = Arc::new(FakeAuthority::new());
        let first = CertificateCache::new(first_authority.clone(), switchboard(), policy(), Some(store.clone()));
        first.get_certificate("a.test").await.unwrap();

        let path = dir.path().join("a.test.json");
        for _ in 0..100 {
            if path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(path.exists());

        let second_authority = Arc::new(FakeAuthority::new());
        let second = CertificateCache::new(second_authority.clone(), switchboard(), policy(), Some(store));
        let cert = second.get_certificate("a.test").await.unwrap();

        assert_eq!(cert.hostname(), "a.test");
        assert_eq!(second_authority.calls(), 0);
    }

    #[tokio::test]
    async fn test_retain_routed_prunes_removed_hosts() {
        let authority = Arc::new(FakeAuthority::new());
        let cache = cache_with(authority, policy());
        cache.get_certificate("a.test").await.unwrap();
        cache.get_certificate("b.test").await.unwrap();

        cache.retain_routed(&Switchboard::from_entries([("b.test", 9002)]).unwrap());

        assert_eq!(cache.status("a.test"), None);
        assert_eq!(cache.status("b.test"), Some(CertStatus::Ready));
    }

    #[tokio::test]
    async fn test_crashed_provisioning_is_negatively_cached() {
        let mut fake = FakeAuthority::new();
        fake.crash = true;
        let authority = Arc::new(fake);
        let mut policy = policy();
        policy.negative_ttl = Duration::from_millis(50);
        let cache = cache_with(authority.clone(), policy);

        let err = cache.get_certificate("a.test").await.unwrap_err();
        assert_eq!(err, CertificateError::Issuance(IssuanceError::Aborted("a.test".into())));

        // The dead task is recorded as a failure instead of being restarted at once.
        let err = cache.get_certificate("a.test").await.unwrap_err();
        assert_eq!(err, CertificateError::Issuance(IssuanceError::Aborted("a.test".into())));
        assert_eq!(cache.status("a.test"), Some(CertStatus::Failed));
        assert!(cache.get_certificate("a.test").await.is_err());
        assert_eq!(authority.calls(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.get_certificate("a.test").await.is_err());
        assert_eq!(authority.calls(), 2);
    }

    #[tokio::test]
    async fn test_record_pruned_during_issuance_is_not_restored() {
        let mut fake = FakeAuthority::new();
        fake.delay = Duration::from_millis(100);
        let authority = Arc::new(fake);
        let cache = cache_with(authority, policy());

        let lookup = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_certificate("a.test").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.status("a.test"), Some(CertStatus::Pending));

        cache.retain_routed(&Switchboard::from_entries([("b.test", 9002)]).unwrap());

        // The waiter still gets the outcome, but the record stays gone.
        assert!(lookup.await.unwrap().is_ok());
        assert_eq!(cache.status("a.test"), None);
        assert!(cache.is_empty());
    }
}
