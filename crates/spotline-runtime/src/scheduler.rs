//! Maintenance scheduler
//!
//! One periodic tick drives three background duties on independent
//! cadences:
//!
//! 1. **Health**: report `Running` with the remaining inventory as resource
//!    count
//! 2. **Refresh**: reload the configuration cache
//! 3. **Reorganize**: roll past inventory forward
//!
//! Each tick does at most one of them, in that order of priority. Refresh
//! and reorganize each run off the tick (refresh as a task, reorganize on
//! the blocking pool) behind their own in-flight guard, so neither can
//! overlap itself while the two may overlap each other. A refresh that
//! leaves any collection stale, or a pass that finds another pass running,
//! hands its slot back so the next tick tries again.
//!
//! Scheduler state is atomics only; the request path never contends with it.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use spotline_core::{
    Clock, MaintenanceConfig, ServerId, ServiceStatus, SETTING_READ_CACHE_INTERVAL,
    SETTING_REORGANIZE_INTERVAL, SETTING_REPORT_HEALTH_INTERVAL,
};
use spotline_plan::StackReorganizer;

use crate::cache::{ConfigSnapshot, ConfigurationCache};
use crate::status::StatusService;

const NEVER: i64 = i64::MIN;

/// What a tick did
#[derive(Debug)]
pub enum TickOutcome {
    /// Health was reported inline
    HealthReported,
    /// A cache refresh was started
    RefreshStarted(JoinHandle<()>),
    /// A reorganization pass was started
    ReorganizeStarted(JoinHandle<()>),
    /// Nothing was due, or the due job was already in flight
    Idle,
}

impl TickOutcome {
    /// Short name for logs and assertions
    pub fn name(&self) -> &'static str {
        match self {
            TickOutcome::HealthReported => "health",
            TickOutcome::RefreshStarted(_) => "refresh",
            TickOutcome::ReorganizeStarted(_) => "reorganize",
            TickOutcome::Idle => "idle",
        }
    }

    /// Wait for a started job to finish
    pub async fn join(self) {
        if let TickOutcome::RefreshStarted(handle) | TickOutcome::ReorganizeStarted(handle) = self
        {
            if let Err(err) = handle.await {
                warn!(error = %err, "Maintenance job did not complete");
            }
        }
    }
}

/// Clears an in-flight flag however the job ends
struct FlagGuard(Arc<AtomicBool>);

impl FlagGuard {
    fn claim(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for FlagGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Identity this runtime reports its heartbeat under
#[derive(Debug, Clone)]
pub struct HeartbeatIdentity {
    /// Service name
    pub service: String,
    /// Server id
    pub server: ServerId,
}

/// Periodic driver of health, refresh and reorganization
pub struct MaintenanceScheduler {
    identity: HeartbeatIdentity,
    fallback: MaintenanceConfig,
    cache: Arc<ConfigurationCache>,
    reorganizer: Arc<StackReorganizer>,
    status: Arc<dyn StatusService>,
    clock: Arc<dyn Clock>,
    last_health: AtomicI64,
    last_refresh: Arc<AtomicI64>,
    last_reorganize: Arc<AtomicI64>,
    refreshing: Arc<AtomicBool>,
}

impl std::fmt::Debug for MaintenanceScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaintenanceScheduler")
            .field("identity", &self.identity)
            .field("refreshing", &self.is_refreshing())
            .field("reorganizing", &self.is_reorganizing())
            .finish_non_exhaustive()
    }
}

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

impl MaintenanceScheduler {
    /// Scheduler with every duty due on the first tick
    pub fn new(
        identity: HeartbeatIdentity,
        fallback: MaintenanceConfig,
        cache: Arc<ConfigurationCache>,
        reorganizer: Arc<StackReorganizer>,
        status: Arc<dyn StatusService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            identity,
            fallback,
            cache,
            reorganizer,
            status,
            clock,
            last_health: AtomicI64::new(NEVER),
            last_refresh: Arc::new(AtomicI64::new(NEVER)),
            last_reorganize: Arc::new(AtomicI64::new(NEVER)),
            refreshing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Record a refresh performed outside the scheduler
    pub fn mark_refreshed(&self, at: DateTime<Utc>) {
        self.last_refresh.store(millis(at), Ordering::Release);
    }

    /// Returns true while a refresh is in flight
    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    /// Returns true while a reorganization is in flight
    pub fn is_reorganizing(&self) -> bool {
        self.reorganizer.is_running()
    }

    /// Interval in milliseconds: cache setting, else configuration
    fn interval_ms(snapshot: &ConfigSnapshot, setting: &str, fallback: u64) -> i64 {
        let minutes = snapshot.setting_minutes(setting).unwrap_or(fallback).max(1);
        i64::try_from(minutes.saturating_mul(60_000)).unwrap_or(i64::MAX)
    }

    fn due(last: &AtomicI64, now: DateTime<Utc>, interval_ms: i64) -> bool {
        let last = last.load(Ordering::Acquire);
        last == NEVER || millis(now).saturating_sub(last) >= interval_ms
    }

    /// Hand a claimed slot back unless something recorded a newer run
    fn release_slot(last: &AtomicI64, claimed: i64, previous: i64) {
        let _ = last.compare_exchange(claimed, previous, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Evaluate one tick
    pub async fn tick(&self) -> TickOutcome {
        let now = self.clock.now();
        let snapshot = self.cache.snapshot();

        let health = Self::interval_ms(
            &snapshot,
            SETTING_REPORT_HEALTH_INTERVAL,
            self.fallback.report_health_interval_minutes,
        );
        if Self::due(&self.last_health, now, health) {
            self.report_health().await;
            self.last_health.store(millis(now), Ordering::Release);
            return TickOutcome::HealthReported;
        }

        let refresh = Self::interval_ms(
            &snapshot,
            SETTING_READ_CACHE_INTERVAL,
            self.fallback.read_cache_interval_minutes,
        );
        if Self::due(&self.last_refresh, now, refresh) {
            if let Some(guard) = FlagGuard::claim(&self.refreshing) {
                let claimed = millis(now);
                self.last_refresh.store(claimed, Ordering::Release);
                let last_refresh = Arc::clone(&self.last_refresh);
                let cache = Arc::clone(&self.cache);
                let handle = tokio::spawn(async move {
                    let _guard = guard;
                    let report = cache.refresh().await;
                    if !report.is_complete() {
                        debug!(failed = report.failed.len(), "Refresh incomplete, retrying next tick");
                        Self::release_slot(&last_refresh, claimed, NEVER);
                    }
                });
                return TickOutcome::RefreshStarted(handle);
            }
            debug!("Refresh due but still in flight");
        }

        let reorganize = Self::interval_ms(
            &snapshot,
            SETTING_REORGANIZE_INTERVAL,
            self.fallback.reorganize_interval_minutes,
        );
        if Self::due(&self.last_reorganize, now, reorganize) {
            if !self.reorganizer.is_running() {
                let claimed = millis(now);
                let previous = self.last_reorganize.swap(claimed, Ordering::AcqRel);
                let last_reorganize = Arc::clone(&self.last_reorganize);
                let reorganizer = Arc::clone(&self.reorganizer);
                let bucket = self.clock.current_bucket();
                let handle = tokio::task::spawn_blocking(move || {
                    if reorganizer.run_pass(bucket).is_none() {
                        debug!("Pass already running elsewhere, retrying next tick");
                        Self::release_slot(&last_reorganize, claimed, previous);
                    }
                });
                return TickOutcome::ReorganizeStarted(handle);
            }
            debug!("Reorganization due but still in flight");
        }

        TickOutcome::Idle
    }

    /// Remaining inventory, read on the blocking pool
    ///
    /// `stats` takes every bucket's read lock and would otherwise stall a
    /// worker thread behind a running pass.
    async fn remaining(&self) -> u64 {
        let store = Arc::clone(self.reorganizer.store());
        match tokio::task::spawn_blocking(move || store.stats().remaining).await {
            Ok(remaining) => remaining,
            Err(err) => {
                warn!(error = %err, "Inventory count did not complete");
                0
            }
        }
    }

    #[instrument(skip(self), fields(service = %self.identity.service, server = %self.identity.server))]
    async fn report_health(&self) {
        let remaining = self.remaining().await;
        match self
            .status
            .report_status(
                &self.identity.service,
                &self.identity.server,
                ServiceStatus::Running,
                remaining,
            )
            .await
        {
            Ok(()) => debug!(remaining, "Health reported"),
            Err(err) => warn!(error = %err, "Health report failed"),
        }
    }

    /// Report a final status, used at shutdown
    pub async fn report_final(&self, status: ServiceStatus) {
        let remaining = self.remaining().await;
        match self
            .status
            .report_status(&self.identity.service, &self.identity.server, status, remaining)
            .await
        {
            Ok(()) => info!(%status, "Final status reported"),
            Err(err) => warn!(%status, error = %err, "Final status report failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(minutes * 60, 0).unwrap()
    }

    #[test]
    fn test_flag_guard_is_exclusive_and_releases_on_drop() {
        let flag = Arc::new(AtomicBool::new(false));

        let guard = FlagGuard::claim(&flag).unwrap();
        assert!(flag.load(Ordering::Acquire));
        assert!(FlagGuard::claim(&flag).is_none());

        drop(guard);
        assert!(!flag.load(Ordering::Acquire));
        assert!(FlagGuard::claim(&flag).is_some());
    }

    #[test]
    fn test_never_run_is_always_due() {
        let last = AtomicI64::new(NEVER);
        assert!(MaintenanceScheduler::due(&last, at(0), i64::MAX));
    }

    #[test]
    fn test_due_after_full_interval() {
        let last = AtomicI64::new(millis(at(10)));
        assert!(!MaintenanceScheduler::due(&last, at(11), 2 * 60_000));
        assert!(MaintenanceScheduler::due(&last, at(12), 2 * 60_000));
    }

    #[test]
    fn test_released_slot_is_due_again_unless_overtaken() {
        let claimed = millis(at(10));
        let last = AtomicI64::new(claimed);
        MaintenanceScheduler::release_slot(&last, claimed, NEVER);
        assert!(MaintenanceScheduler::due(&last, at(10), 60_000));

        let newer = millis(at(11));
        let last = AtomicI64::new(newer);
        MaintenanceScheduler::release_slot(&last, claimed, NEVER);
        assert_eq!(last.load(Ordering::Acquire), newer);
    }

    #[test]
    fn test_interval_prefers_setting_over_fallback() {
        let mut settings = std::collections::BTreeMap::new();
        settings.insert(SETTING_REORGANIZE_INTERVAL.to_string(), "3".to_string());
        let snapshot = ConfigSnapshot::default().with_settings(settings);

        assert_eq!(
            MaintenanceScheduler::interval_ms(&snapshot, SETTING_REORGANIZE_INTERVAL, 1),
            180_000
        );
        assert_eq!(
            MaintenanceScheduler::interval_ms(&snapshot, SETTING_READ_CACHE_INTERVAL, 5),
            300_000
        );
    }
}
