//! Fetch-and-resolve cycle behind the operator dashboard.
//!
//! Each cycle fans out the four backend reads, joins them into one
//! [`Snapshot`] and only then hands it to the resolvers. A failed read fails
//! the whole cycle: the previous snapshot stays and a banner explains why.

mod config;
mod view;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use rfpscan_client::{ApiClient, ApiError, DashboardBackend, TriggerResponse};
use rfpscan_core::query::MAX_PAGE_SIZE;
use rfpscan_core::{CrawlSession, LivenessPolicy, OpportunityQuery};
use thiserror::Error;
use tokio::sync::{watch, Mutex, RwLock};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use config::{ConfigError, DashboardConfig, CONFIG_PATH_ENV};
pub use view::{
    format_amount, opportunity_row, resolve, CrawlPanel, DashboardView, OpportunityRow,
    SessionRow, Snapshot, SourceRow,
};

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error(transparent)]
    Backend(#[from] ApiError),
    #[error("no crawl source is configured")]
    NoSource,
    #[error("source {0} is disabled")]
    SourceDisabled(Uuid),
    #[error("source {0} already has an active crawl session")]
    CrawlInProgress(Uuid),
}

/// Fetches the four dashboard reads concurrently; any failure fails the lot.
///
/// Sessions are read at the largest page the backend serves so per-source
/// rows see as much history as one request allows.
pub async fn fetch_snapshot(
    backend: &dyn DashboardBackend,
    page_size: u32,
) -> Result<Snapshot, ApiError> {
    let query = OpportunityQuery::default().page(1, page_size);
    let (stats, opportunities, sessions, sources) = tokio::try_join!(
        backend.dashboard_stats(),
        backend.list_opportunities(&query),
        backend.list_sessions(1, MAX_PAGE_SIZE),
        backend.list_sources(1, MAX_PAGE_SIZE),
    )?;
    Ok(Snapshot {
        stats,
        opportunities,
        sessions,
        sources,
        fetched_at: Utc::now(),
    })
}

#[derive(Debug, Default)]
struct DashboardState {
    snapshot: Option<Snapshot>,
    /// Triggered sessions not yet listed by the backend, by source.
    pending: HashMap<Uuid, CrawlSession>,
    banner: Option<String>,
}

pub struct Dashboard {
    backend: Arc<dyn DashboardBackend>,
    config: DashboardConfig,
    policy: LivenessPolicy,
    state: RwLock<DashboardState>,
    trigger_gate: Mutex<()>,
    cycles: watch::Sender<u64>,
}

impl Dashboard {
    pub fn new(backend: Arc<dyn DashboardBackend>, config: DashboardConfig) -> Self {
        let policy = config.liveness_policy();
        let (cycles, _) = watch::channel(0);
        Self {
            backend,
            config,
            policy,
            state: RwLock::new(DashboardState::default()),
            trigger_gate: Mutex::new(()),
            cycles,
        }
    }

    /// Dashboard talking HTTP to the configured backend.
    pub fn connect(config: DashboardConfig) -> Result<Self, DashboardError> {
        let client = ApiClient::new(config.api_client_config())?;
        Ok(Self::new(Arc::new(client), config))
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn policy(&self) -> &LivenessPolicy {
        &self.policy
    }

    pub fn backend(&self) -> Arc<dyn DashboardBackend> {
        Arc::clone(&self.backend)
    }

    /// Ticks after every refresh attempt and every trigger.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.cycles.subscribe()
    }

    pub async fn refresh(&self) -> Result<(), DashboardError> {
        match fetch_snapshot(self.backend.as_ref(), self.config.page_size).await {
            Ok(snapshot) => {
                for session in &snapshot.sessions.items {
                    let violations = session.lifecycle_violations();
                    if !violations.is_empty() {
                        warn!(
                            session_id = %session.id,
                            status = %session.status,
                            ?violations,
                            "crawl session breaks lifecycle invariants"
                        );
                    }
                }
                let listed: HashSet<Uuid> =
                    snapshot.sessions.items.iter().map(|s| s.id).collect();
                let mut state = self.state.write().await;
                state.pending.retain(|_, local| {
                    !listed.contains(&local.id)
                        && self.policy.is_active(Some(local), snapshot.fetched_at)
                });
                info!(
                    opportunities = snapshot.opportunities.total,
                    sessions = snapshot.sessions.items.len(),
                    sources = snapshot.sources.items.len(),
                    "dashboard refreshed"
                );
                state.snapshot = Some(snapshot);
                state.banner = None;
                drop(state);
                self.cycles.send_modify(|n| *n += 1);
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "dashboard refresh failed; keeping previous snapshot");
                self.record_failure(&err).await;
                self.cycles.send_modify(|n| *n += 1);
                Err(err.into())
            }
        }
    }

    async fn record_failure(&self, err: &ApiError) {
        self.state.write().await.banner = Some(err.banner(&self.config.backend_url()));
    }

    /// Resolves the current snapshot against `now`.
    pub async fn view_at(&self, now: DateTime<Utc>) -> DashboardView {
        let state = self.state.read().await;
        match &state.snapshot {
            Some(snapshot) => {
                let mut view = view::resolve(snapshot, &state.pending, &self.policy, now);
                view.banner = state.banner.clone();
                view
            }
            None => DashboardView::empty(now, self.config.page_size, state.banner.clone()),
        }
    }

    /// Requests a crawl and returns as soon as the backend has created the
    /// session; a delayed refresh picks up its progress.
    ///
    /// With no `source_id` the primary source is used and the global latest
    /// session also gates the request, matching the dashboard's single button.
    /// Triggers run one at a time, so two requests racing for the same source
    /// cannot both pass the liveness check.
    pub async fn trigger_crawl(
        self: &Arc<Self>,
        source_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<TriggerResponse, DashboardError> {
        let _gate = self.trigger_gate.lock().await;

        let target = {
            let state = self.state.read().await;
            let snapshot = state.snapshot.as_ref();
            let target = match source_id {
                Some(id) => id,
                None => snapshot
                    .and_then(Snapshot::primary_source)
                    .map(|s| s.id)
                    .ok_or(DashboardError::NoSource)?,
            };
            let known = snapshot
                .and_then(|snap| snap.sources.items.iter().find(|s| s.id == target));
            if known.is_some_and(|s| !s.is_enabled) {
                return Err(DashboardError::SourceDisabled(target));
            }

            let listed = snapshot.and_then(|snap| {
                snap.sessions.items.iter().find(|s| s.source_id == target)
            });
            let mut busy = self.policy.is_active(state.pending.get(&target), now)
                || self.policy.is_active(listed, now);
            if source_id.is_none() {
                let newest_pending = state.pending.values().max_by_key(|s| s.created_at.parse());
                let listed_latest = snapshot.and_then(Snapshot::latest_session);
                let current = view::newest(listed_latest, newest_pending);
                busy |= self.policy.is_active(current, now);
            }
            if busy {
                return Err(DashboardError::CrawlInProgress(target));
            }
            target
        };

        // The snapshot only holds the newest sessions; ask for this source's own.
        match self.backend.list_sessions_for_source(target, 1, 1).await {
            Ok(latest) if self.policy.is_active(latest.first(), now) => {
                return Err(DashboardError::CrawlInProgress(target));
            }
            Ok(_) => {}
            Err(err) => {
                warn!(source_id = %target, error = %err, "session lookup before trigger failed");
                self.record_failure(&err).await;
                return Err(err.into());
            }
        }

        let response = match self.backend.trigger_crawl(target).await {
            Ok(response) => response,
            Err(err) => {
                warn!(source_id = %target, error = %err, "crawl trigger failed");
                self.record_failure(&err).await;
                return Err(err.into());
            }
        };
        info!(
            session_id = %response.session_id,
            source_id = %response.source_id,
            source = %response.source_name,
            "crawl triggered"
        );
        self.state
            .write()
            .await
            .pending
            .insert(target, response.optimistic_session(now));
        self.cycles.send_modify(|n| *n += 1);

        let this = Arc::clone(self);
        let delay = self.config.post_trigger_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if this.refresh().await.is_err() {
                debug!("post-trigger refresh failed; next scheduled refresh will retry");
            }
        });
        Ok(response)
    }
}

/// Periodic refresh job. Start it once the dashboard exists, shut it down on exit.
pub struct AutoRefresh {
    scheduler: JobScheduler,
}

impl AutoRefresh {
    pub async fn start(dashboard: Arc<Dashboard>) -> anyhow::Result<Self> {
        let every = dashboard.config().refresh_interval();
        let scheduler = JobScheduler::new()
            .await
            .context("creating refresh scheduler")?;
        let job = Job::new_repeated_async(every, move |_id, _sched| {
            let dashboard = Arc::clone(&dashboard);
            Box::pin(async move {
                // Failures are logged and bannered inside refresh.
                let _ = dashboard.refresh().await;
            })
        })
        .with_context(|| format!("creating refresh job every {every:?}"))?;
        scheduler.add(job).await.context("adding refresh job")?;
        scheduler
            .start()
            .await
            .context("starting refresh scheduler")?;
        info!(interval_secs = every.as_secs(), "auto refresh started");
        Ok(Self { scheduler })
    }

    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        self.scheduler
            .shutdown()
            .await
            .context("stopping refresh scheduler")?;
        info!("auto refresh stopped");
        Ok(())
    }
}
