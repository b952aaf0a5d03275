//! Crawl session liveness and the status shown to operators.
//!
//! A `pending` record is only trusted for a short window after creation: a
//! crawler that dies between creating the session and starting it leaves the
//! row pending forever, so past the window the source reads as `Ready` again.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::model::{CrawlSession, CrawlSource, SessionStatus, SourceStatus};

pub const DEFAULT_PENDING_TIMEOUT_SECS: u64 = 120;

/// How long a `pending` session counts as live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessPolicy {
    pending_timeout: TimeDelta,
}

impl Default for LivenessPolicy {
    fn default() -> Self {
        Self::from_secs(DEFAULT_PENDING_TIMEOUT_SECS)
    }
}

impl LivenessPolicy {
    pub fn new(pending_timeout: TimeDelta) -> Self {
        Self { pending_timeout }
    }

    pub fn from_secs(secs: u64) -> Self {
        let secs = i64::try_from(secs).unwrap_or(i64::MAX);
        Self::new(TimeDelta::try_seconds(secs).unwrap_or(TimeDelta::MAX))
    }

    pub fn pending_timeout(&self) -> TimeDelta {
        self.pending_timeout
    }

    pub fn is_active(&self, session: Option<&CrawlSession>, now: DateTime<Utc>) -> bool {
        let Some(session) = session else {
            return false;
        };
        match session.status {
            SessionStatus::Running => true,
            SessionStatus::Pending => session
                .created_at
                .parse()
                .is_some_and(|created| now - created < self.pending_timeout),
            _ => false,
        }
    }

    pub fn display_status(
        &self,
        session: Option<&CrawlSession>,
        now: DateTime<Utc>,
    ) -> DisplayStatus {
        let Some(current) = session else {
            return DisplayState::Ready.into();
        };
        let state = match &current.status {
            SessionStatus::Pending if self.is_active(session, now) => DisplayState::Pending,
            SessionStatus::Pending => DisplayState::Ready,
            SessionStatus::Running => DisplayState::Running,
            SessionStatus::Completed => DisplayState::Completed,
            SessionStatus::Partial => DisplayState::Partial,
            SessionStatus::Failed => DisplayState::Failed,
            SessionStatus::Cancelled => DisplayState::Cancelled,
            SessionStatus::Unrecognized(_) => DisplayState::Ready,
        };
        state.into()
    }

    pub fn can_trigger_crawl(
        &self,
        session: Option<&CrawlSession>,
        has_source: bool,
        now: DateTime<Utc>,
    ) -> bool {
        has_source && !self.is_active(session, now)
    }
}

/// `running`, or `pending` for less than two minutes.
pub fn is_active(session: Option<&CrawlSession>, now: DateTime<Utc>) -> bool {
    LivenessPolicy::default().is_active(session, now)
}

pub fn resolve_display_status(
    session: Option<&CrawlSession>,
    now: DateTime<Utc>,
) -> DisplayStatus {
    LivenessPolicy::default().display_status(session, now)
}

/// Only guards the dashboard button; the backend enforces its own exclusion.
pub fn can_trigger_crawl(
    session: Option<&CrawlSession>,
    has_source: bool,
    now: DateTime<Utc>,
) -> bool {
    LivenessPolicy::default().can_trigger_crawl(session, has_source, now)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Success,
    Info,
    Warning,
    Error,
    Neutral,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayState {
    Ready,
    Pending,
    Running,
    Completed,
    Partial,
    Failed,
    Cancelled,
}

impl DisplayState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Ready => "Ready",
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Partial => "Partial",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            Self::Ready | Self::Completed => Severity::Success,
            Self::Running => Severity::Info,
            Self::Pending | Self::Partial => Severity::Warning,
            Self::Failed => Severity::Error,
            Self::Cancelled => Severity::Neutral,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DisplayStatus {
    pub state: DisplayState,
    pub label: &'static str,
    pub severity: Severity,
}

impl From<DisplayState> for DisplayStatus {
    fn from(state: DisplayState) -> Self {
        Self {
            state,
            label: state.label(),
            severity: state.severity(),
        }
    }
}

/// Badge for a crawl source's configuration state.
pub fn resolve_source_status(source: &CrawlSource) -> (&'static str, Severity) {
    if !source.is_enabled {
        return ("Disabled", Severity::Neutral);
    }
    match source.status {
        SourceStatus::Active => ("Enabled", Severity::Success),
        SourceStatus::Paused | SourceStatus::Inactive => ("Paused", Severity::Warning),
        SourceStatus::Disabled => ("Disabled", Severity::Neutral),
        SourceStatus::Error => ("Error", Severity::Error),
        SourceStatus::Maintenance => ("Maintenance", Severity::Warning),
        SourceStatus::Unrecognized(_) => ("Unknown", Severity::Neutral),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SourceType, Timestamp};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).single().unwrap()
    }

    fn session(status: SessionStatus, created_at: Timestamp) -> CrawlSession {
        CrawlSession {
            id: Uuid::new_v4(),
            source_id: Uuid::new_v4(),
            status,
            started_at: None,
            completed_at: None,
            created_at,
            pages_crawled: 0,
            opportunities_found: 0,
            opportunities_new: 0,
            opportunities_updated: 0,
            documents_downloaded: 0,
            errors_count: 0,
            last_error_message: None,
            triggered_by: Some("api".into()),
        }
    }

    fn created_ago(secs: i64) -> Timestamp {
        Timestamp::from_datetime(now() - TimeDelta::seconds(secs))
    }

    #[test]
    fn no_session_is_idle_and_ready() {
        assert!(!is_active(None, now()));
        assert_eq!(resolve_display_status(None, now()).state, DisplayState::Ready);
        assert_eq!(resolve_display_status(None, now()).severity, Severity::Success);
    }

    #[test]
    fn running_is_active_regardless_of_age() {
        for created in [created_ago(5), created_ago(86_400 * 30), Timestamp::new("garbage")] {
            let s = session(SessionStatus::Running, created);
            assert!(is_active(Some(&s), now()));
            assert_eq!(resolve_display_status(Some(&s), now()).label, "Running");
        }
    }

    #[test]
    fn pending_window_boundary() {
        let fresh = session(SessionStatus::Pending, created_ago(119));
        assert!(is_active(Some(&fresh), now()));
        assert_eq!(resolve_display_status(Some(&fresh), now()).label, "Pending");

        let stale = session(SessionStatus::Pending, created_ago(120));
        assert!(!is_active(Some(&stale), now()));
        assert_eq!(resolve_display_status(Some(&stale), now()).label, "Ready");
    }

    #[test]
    fn pending_with_unparseable_creation_fails_safe() {
        let s = session(SessionStatus::Pending, Timestamp::new("not a date"));
        assert!(!is_active(Some(&s), now()));
        assert_eq!(resolve_display_status(Some(&s), now()).state, DisplayState::Ready);
        assert!(can_trigger_crawl(Some(&s), true, now()));
    }

    #[test]
    fn terminal_sessions_are_never_active() {
        for (status, label) in [
            (SessionStatus::Completed, "Completed"),
            (SessionStatus::Partial, "Partial"),
            (SessionStatus::Failed, "Failed"),
            (SessionStatus::Cancelled, "Cancelled"),
        ] {
            let s = session(status, created_ago(1));
            assert!(!is_active(Some(&s), now()));
            assert_eq!(resolve_display_status(Some(&s), now()).label, label);
        }
    }

    #[test]
    fn unknown_status_reads_as_ready() {
        let s = session(SessionStatus::from("throttled"), created_ago(1));
        assert!(!is_active(Some(&s), now()));
        assert_eq!(resolve_display_status(Some(&s), now()).label, "Ready");
    }

    #[test]
    fn trigger_needs_a_source_and_an_idle_session() {
        let running = session(SessionStatus::Running, created_ago(10));
        let done = session(SessionStatus::Completed, created_ago(10));
        assert!(!can_trigger_crawl(None, false, now()));
        assert!(!can_trigger_crawl(Some(&done), false, now()));
        assert!(!can_trigger_crawl(Some(&running), true, now()));
        assert!(can_trigger_crawl(Some(&done), true, now()));
        assert!(can_trigger_crawl(None, true, now()));
    }

    #[test]
    fn policy_window_is_configurable() {
        let policy = LivenessPolicy::from_secs(600);
        let s = session(SessionStatus::Pending, created_ago(300));
        assert!(policy.is_active(Some(&s), now()));
        assert!(!is_active(Some(&s), now()));
        assert_eq!(LivenessPolicy::default().pending_timeout(), TimeDelta::seconds(120));
    }

    #[test]
    fn trigger_then_stale_pending_round_trip() {
        let created = now();
        let s = session(SessionStatus::Pending, Timestamp::from_datetime(created));
        let soon = created + TimeDelta::seconds(30);
        assert_eq!(resolve_display_status(Some(&s), soon).label, "Pending");
        assert!(!can_trigger_crawl(Some(&s), true, soon));

        let later = created + TimeDelta::minutes(2);
        assert_eq!(resolve_display_status(Some(&s), later).label, "Ready");
        assert!(can_trigger_crawl(Some(&s), true, later));
    }

    #[test]
    fn source_badges() {
        let mut source = CrawlSource {
            id: Uuid::new_v4(),
            name: "Texas SmartBuy".into(),
            source_type: SourceType::GovernmentPortal,
            state_code: Some("TX".into()),
            county: None,
            region: None,
            base_url: "https://www.txsmartbuy.com".into(),
            is_enabled: true,
            status: SourceStatus::Active,
            priority: 3,
            last_crawl_at: None,
            last_success_at: None,
            last_error_message: None,
            total_opportunities_found: 0,
            created_at: None,
            updated_at: None,
        };
        assert_eq!(resolve_source_status(&source).0, "Enabled");
        source.status = SourceStatus::Error;
        assert_eq!(resolve_source_status(&source), ("Error", Severity::Error));
        source.is_enabled = false;
        assert_eq!(resolve_source_status(&source).0, "Disabled");
    }
}
