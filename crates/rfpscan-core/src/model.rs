//! Backend entities as the dashboard receives them.
//!
//! Every enumerated field keeps an `Unrecognized` fallback carrying the raw
//! string, so a value introduced by a newer backend deserializes instead of
//! failing the whole page.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeDelta, Utc};
use serde::{de::IgnoredAny, Deserialize, Deserializer, Serialize};
use uuid::Uuid;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $wire:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
            /// Raw value not known to this build.
            Unrecognized(String),
        }

        impl $name {
            /// Known variants in declaration order.
            pub const KNOWN: &'static [Self] = &[$(Self::$variant),+];

            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $wire,)+
                    Self::Unrecognized(raw) => raw.as_str(),
                }
            }

            pub fn is_recognized(&self) -> bool {
                !matches!(self, Self::Unrecognized(_))
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                match raw.trim().to_ascii_lowercase().as_str() {
                    $($wire => Self::$variant,)+
                    _ => Self::Unrecognized(raw),
                }
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self::from(raw.to_string())
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                match value {
                    $name::Unrecognized(raw) => raw,
                    known => known.as_str().to_string(),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub(crate) use wire_enum;

wire_enum! {
    pub enum SourceType {
        GovernmentPortal => "government_portal",
        PressRelease => "press_release",
        CorporateWebsite => "corporate_website",
        RssFeed => "rss_feed",
        Api => "api",
    }
}

wire_enum! {
    /// Operational status of a crawl source.
    pub enum SourceStatus {
        Active => "active",
        Paused => "paused",
        Inactive => "inactive",
        Disabled => "disabled",
        Error => "error",
        Maintenance => "maintenance",
    }
}

impl Default for SourceStatus {
    fn default() -> Self {
        Self::Active
    }
}

wire_enum! {
    /// Status of a crawl session as reported by the backend.
    pub enum SessionStatus {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        /// Finished with some errors.
        Partial => "partial",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Partial | Self::Failed | Self::Cancelled
        )
    }

    /// Whether the backend may move a session from `self` to `next`.
    ///
    /// `pending -> running -> {completed, partial, failed}` and
    /// `pending | running -> cancelled`. Self-loops are not transitions.
    pub fn can_transition_to(&self, next: &SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Partial)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

wire_enum! {
    /// Operator-facing lifecycle of an opportunity.
    pub enum OpportunityStatus {
        New => "new",
        Reviewing => "reviewing",
        Qualified => "qualified",
        NotRelevant => "not_relevant",
        Applied => "applied",
        Won => "won",
        Lost => "lost",
        Rejected => "rejected",
        Expired => "expired",
        Archived => "archived",
    }
}

impl Default for OpportunityStatus {
    fn default() -> Self {
        Self::New
    }
}

impl OpportunityStatus {
    /// Statuses the backend counts as active opportunities.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            Self::New | Self::Reviewing | Self::Qualified | Self::Applied
        )
    }
}

/// Backend timestamp kept verbatim; parsed on demand.
///
/// The backend emits both RFC 3339 strings and naive ISO-8601 strings that are
/// implicitly UTC. Anything else parses to `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(String);

impl Timestamp {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn parse(&self) -> Option<DateTime<Utc>> {
        parse_backend_timestamp(&self.0)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(at: DateTime<Utc>) -> Self {
        Self::from_datetime(at)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

const NAIVE_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

pub fn parse_backend_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LenientNumber {
    Number(f64),
    Text(String),
    #[allow(dead_code)]
    Other(IgnoredAny),
}

/// Decimals arrive as JSON numbers or as strings (`"0.85"`); garbage is `None`.
fn lenient_decimal<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match Option::<LenientNumber>::deserialize(deserializer)? {
        Some(LenientNumber::Number(n)) => Some(n),
        Some(LenientNumber::Text(text)) => text.trim().parse::<f64>().ok(),
        Some(LenientNumber::Other(_)) | None => None,
    };
    Ok(value.filter(|v| v.is_finite()))
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn default_true() -> bool {
    true
}

fn default_priority() -> i32 {
    5
}

/// A configured crawl target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlSource {
    pub id: Uuid,
    pub name: String,
    pub source_type: SourceType,
    #[serde(default)]
    pub state_code: Option<String>,
    #[serde(default)]
    pub county: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_true", alias = "enabled")]
    pub is_enabled: bool,
    #[serde(default)]
    pub status: SourceStatus,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub last_crawl_at: Option<Timestamp>,
    #[serde(default)]
    pub last_success_at: Option<Timestamp>,
    #[serde(default)]
    pub last_error_message: Option<String>,
    #[serde(default)]
    pub total_opportunities_found: u64,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
}

/// One execution attempt of a source's crawl.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlSession {
    pub id: Uuid,
    pub source_id: Uuid,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    pub started_at: Option<Timestamp>,
    #[serde(default)]
    pub completed_at: Option<Timestamp>,
    #[serde(default)]
    pub created_at: Timestamp,
    #[serde(default)]
    pub pages_crawled: u32,
    #[serde(default)]
    pub opportunities_found: u32,
    #[serde(default)]
    pub opportunities_new: u32,
    #[serde(default)]
    pub opportunities_updated: u32,
    #[serde(default)]
    pub documents_downloaded: u32,
    #[serde(default)]
    pub errors_count: u32,
    #[serde(default)]
    pub last_error_message: Option<String>,
    #[serde(default)]
    pub triggered_by: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleViolation {
    /// `completed_at` is set but the status is not terminal.
    CompletionBeforeTerminal,
    /// `started_at` is set while the session is still pending.
    StartedWhilePending,
    /// The session ran (or finished running) without a `started_at`.
    MissingStart,
}

impl CrawlSession {
    /// Wall time between start and completion, when both parse.
    pub fn duration(&self) -> Option<TimeDelta> {
        let started = self.started_at.as_ref()?.parse()?;
        let completed = self.completed_at.as_ref()?.parse()?;
        Some(completed - started)
    }

    /// Share of crawled pages that did not produce an error.
    pub fn success_rate(&self) -> Option<f64> {
        if self.pages_crawled == 0 {
            return None;
        }
        Some(1.0 - f64::from(self.errors_count) / f64::from(self.pages_crawled))
    }

    /// Timestamp invariants this record breaks. Unrecognized statuses are not checked.
    pub fn lifecycle_violations(&self) -> Vec<LifecycleViolation> {
        let mut out = Vec::new();
        if !self.status.is_recognized() {
            return out;
        }
        if self.completed_at.is_some() && !self.status.is_terminal() {
            out.push(LifecycleViolation::CompletionBeforeTerminal);
        }
        match self.status {
            SessionStatus::Pending if self.started_at.is_some() => {
                out.push(LifecycleViolation::StartedWhilePending);
            }
            SessionStatus::Running
            | SessionStatus::Completed
            | SessionStatus::Partial
            | SessionStatus::Failed
                if self.started_at.is_none() =>
            {
                out.push(LifecycleViolation::MissingStart);
            }
            _ => {}
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
}

/// A discovered procurement or initiative record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: Uuid,
    pub source_id: Uuid,
    #[serde(default, alias = "source_opportunity_id")]
    pub external_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default, alias = "agency")]
    pub department: Option<String>,
    /// Legacy single-label classification.
    #[serde(default)]
    pub category: Option<crate::classification::Category>,
    /// Ordered multi-label classification; the first entry is the primary one.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub categories: Vec<crate::classification::Category>,
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub state_code: Option<String>,
    #[serde(default)]
    pub county: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub published_date: Option<Timestamp>,
    #[serde(default)]
    pub submission_deadline: Option<Timestamp>,
    #[serde(default)]
    pub prequalification_deadline: Option<Timestamp>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub estimated_value: Option<f64>,
    #[serde(default, alias = "value_currency")]
    pub currency: Option<String>,
    #[serde(default)]
    pub contact_info: Option<ContactInfo>,
    #[serde(default)]
    pub requires_prequalification: bool,
    #[serde(default)]
    pub is_discretionary: bool,
    #[serde(default)]
    pub status: OpportunityStatus,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub relevance_score: Option<f64>,
    #[serde(default, alias = "internal_notes")]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
}

impl Opportunity {
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }
}

/// Aggregate counters served by the backend's stats endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardStats {
    pub total_opportunities: u64,
    pub new_this_week: u64,
    pub new_this_month: u64,
    pub active_opportunities: u64,
    pub by_status: BTreeMap<String, u64>,
    pub by_category: BTreeMap<String, u64>,
    pub by_state: BTreeMap<String, u64>,
    pub requiring_prequalification: u64,
    pub discretionary: u64,
    pub deadlines_this_week: u64,
    pub deadlines_next_week: u64,
    pub expired: u64,
    #[serde(deserialize_with = "lenient_decimal")]
    pub average_relevance_score: Option<f64>,
    pub total_sources: u64,
    pub active_sources: u64,
}
