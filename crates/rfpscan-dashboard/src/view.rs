//! Resolved, render-ready view of one snapshot.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rfpscan_client::display_host;
use rfpscan_core::{
    category_label, deadline_bucket, deadline_urgency, primary_category, relative_time,
    resolve_source_status, CrawlSession, CrawlSource, DashboardStats, DeadlineBucket,
    DeadlineUrgency, DisplayStatus, LivenessPolicy, Opportunity, Page, RelativeDuration,
    Severity,
};
use serde::Serialize;
use uuid::Uuid;

/// Backend data joined from one refresh cycle.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub stats: DashboardStats,
    pub opportunities: Page<Opportunity>,
    pub sessions: Page<CrawlSession>,
    pub sources: Page<CrawlSource>,
    pub fetched_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn latest_session(&self) -> Option<&CrawlSession> {
        self.sessions.first()
    }

    /// Source the dashboard's trigger button targets: first enabled, else first listed.
    pub fn primary_source(&self) -> Option<&CrawlSource> {
        self.sources
            .items
            .iter()
            .find(|s| s.is_enabled)
            .or_else(|| self.sources.first())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CrawlPanel {
    pub status: DisplayStatus,
    pub active: bool,
    pub can_trigger: bool,
    pub source_id: Option<Uuid>,
    pub source_name: Option<String>,
    pub last_run: String,
    pub session: Option<SessionRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpportunityRow {
    pub id: Uuid,
    pub title: String,
    pub category: String,
    pub categories: Vec<String>,
    pub status: String,
    pub open: bool,
    pub deadline: DeadlineUrgency,
    pub deadline_bucket: DeadlineBucket,
    pub published: String,
    pub discovered: String,
    pub host: String,
    pub source_url: String,
    pub location: String,
    pub requires_prequalification: bool,
    pub is_discretionary: bool,
    pub relevance_percent: Option<u8>,
    pub estimated_value: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceRow {
    pub id: Uuid,
    pub name: String,
    pub badge: &'static str,
    pub severity: Severity,
    pub location: String,
    pub host: String,
    pub last_crawl: String,
    pub last_success: String,
    pub last_error: Option<String>,
    pub total_found: u64,
    pub latest_session: Option<DisplayStatus>,
    pub can_trigger: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionRow {
    pub id: Uuid,
    pub source_id: Uuid,
    pub source_name: String,
    pub status: DisplayStatus,
    pub created: String,
    pub duration: Option<String>,
    pub pages_crawled: u32,
    pub opportunities_found: u32,
    pub opportunities_new: u32,
    pub opportunities_updated: u32,
    pub errors_count: u32,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub generated_at: DateTime<Utc>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub banner: Option<String>,
    pub crawl: CrawlPanel,
    pub stats: DashboardStats,
    pub opportunities: Page<OpportunityRow>,
    pub sources: Vec<SourceRow>,
    pub sessions: Vec<SessionRow>,
}

impl DashboardView {
    /// Nothing fetched yet: neutral panel, trigger disabled, optional banner.
    pub fn empty(now: DateTime<Utc>, page_size: u32, banner: Option<String>) -> Self {
        Self {
            generated_at: now,
            fetched_at: None,
            banner,
            crawl: CrawlPanel {
                status: rfpscan_core::resolve_display_status(None, now),
                active: false,
                can_trigger: false,
                source_id: None,
                source_name: None,
                last_run: relative_time(None, now),
                session: None,
            },
            stats: DashboardStats::default(),
            opportunities: Page::empty(page_size),
            sources: Vec::new(),
            sessions: Vec::new(),
        }
    }
}

/// One pure pass over a snapshot. `pending` holds just-triggered sessions,
/// keyed by source, that the backend may not list yet.
pub fn resolve(
    snapshot: &Snapshot,
    pending: &HashMap<Uuid, CrawlSession>,
    policy: &LivenessPolicy,
    now: DateTime<Utc>,
) -> DashboardView {
    let source_names: HashMap<Uuid, &str> = snapshot
        .sources
        .items
        .iter()
        .map(|s| (s.id, s.name.as_str()))
        .collect();

    let newest_pending = pending.values().max_by_key(|s| s.created_at.parse());
    let current = newest(snapshot.latest_session(), newest_pending);
    let primary = snapshot.primary_source();
    let crawl = CrawlPanel {
        status: policy.display_status(current, now),
        active: policy.is_active(current, now),
        can_trigger: policy.can_trigger_crawl(
            current,
            primary.is_some_and(|s| s.is_enabled),
            now,
        ),
        source_id: primary.map(|s| s.id),
        source_name: primary.map(|s| s.name.clone()),
        last_run: relative_time(current.map(|s| &s.created_at), now),
        session: current.map(|s| session_row(s, &source_names, policy, now)),
    };

    let mut latest_by_source: HashMap<Uuid, &CrawlSession> = HashMap::new();
    for session in &snapshot.sessions.items {
        latest_by_source.entry(session.source_id).or_insert(session);
    }
    for (source_id, local) in pending {
        let listed = latest_by_source.get(source_id).copied();
        if let Some(latest) = newest(listed, Some(local)) {
            latest_by_source.insert(*source_id, latest);
        }
    }

    let sources = snapshot
        .sources
        .items
        .iter()
        .map(|source| {
            let latest = latest_by_source.get(&source.id).copied();
            source_row(source, latest, policy, now)
        })
        .collect();

    let sessions = snapshot
        .sessions
        .items
        .iter()
        .map(|s| session_row(s, &source_names, policy, now))
        .collect();

    DashboardView {
        generated_at: now,
        fetched_at: Some(snapshot.fetched_at),
        banner: None,
        crawl,
        stats: snapshot.stats.clone(),
        opportunities: snapshot
            .opportunities
            .clone()
            .map(|opp| opportunity_row(&opp, now)),
        sources,
        sessions,
    }
}

/// Whichever session was created later; an unparseable `created_at` loses.
pub(crate) fn newest<'a>(
    listed: Option<&'a CrawlSession>,
    pending_override: Option<&'a CrawlSession>,
) -> Option<&'a CrawlSession> {
    match (listed, pending_override) {
        (Some(listed), Some(local)) => {
            let listed_at = listed.created_at.parse();
            let local_at = local.created_at.parse();
            if listed.id == local.id || listed_at >= local_at {
                Some(listed)
            } else {
                Some(local)
            }
        }
        (listed, local) => listed.or(local),
    }
}

pub fn opportunity_row(opp: &Opportunity, now: DateTime<Utc>) -> OpportunityRow {
    let primary = primary_category(opp);
    OpportunityRow {
        id: opp.id,
        title: opp.title.clone(),
        category: category_label(primary.map(|c| c.as_str())).into_owned(),
        categories: opp.categories.iter().map(|c| c.label().to_string()).collect(),
        status: opp.status.to_string(),
        open: opp.is_open(),
        deadline: deadline_urgency(opp.submission_deadline.as_ref(), now),
        deadline_bucket: deadline_bucket(opp.submission_deadline.as_ref(), now),
        published: relative_time(opp.published_date.as_ref(), now),
        discovered: relative_time(Some(&opp.created_at), now),
        host: display_host(&opp.source_url),
        source_url: opp.source_url.clone(),
        location: location(opp.state_code.as_deref(), opp.county.as_deref()),
        requires_prequalification: opp.requires_prequalification,
        is_discretionary: opp.is_discretionary,
        relevance_percent: opp
            .relevance_score
            .map(|score| (score.clamp(0.0, 1.0) * 100.0).round() as u8),
        estimated_value: opp
            .estimated_value
            .map(|value| format_amount(value, opp.currency.as_deref())),
    }
}

fn source_row(
    source: &CrawlSource,
    latest: Option<&CrawlSession>,
    policy: &LivenessPolicy,
    now: DateTime<Utc>,
) -> SourceRow {
    let (badge, severity) = resolve_source_status(source);
    SourceRow {
        id: source.id,
        name: source.name.clone(),
        badge,
        severity,
        location: location(source.state_code.as_deref(), source.county.as_deref()),
        host: display_host(&source.base_url),
        last_crawl: relative_time(source.last_crawl_at.as_ref(), now),
        last_success: relative_time(source.last_success_at.as_ref(), now),
        last_error: source.last_error_message.clone(),
        total_found: source.total_opportunities_found,
        latest_session: latest.map(|s| policy.display_status(Some(s), now)),
        can_trigger: source.is_enabled && policy.can_trigger_crawl(latest, true, now),
    }
}

fn session_row(
    session: &CrawlSession,
    source_names: &HashMap<Uuid, &str>,
    policy: &LivenessPolicy,
    now: DateTime<Utc>,
) -> SessionRow {
    SessionRow {
        id: session.id,
        source_id: session.source_id,
        source_name: source_names
            .get(&session.source_id)
            .map(|name| name.to_string())
            .unwrap_or_else(|| session.source_id.to_string()),
        status: policy.display_status(Some(session), now),
        created: relative_time(Some(&session.created_at), now),
        duration: session
            .duration()
            .map(|d| RelativeDuration::from_delta(d).to_string()),
        pages_crawled: session.pages_crawled,
        opportunities_found: session.opportunities_found,
        opportunities_new: session.opportunities_new,
        opportunities_updated: session.opportunities_updated,
        errors_count: session.errors_count,
        last_error: session.last_error_message.clone(),
    }
}

fn location(state_code: Option<&str>, county: Option<&str>) -> String {
    match (state_code.map(str::trim), county.map(str::trim)) {
        (Some(state), Some(county)) if !county.is_empty() => format!("{county}, {state}"),
        (Some(state), _) => state.to_string(),
        (None, Some(county)) => county.to_string(),
        (None, None) => String::new(),
    }
}

/// "$1.5M", "$250K", "€900". Unknown currencies are suffixed with their code.
pub fn format_amount(value: f64, currency: Option<&str>) -> String {
    let code = currency.map(str::trim).unwrap_or("USD").to_ascii_uppercase();
    let symbol = match code.as_str() {
        "USD" | "" => Some("$"),
        "EUR" => Some("€"),
        "GBP" => Some("£"),
        "CAD" => Some("CA$"),
        _ => None,
    };
    let abs = value.abs();
    let sign = if value < 0.0 { "-" } else { "" };
    let compact = if abs >= 1_000_000_000.0 {
        format!("{:.1}B", abs / 1_000_000_000.0)
    } else if abs >= 1_000_000.0 {
        format!("{:.1}M", abs / 1_000_000.0)
    } else if abs >= 1_000.0 {
        format!("{:.0}K", abs / 1_000.0)
    } else {
        format!("{abs:.0}")
    };
    let compact = compact.replace(".0M", "M").replace(".0B", "B");
    match symbol {
        Some(symbol) => format!("{sign}{symbol}{compact}"),
        None => format!("{sign}{compact} {code}"),
    }
}
