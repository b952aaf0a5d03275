//! Domain model and operator-facing resolvers for the RFPScan dashboard.
//!
//! Everything here is pure: resolvers take already-fetched entities plus the
//! reference time and never read the clock themselves.

pub mod classification;
pub mod model;
pub mod page;
pub mod query;
pub mod session;
pub mod timefmt;

pub use classification::{
    category_label, deadline_bucket, deadline_urgency, primary_category, Category,
    DeadlineBucket, DeadlineUrgency,
};
pub use model::{
    parse_backend_timestamp, ContactInfo, CrawlSession, CrawlSource, DashboardStats,
    LifecycleViolation, Opportunity, OpportunityStatus, SessionStatus, SourceStatus, SourceType,
    Timestamp,
};
pub use page::Page;
pub use query::{OpportunityQuery, SortBy, SortOrder};
pub use session::{
    can_trigger_crawl, is_active, resolve_display_status, resolve_source_status, DisplayState,
    DisplayStatus, LivenessPolicy, Severity,
};
pub use timefmt::{relative_time, RelativeDuration, TimeUnit};
