//! Primary category, category labels and deadline urgency for opportunities.

use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{wire_enum, Opportunity, Timestamp};
use crate::timefmt::{RelativeDuration, TimeUnit};

wire_enum! {
    /// Technology category assigned by the classification pipeline.
    pub enum Category {
        Dynamics => "dynamics",
        Ai => "ai",
        Iot => "iot",
        Erp => "erp",
        StaffAugmentation => "staff_augmentation",
        Cloud => "cloud",
        Cybersecurity => "cybersecurity",
        DataAnalytics => "data_analytics",
        Other => "other",
    }
}

impl Category {
    /// Short operator label. Unrecognized codes are shown verbatim.
    pub fn label(&self) -> &str {
        match self {
            Self::Dynamics => "Dynamics 365",
            Self::Ai => "AI/ML",
            Self::Iot => "IoT",
            Self::Erp => "ERP",
            Self::StaffAugmentation => "Staff Aug",
            Self::Cloud => "Cloud",
            Self::Cybersecurity => "Cybersecurity",
            Self::DataAnalytics => "Analytics",
            Self::Other => "Other",
            Self::Unrecognized(raw) if raw.trim().is_empty() => "Other",
            Self::Unrecognized(raw) => raw.as_str(),
        }
    }
}

/// First of `categories`, falling back to the legacy `category` field.
pub fn primary_category(opportunity: &Opportunity) -> Option<&Category> {
    opportunity
        .categories
        .first()
        .or(opportunity.category.as_ref())
}

/// Label for a raw category code; case-insensitive, `None` reads as "Other".
pub fn category_label(code: Option<&str>) -> Cow<'_, str> {
    let Some(code) = code else {
        return Cow::Borrowed("Other");
    };
    match Category::from(code) {
        Category::Unrecognized(_) if !code.trim().is_empty() => Cow::Borrowed(code),
        known => Cow::Owned(known.label().to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeadlineUrgency {
    pub text: String,
    pub urgent: bool,
}

impl DeadlineUrgency {
    fn new(text: impl Into<String>, urgent: bool) -> Self {
        Self {
            text: text.into(),
            urgent,
        }
    }
}

impl fmt::Display for DeadlineUrgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Anything due within days (or sooner) is urgent; weeks and beyond are not.
pub fn deadline_urgency(deadline: Option<&Timestamp>, now: DateTime<Utc>) -> DeadlineUrgency {
    let Some(deadline) = deadline else {
        return DeadlineUrgency::new("No deadline", false);
    };
    let Some(due) = deadline.parse() else {
        return DeadlineUrgency::new("Invalid date", false);
    };
    if due < now {
        return DeadlineUrgency::new("Expired", true);
    }
    let span = RelativeDuration::from_delta(due - now);
    DeadlineUrgency::new(format!("in {span}"), span.unit <= TimeUnit::Days)
}

/// Deadline windows matching the backend's dashboard counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadlineBucket {
    NoDeadline,
    Expired,
    ThisWeek,
    NextWeek,
    Later,
}

/// Unparseable deadlines land in `NoDeadline`.
pub fn deadline_bucket(deadline: Option<&Timestamp>, now: DateTime<Utc>) -> DeadlineBucket {
    let Some(due) = deadline.and_then(Timestamp::parse) else {
        return DeadlineBucket::NoDeadline;
    };
    if due < now {
        DeadlineBucket::Expired
    } else if due <= now + TimeDelta::days(7) {
        DeadlineBucket::ThisWeek
    } else if due <= now + TimeDelta::days(14) {
        DeadlineBucket::NextWeek
    } else {
        DeadlineBucket::Later
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OpportunityStatus;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).single().unwrap()
    }

    fn opportunity(category: Option<&str>, categories: &[&str]) -> Opportunity {
        Opportunity {
            id: Uuid::new_v4(),
            source_id: Uuid::new_v4(),
            external_id: None,
            title: "Cloud migration services".into(),
            description: None,
            summary: None,
            department: None,
            category: category.map(Category::from),
            categories: categories.iter().copied().map(Category::from).collect(),
            source_url: "https://caleprocure.ca.gov/event/123".into(),
            state_code: Some("CA".into()),
            county: None,
            city: None,
            published_date: None,
            submission_deadline: None,
            prequalification_deadline: None,
            estimated_value: None,
            currency: None,
            contact_info: None,
            requires_prequalification: false,
            is_discretionary: false,
            status: OpportunityStatus::New,
            relevance_score: None,
            notes: None,
            created_at: Timestamp::from_datetime(now()),
            updated_at: None,
        }
    }

    #[test]
    fn primary_category_prefers_the_multi_label_list() {
        let opp = opportunity(Some("cloud"), &["ai", "erp"]);
        assert_eq!(primary_category(&opp), Some(&Category::Ai));
        assert_eq!(primary_category(&opp), primary_category(&opp));

        let legacy = opportunity(Some("iot"), &[]);
        assert_eq!(primary_category(&legacy), Some(&Category::Iot));

        let bare = opportunity(None, &[]);
        assert_eq!(primary_category(&bare), None);
    }

    #[test]
    fn labels_are_case_insensitive_and_pass_unknowns_through() {
        assert_eq!(category_label(Some("DYNAMICS")), "Dynamics 365");
        assert_eq!(category_label(Some("dynamics")), "Dynamics 365");
        assert_eq!(category_label(Some("Staff_Augmentation")), "Staff Aug");
        assert_eq!(category_label(Some("data_analytics")), "Analytics");
        assert_eq!(category_label(Some("quantum")), "quantum");
        assert_eq!(category_label(None), "Other");
        assert_eq!(Category::from("blockchain").label(), "blockchain");
    }

    #[test]
    fn urgency_for_missing_and_malformed_deadlines() {
        assert_eq!(
            deadline_urgency(None, now()),
            DeadlineUrgency::new("No deadline", false)
        );
        assert_eq!(
            deadline_urgency(Some(&Timestamp::new("31/02/2025")), now()),
            DeadlineUrgency::new("Invalid date", false)
        );
    }

    #[test]
    fn urgency_tracks_distance_to_deadline() {
        let in_three_hours = Timestamp::from_datetime(now() + TimeDelta::hours(3));
        assert_eq!(
            deadline_urgency(Some(&in_three_hours), now()),
            DeadlineUrgency::new("in 3 hours", true)
        );

        let in_ten_days = Timestamp::from_datetime(now() + TimeDelta::days(10));
        let far = deadline_urgency(Some(&in_ten_days), now());
        assert!(!far.urgent);
        assert_eq!(far.text, "in 1 week");

        let in_five_days = Timestamp::from_datetime(now() + TimeDelta::days(5));
        assert!(deadline_urgency(Some(&in_five_days), now()).urgent);

        let an_hour_ago = Timestamp::from_datetime(now() - TimeDelta::hours(1));
        assert_eq!(
            deadline_urgency(Some(&an_hour_ago), now()),
            DeadlineUrgency::new("Expired", true)
        );
    }

    #[test]
    fn deadline_exactly_now_is_not_expired() {
        let due_now = Timestamp::from_datetime(now());
        let urgency = deadline_urgency(Some(&due_now), now());
        assert_eq!(urgency.text, "in less than a minute");
        assert!(urgency.urgent);
    }

    #[test]
    fn buckets_follow_backend_windows() {
        let at = |delta: TimeDelta| Timestamp::from_datetime(now() + delta);
        assert_eq!(deadline_bucket(None, now()), DeadlineBucket::NoDeadline);
        assert_eq!(
            deadline_bucket(Some(&Timestamp::new("tbd")), now()),
            DeadlineBucket::NoDeadline
        );
        assert_eq!(
            deadline_bucket(Some(&at(TimeDelta::hours(-2))), now()),
            DeadlineBucket::Expired
        );
        assert_eq!(deadline_bucket(Some(&at(TimeDelta::days(7))), now()), DeadlineBucket::ThisWeek);
        assert_eq!(deadline_bucket(Some(&at(TimeDelta::days(9))), now()), DeadlineBucket::NextWeek);
        assert_eq!(deadline_bucket(Some(&at(TimeDelta::days(30))), now()), DeadlineBucket::Later);
    }
}
