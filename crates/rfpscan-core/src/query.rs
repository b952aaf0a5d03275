//! Filters and sort order for the opportunities listing.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classification::Category;
use crate::model::OpportunityStatus;

pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    CreatedAt,
    Deadline,
    Relevance,
    Title,
}

impl SortBy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::Deadline => "deadline",
            Self::Relevance => "relevance",
            Self::Title => "title",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityQuery {
    pub page: u32,
    pub page_size: u32,
    pub search: Option<String>,
    pub categories: Vec<Category>,
    pub statuses: Vec<OpportunityStatus>,
    pub state_codes: Vec<String>,
    pub requires_prequalification: Option<bool>,
    pub is_discretionary: Option<bool>,
    pub deadline_after: Option<DateTime<Utc>>,
    pub deadline_before: Option<DateTime<Utc>>,
    pub source_id: Option<Uuid>,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
}

impl Default for OpportunityQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            search: None,
            categories: Vec::new(),
            statuses: Vec::new(),
            state_codes: Vec::new(),
            requires_prequalification: None,
            is_discretionary: None,
            deadline_after: None,
            deadline_before: None,
            source_id: None,
            sort_by: SortBy::default(),
            sort_order: SortOrder::default(),
        }
    }
}

impl OpportunityQuery {
    pub fn page(mut self, page: u32, page_size: u32) -> Self {
        self.page = page.max(1);
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.search = (!text.trim().is_empty()).then_some(text);
        self
    }

    pub fn sorted(mut self, by: SortBy, order: SortOrder) -> Self {
        self.sort_by = by;
        self.sort_order = order;
        self
    }

    /// Query-string pairs; list filters repeat their key once per value.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("page", self.page.max(1).to_string()),
            ("page_size", self.page_size.clamp(1, MAX_PAGE_SIZE).to_string()),
            ("sort_by", self.sort_by.as_str().to_string()),
            ("sort_order", self.sort_order.as_str().to_string()),
        ];
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            pairs.push(("search", search.to_string()));
        }
        pairs.extend(self.categories.iter().map(|c| ("categories", c.as_str().to_string())));
        pairs.extend(self.statuses.iter().map(|s| ("status", s.as_str().to_string())));
        pairs.extend(
            self.state_codes
                .iter()
                .map(|code| ("state_codes", code.trim().to_ascii_uppercase())),
        );
        if let Some(flag) = self.requires_prequalification {
            pairs.push(("requires_prequalification", flag.to_string()));
        }
        if let Some(flag) = self.is_discretionary {
            pairs.push(("is_discretionary", flag.to_string()));
        }
        if let Some(after) = self.deadline_after {
            pairs.push(("deadline_after", after.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        if let Some(before) = self.deadline_before {
            pairs.push(("deadline_before", before.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        if let Some(source_id) = self.source_id {
            pairs.push(("source_id", source_id.to_string()));
        }
        pairs
    }
}
