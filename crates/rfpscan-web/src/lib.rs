//! Axum + Askama operator dashboard for RFPScan.

use std::sync::Arc;

use anyhow::Context;
use askama::Template;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use rfpscan_client::{TriggerResponse, Url};
use rfpscan_core::{Category, OpportunityQuery, OpportunityStatus, Page, SortBy, SortOrder};
use rfpscan_dashboard::{
    opportunity_row, AutoRefresh, Dashboard, DashboardConfig, DashboardError, DashboardView,
    OpportunityRow, SessionRow, SourceRow,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub dashboard: Arc<Dashboard>,
}

impl AppState {
    pub fn new(dashboard: Arc<Dashboard>) -> Self {
        Self { dashboard }
    }

    fn backend_url(&self) -> String {
        self.dashboard.config().backend_url()
    }
}

#[derive(Debug, Deserialize, Default)]
struct OpportunitiesParams {
    page: Option<u32>,
    search: Option<String>,
    category: Option<String>,
    status: Option<String>,
    state: Option<String>,
    source: Option<String>,
    sort_by: Option<String>,
    sort_order: Option<String>,
}

impl OpportunitiesParams {
    fn to_query(&self, page_size: u32) -> OpportunityQuery {
        let mut query = OpportunityQuery::default()
            .page(self.page.unwrap_or(1), page_size)
            .search(self.search.clone().unwrap_or_default())
            .sorted(
                parse_sort_by(non_blank(&self.sort_by)),
                parse_sort_order(non_blank(&self.sort_order)),
            );
        query.categories = non_blank(&self.category).map(Category::from).into_iter().collect();
        query.statuses = non_blank(&self.status)
            .map(OpportunityStatus::from)
            .into_iter()
            .collect();
        query.state_codes = non_blank(&self.state).map(str::to_string).into_iter().collect();
        query.source_id = non_blank(&self.source).and_then(|raw| Uuid::parse_str(raw).ok());
        query
    }

    /// Same filters, different page.
    fn link(&self, page: u32) -> String {
        let mut pairs = vec![("page", page.to_string())];
        for (key, value) in [
            ("search", &self.search),
            ("category", &self.category),
            ("status", &self.status),
            ("state", &self.state),
            ("source", &self.source),
            ("sort_by", &self.sort_by),
            ("sort_order", &self.sort_order),
        ] {
            if let Some(value) = non_blank(value) {
                pairs.push((key, value.to_string()));
            }
        }
        match Url::parse_with_params("http://dashboard.local/opportunities", &pairs) {
            Ok(url) => format!("{}?{}", url.path(), url.query().unwrap_or_default()),
            Err(_) => format!("/opportunities?page={page}"),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_sort_by(raw: Option<&str>) -> SortBy {
    match raw {
        Some("deadline") => SortBy::Deadline,
        Some("relevance") => SortBy::Relevance,
        Some("title") => SortBy::Title,
        _ => SortBy::CreatedAt,
    }
}

fn parse_sort_order(raw: Option<&str>) -> SortOrder {
    match raw {
        Some("asc") => SortOrder::Asc,
        _ => SortOrder::Desc,
    }
}

#[derive(Debug, Clone)]
struct SelectOption {
    value: String,
    label: String,
    selected: bool,
}

#[derive(Debug, Clone, Default)]
struct FilterForm {
    search: String,
    state: String,
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    view: DashboardView,
    banner: String,
    source_name: String,
    generated_at: String,
    rows: Vec<OpportunityRow>,
}

impl IndexTemplate {
    fn new(view: DashboardView) -> Self {
        Self {
            banner: view.banner.clone().unwrap_or_default(),
            source_name: view
                .crawl
                .source_name
                .clone()
                .unwrap_or_else(|| "none configured".to_string()),
            generated_at: view.generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            rows: view.opportunities.items.clone(),
            view,
        }
    }
}

#[derive(Template)]
#[template(path = "opportunities.html")]
struct OpportunitiesTemplate {
    banner: String,
    filters: FilterForm,
    categories: Vec<SelectOption>,
    sorts: Vec<SelectOption>,
    rows: Vec<OpportunityRow>,
    total: u64,
    page: u32,
    total_pages: u32,
    prev_link: String,
    next_link: String,
}

#[derive(Template)]
#[template(path = "sources.html")]
struct SourcesTemplate {
    banner: String,
    sources: Vec<SourceRow>,
}

#[derive(Template)]
#[template(path = "sessions.html")]
struct SessionsTemplate {
    banner: String,
    sessions: Vec<SessionRow>,
}

#[derive(Template)]
#[template(path = "error.html")]
struct ErrorTemplate {
    heading: String,
    message: String,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/opportunities", get(opportunities_handler))
        .route("/sources", get(sources_handler))
        .route("/sessions", get(sessions_handler))
        .route("/crawl", post(trigger_primary_handler))
        .route("/crawl/{source_id}", post(trigger_source_handler))
        .route("/refresh", post(refresh_handler))
        .route("/api/view", get(api_view_handler))
        .with_state(state)
}

/// Serves the dashboard with auto refresh until Ctrl-C.
pub async fn serve(dashboard: Arc<Dashboard>, port: u16) -> anyhow::Result<()> {
    // A failed first fetch still serves the page, with the banner set.
    let _ = dashboard.refresh().await;
    let refresher = AutoRefresh::start(Arc::clone(&dashboard)).await?;
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding dashboard port {port}"))?;
    info!(port, "dashboard listening");
    let served = axum::serve(listener, app(AppState::new(dashboard)))
        .with_graceful_shutdown(shutdown_signal())
        .await;
    refresher.shutdown().await?;
    served.context("serving dashboard")
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let config = DashboardConfig::from_env().context("loading dashboard config")?;
    let port = config.web_port;
    let dashboard = Arc::new(Dashboard::connect(config)?);
    serve(dashboard, port).await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "cannot listen for ctrl-c; serving until killed");
        std::future::pending::<()>().await;
    }
}

async fn index_handler(State(state): State<AppState>) -> Response {
    let view = state.dashboard.view_at(Utc::now()).await;
    render_html(IndexTemplate::new(view))
}

async fn opportunities_handler(
    State(state): State<AppState>,
    Query(params): Query<OpportunitiesParams>,
) -> Response {
    let now = Utc::now();
    let query = params.to_query(state.dashboard.config().page_size);
    let (page, banner) = match state.dashboard.backend().list_opportunities(&query).await {
        Ok(page) => (page.map(|opp| opportunity_row(&opp, now)), String::new()),
        Err(err) => {
            warn!(error = %err, "opportunity listing failed");
            (Page::empty(query.page_size), err.banner(&state.backend_url()))
        }
    };

    let selected_category = query.categories.first();
    let categories = Category::KNOWN
        .iter()
        .map(|category| SelectOption {
            value: category.as_str().to_string(),
            label: category.label().to_string(),
            selected: selected_category == Some(category),
        })
        .collect();
    let sorts = [
        (SortBy::CreatedAt, "Newest"),
        (SortBy::Deadline, "Deadline"),
        (SortBy::Relevance, "Relevance"),
        (SortBy::Title, "Title"),
    ]
    .into_iter()
    .map(|(sort, label)| SelectOption {
        value: sort.as_str().to_string(),
        label: label.to_string(),
        selected: sort == query.sort_by,
    })
    .collect();

    render_html(OpportunitiesTemplate {
        banner,
        filters: FilterForm {
            search: query.search.clone().unwrap_or_default(),
            state: query.state_codes.first().cloned().unwrap_or_default(),
        },
        categories,
        sorts,
        prev_link: if page.has_previous {
            params.link(page.page - 1)
        } else {
            String::new()
        },
        next_link: if page.has_next {
            params.link(page.page + 1)
        } else {
            String::new()
        },
        total: page.total,
        page: page.page,
        total_pages: page.total_pages.max(1),
        rows: page.items,
    })
}

async fn sources_handler(State(state): State<AppState>) -> Response {
    let view = state.dashboard.view_at(Utc::now()).await;
    render_html(SourcesTemplate {
        banner: view.banner.unwrap_or_default(),
        sources: view.sources,
    })
}

async fn sessions_handler(State(state): State<AppState>) -> Response {
    let view = state.dashboard.view_at(Utc::now()).await;
    render_html(SessionsTemplate {
        banner: view.banner.unwrap_or_default(),
        sessions: view.sessions,
    })
}

async fn trigger_primary_handler(State(state): State<AppState>) -> Response {
    let result = state.dashboard.trigger_crawl(None, Utc::now()).await;
    trigger_outcome(&state, result)
}

async fn trigger_source_handler(
    State(state): State<AppState>,
    Path(source_id): Path<Uuid>,
) -> Response {
    let result = state.dashboard.trigger_crawl(Some(source_id), Utc::now()).await;
    trigger_outcome(&state, result)
}

fn trigger_outcome(state: &AppState, result: Result<TriggerResponse, DashboardError>) -> Response {
    match result {
        Ok(_) => Redirect::to("/").into_response(),
        Err(DashboardError::Backend(err)) => error_page(
            StatusCode::BAD_GATEWAY,
            "Crawl not started",
            err.banner(&state.backend_url()),
        ),
        Err(err @ DashboardError::CrawlInProgress(_)) => {
            error_page(StatusCode::CONFLICT, "Crawl already running", err.to_string())
        }
        Err(err @ DashboardError::NoSource) => {
            error_page(StatusCode::NOT_FOUND, "Crawl not started", err.to_string())
        }
        Err(err @ DashboardError::SourceDisabled(_)) => error_page(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Crawl not started",
            err.to_string(),
        ),
    }
}

async fn refresh_handler(State(state): State<AppState>) -> Response {
    // Failures surface as the banner on the page we redirect to.
    let _ = state.dashboard.refresh().await;
    Redirect::to("/").into_response()
}

async fn api_view_handler(State(state): State<AppState>) -> Json<DashboardView> {
    Json(state.dashboard.view_at(Utc::now()).await)
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => server_error(anyhow::anyhow!(err.to_string())),
    }
}

fn error_page(status: StatusCode, heading: &str, message: String) -> Response {
    let tpl = ErrorTemplate {
        heading: heading.to_string(),
        message,
    };
    match tpl.render() {
        Ok(html) => (status, Html(html)).into_response(),
        Err(err) => server_error(anyhow::anyhow!(err.to_string())),
    }
}

fn server_error(err: anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!("Server error: {}", err)),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use rfpscan_client::{ApiError, DashboardBackend};
    use rfpscan_core::{
        CrawlSession, CrawlSource, DashboardStats, Opportunity, SessionStatus, Timestamp,
    };
    use serde_json::json;
    use tower::ServiceExt;

    #[derive(Default)]
    struct FakeBackend {
        sources: Vec<CrawlSource>,
        opportunities: Vec<Opportunity>,
        sessions: Mutex<Vec<CrawlSession>>,
        last_query: Mutex<Option<OpportunityQuery>>,
        down: bool,
    }

    impl FakeBackend {
        fn up_or_down(&self) -> Result<(), ApiError> {
            if self.down {
                return Err(ApiError::HttpStatus {
                    status: 502,
                    url: "http://fake/api/v1".into(),
                    detail: None,
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl DashboardBackend for FakeBackend {
        async fn dashboard_stats(&self) -> Result<DashboardStats, ApiError> {
            self.up_or_down()?;
            Ok(DashboardStats {
                total_opportunities: self.opportunities.len() as u64,
                ..Default::default()
            })
        }

        async fn list_opportunities(
            &self,
            query: &OpportunityQuery,
        ) -> Result<Page<Opportunity>, ApiError> {
            self.up_or_down()?;
            *self.last_query.lock().unwrap() = Some(query.clone());
            let total = self.opportunities.len() as u64;
            Ok(Page::new(self.opportunities.clone(), total, query.page, query.page_size))
        }

        async fn list_sessions(
            &self,
            page: u32,
            page_size: u32,
        ) -> Result<Page<CrawlSession>, ApiError> {
            self.up_or_down()?;
            let sessions = self.sessions.lock().unwrap().clone();
            let total = sessions.len() as u64;
            Ok(Page::new(sessions, total, page, page_size))
        }

        async fn list_sources(
            &self,
            page: u32,
            page_size: u32,
        ) -> Result<Page<CrawlSource>, ApiError> {
            self.up_or_down()?;
            let total = self.sources.len() as u64;
            Ok(Page::new(self.sources.clone(), total, page, page_size))
        }

        async fn list_sessions_for_source(
            &self,
            source_id: Uuid,
            page: u32,
            page_size: u32,
        ) -> Result<Page<CrawlSession>, ApiError> {
            self.up_or_down()?;
            let sessions: Vec<CrawlSession> = self
                .sessions
                .lock()
                .unwrap()
                .iter()
                .filter(|s| s.source_id == source_id)
                .cloned()
                .collect();
            let total = sessions.len() as u64;
            let items = sessions.into_iter().take(page_size as usize).collect();
            Ok(Page::new(items, total, page, page_size))
        }

        async fn trigger_crawl(&self, source_id: Uuid) -> Result<TriggerResponse, ApiError> {
            self.up_or_down()?;
            let session: CrawlSession = serde_json::from_value(json!({
                "id": Uuid::new_v4(),
                "source_id": source_id,
                "status": "pending",
                "created_at": Timestamp::from_datetime(Utc::now()),
            }))
            .unwrap();
            let response = TriggerResponse {
                session_id: session.id,
                source_id,
                source_name: "Texas SmartBuy".into(),
                status: SessionStatus::Pending,
                message: None,
            };
            self.sessions.lock().unwrap().insert(0, session);
            Ok(response)
        }
    }

    fn seeded_backend() -> FakeBackend {
        let source_id = Uuid::new_v4();
        FakeBackend {
            sources: vec![serde_json::from_value(json!({
                "id": source_id,
                "name": "Texas SmartBuy",
                "source_type": "government_portal",
                "state_code": "TX",
                "base_url": "https://www.txsmartbuy.com",
                "is_enabled": true,
                "status": "active",
                "priority": 3
            }))
            .unwrap()],
            opportunities: vec![serde_json::from_value(json!({
                "id": Uuid::new_v4(),
                "source_id": source_id,
                "title": "Statewide ERP modernization",
                "categories": ["erp", "cloud"],
                "source_url": "https://www.txsmartbuy.com/esbd/123",
                "state_code": "TX",
                "estimated_value": "2500000",
                "created_at": "2025-03-01T09:00:00Z"
            }))
            .unwrap()],
            ..Default::default()
        }
    }

    async fn test_app(backend: FakeBackend) -> (Router, Arc<FakeBackend>) {
        let backend = Arc::new(backend);
        let config = DashboardConfig {
            post_trigger_refresh_secs: 3600,
            ..Default::default()
        };
        let dashboard = Arc::new(Dashboard::new(backend.clone(), config));
        let _ = dashboard.refresh().await;
        (app(AppState::new(dashboard)), backend)
    }

    async fn body_text(resp: Response) -> String {
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(body.to_vec()).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post(uri: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn index_renders_panel_and_opportunities() {
        let (app, _backend) = test_app(seeded_backend()).await;
        let resp = app.oneshot(get("/")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let text = body_text(resp).await;
        assert!(text.contains("RFPScan Dashboard"));
        assert!(text.contains("Statewide ERP modernization"));
        assert!(text.contains(">ERP<"));
        assert!(text.contains(">Ready<"));
        assert!(text.contains("$2.5M"));
        assert!(text.contains(r#"<button type="submit">Start crawl</button>"#));
    }

    #[tokio::test]
    async fn trigger_disables_button_until_pending_goes_stale() {
        let (app, _backend) = test_app(seeded_backend()).await;

        let resp = app.clone().oneshot(post("/crawl")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[header::LOCATION], "/");

        let resp = app.clone().oneshot(get("/api/view")).await.unwrap();
        let view: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(view["crawl"]["status"]["label"], "Pending");
        assert_eq!(view["crawl"]["status"]["severity"], "warning");
        assert_eq!(view["crawl"]["can_trigger"], false);

        let again = app.clone().oneshot(post("/crawl")).await.unwrap();
        assert_eq!(again.status(), StatusCode::CONFLICT);

        let page = body_text(app.oneshot(get("/")).await.unwrap()).await;
        assert!(page.contains("disabled>Start crawl"));
    }

    #[tokio::test]
    async fn opportunity_filters_reach_the_backend() {
        let (app, backend) = test_app(seeded_backend()).await;
        let resp = app
            .oneshot(get(
                "/opportunities?search=cloud&category=AI&state=ca&page=2&sort_by=deadline&source=",
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let text = body_text(resp).await;
        assert!(text.contains("Previous"));

        let query = backend.last_query.lock().unwrap().clone().unwrap();
        assert_eq!(query.page, 2);
        assert_eq!(query.search.as_deref(), Some("cloud"));
        assert_eq!(query.categories, vec![Category::Ai]);
        assert_eq!(query.state_codes, vec!["ca".to_string()]);
        assert_eq!(query.sort_by, SortBy::Deadline);
        assert_eq!(query.source_id, None);
    }

    #[tokio::test]
    async fn unreachable_backend_shows_banner() {
        let backend = FakeBackend {
            down: true,
            ..seeded_backend()
        };
        let (app, _backend) = test_app(backend).await;

        let resp = app.clone().oneshot(post("/refresh")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);

        let text = body_text(app.clone().oneshot(get("/")).await.unwrap()).await;
        assert!(text.contains("Unable to reach the backend API"));
        assert!(text.contains("disabled>Start crawl"));

        let listing = body_text(app.oneshot(get("/opportunities")).await.unwrap()).await;
        assert!(listing.contains("Unable to reach the backend API"));
        assert!(listing.contains("No opportunities found."));
    }

    #[tokio::test]
    async fn sources_and_sessions_pages_render() {
        let (app, _backend) = test_app(seeded_backend()).await;
        let sources = body_text(app.clone().oneshot(get("/sources")).await.unwrap()).await;
        assert!(sources.contains("Texas SmartBuy"));
        assert!(sources.contains(">Enabled<"));
        assert!(sources.contains("txsmartbuy.com"));

        let resp = app.oneshot(get("/sessions")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn disabled_source_is_not_crawled() {
        let mut backend = seeded_backend();
        backend.sources[0].is_enabled = false;
        let source_id = backend.sources[0].id;
        let (app, backend) = test_app(backend).await;

        let page = body_text(app.clone().oneshot(get("/")).await.unwrap()).await;
        assert!(page.contains("disabled>Start crawl"));

        let resp = app
            .oneshot(post(&format!("/crawl/{source_id}")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body_text(resp).await.contains("is disabled"));
        assert!(backend.sessions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn trigger_rejects_malformed_source_id() {
        let (app, _backend) = test_app(seeded_backend()).await;
        let resp = app.oneshot(post("/crawl/not-a-uuid")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
