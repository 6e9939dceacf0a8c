//! Axum + Askama serving layer over the vacancy store.
//!
//! Read-only: every handler is a projection over [`VacancyStore`]. Storage
//! failures never panic a handler; HTML routes render an error page and the
//! JSON routes answer with the `{status: "error", message}` envelope.

use std::sync::Arc;

use askama::Template;
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use jobfeed_core::StoredPosting;
use jobfeed_storage::{StorageError, VacancyFilter, VacancyStore};
use serde::Deserialize;
use tokio::net::TcpListener;

pub const CRATE_NAME: &str = "jobfeed-web";

const UNDISCLOSED_SALARY: &str = "не указана";

#[derive(Clone)]
pub struct AppState {
    pub store: VacancyStore,
}

impl AppState {
    pub fn new(store: VacancyStore) -> Self {
        Self { store }
    }
}

/// Query parameters accepted by the list views, HTML and JSON alike.
#[derive(Debug, Default, Deserialize)]
pub struct VacanciesQuery {
    q: Option<String>,
    location: Option<String>,
    company: Option<String>,
    source: Option<String>,
    salary_min: Option<i64>,
    salary_max: Option<i64>,
    page: Option<usize>,
    per_page: Option<usize>,
    order_by: Option<String>,
    order_direction: Option<String>,
}

impl VacanciesQuery {
    fn to_filter(&self) -> VacancyFilter {
        VacancyFilter {
            query: self.q.clone().unwrap_or_default(),
            location: self.location.clone().unwrap_or_default(),
            company: self.company.clone().unwrap_or_default(),
            source: self.source.clone().unwrap_or_default(),
            salary_min: self.salary_min,
            salary_max: self.salary_max,
            page: self.page.unwrap_or(1),
            per_page: self.per_page.unwrap_or(0),
            order_by: self.order_by.clone().unwrap_or_default(),
            order_direction: self.order_direction.clone().unwrap_or_default(),
        }
    }
}

/// A posting with option-valued fields pre-rendered for the templates.
#[derive(Debug, Clone)]
struct VacancyRow {
    id: i64,
    title: String,
    company: String,
    location: String,
    salary_text: String,
    published_text: String,
    source: String,
    original_url: String,
    description: String,
}

impl From<StoredPosting> for VacancyRow {
    fn from(posting: StoredPosting) -> Self {
        Self {
            id: posting.id,
            title: posting.title,
            company: posting.company,
            location: posting.location,
            salary_text: posting
                .salary
                .unwrap_or_else(|| UNDISCLOSED_SALARY.to_string()),
            published_text: posting.published_at.format("%Y-%m-%d %H:%M").to_string(),
            source: posting.source,
            original_url: posting.original_url,
            description: posting.description,
        }
    }
}

#[derive(Debug, Clone)]
struct SourceOption {
    name: String,
    selected: bool,
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    total: usize,
    sources: Vec<String>,
    locations: Vec<String>,
}

#[derive(Template)]
#[template(path = "vacancies.html")]
struct VacanciesTemplate {
    vacancies: Vec<VacancyRow>,
    total: usize,
    page: usize,
    total_pages: usize,
    q: String,
    location: String,
    company: String,
    sources: Vec<SourceOption>,
    has_prev: bool,
    prev_url: String,
    has_next: bool,
    next_url: String,
}

#[derive(Template)]
#[template(path = "vacancy_detail.html")]
struct VacancyDetailTemplate {
    vacancy: VacancyRow,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/vacancies", get(vacancies_handler))
        .route("/vacancy/{id}", get(vacancy_detail_handler))
        .route("/api/vacancies", get(api_vacancies_handler))
        .route("/api/vacancies/{id}", get(api_vacancy_detail_handler))
        .with_state(Arc::new(state))
}

/// Serve until `shutdown` resolves. Port comes from `JOBFEED_WEB_PORT`.
pub async fn serve_until(
    store: VacancyStore,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let port: u16 = std::env::var("JOBFEED_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "web server listening");
    axum::serve(listener, app(AppState::new(store)))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

pub async fn serve_from_env(store: VacancyStore) -> anyhow::Result<()> {
    serve_until(store, std::future::pending()).await
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Response {
    let data = async {
        let total = state.store.total().await?;
        let sources = state.store.sources().await?;
        let locations = state.store.locations().await?;
        Ok::<_, StorageError>((total, sources, locations))
    }
    .await;
    match data {
        Ok((total, sources, locations)) => render_html(IndexTemplate {
            total,
            sources,
            locations,
        }),
        Err(err) => server_error(err),
    }
}

async fn vacancies_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VacanciesQuery>,
) -> Response {
    let filter = query.to_filter();
    let data = async {
        let total = state.store.count(&filter).await?;
        let rows = state.store.list(&filter).await?;
        let sources = state.store.sources().await?;
        Ok::<_, StorageError>((total, rows, sources))
    }
    .await;
    let (total, rows, sources) = match data {
        Ok(data) => data,
        Err(err) => return server_error(err),
    };

    let page = filter.page();
    let total_pages = total.max(1).div_ceil(filter.per_page());
    let prev_url = if page > 1 {
        page_url(&filter, page - 1)
    } else {
        String::new()
    };
    let next_url = if page < total_pages {
        page_url(&filter, page + 1)
    } else {
        String::new()
    };
    render_html(VacanciesTemplate {
        vacancies: rows.into_iter().map(VacancyRow::from).collect(),
        total,
        page,
        total_pages,
        q: filter.query.clone(),
        location: filter.location.clone(),
        company: filter.company.clone(),
        sources: sources
            .into_iter()
            .map(|name| SourceOption {
                selected: name == filter.source,
                name,
            })
            .collect(),
        has_prev: page > 1,
        prev_url,
        has_next: page < total_pages,
        next_url,
    })
}

async fn vacancy_detail_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i64>,
) -> Response {
    match state.store.get(id).await {
        Ok(Some(posting)) => render_html(VacancyDetailTemplate {
            vacancy: posting.into(),
        }),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Html("Vacancy not found".to_string()),
        )
            .into_response(),
        Err(err) => server_error(err),
    }
}

async fn api_vacancies_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VacanciesQuery>,
) -> Response {
    let filter = query.to_filter();
    let data = async {
        let total = state.store.count(&filter).await?;
        let rows = state.store.list(&filter).await?;
        Ok::<_, StorageError>((total, rows))
    }
    .await;
    match data {
        Ok((total, rows)) => Json(serde_json::json!({
            "status": "success",
            "data": rows,
            "total": total,
        }))
        .into_response(),
        Err(err) => json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

async fn api_vacancy_detail_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i64>,
) -> Response {
    match state.store.get(id).await {
        Ok(Some(posting)) => Json(serde_json::json!({
            "status": "success",
            "data": posting,
        }))
        .into_response(),
        Ok(None) => json_error(StatusCode::NOT_FOUND, "vacancy not found".to_string()),
        Err(err) => json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

/// Pagination link preserving every active filter parameter.
fn page_url(filter: &VacancyFilter, page: usize) -> String {
    let mut url = format!("/vacancies?page={page}");
    for (key, value) in [
        ("q", &filter.query),
        ("location", &filter.location),
        ("company", &filter.company),
        ("source", &filter.source),
        ("order_by", &filter.order_by),
        ("order_direction", &filter.order_direction),
    ] {
        if !value.is_empty() {
            url.push_str(&format!("&{key}={value}"));
        }
    }
    if let Some(min) = filter.salary_min {
        url.push_str(&format!("&salary_min={min}"));
    }
    if let Some(max) = filter.salary_max {
        url.push_str(&format!("&salary_max={max}"));
    }
    url
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => server_error(err),
    }
}

fn server_error(err: impl std::fmt::Display) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!("Server error: {err}")),
    )
        .into_response()
}

fn json_error(status: StatusCode, message: String) -> Response {
    (
        status,
        Json(serde_json::json!({"status": "error", "message": message})),
    )
        .into_response()
}
