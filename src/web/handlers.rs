use super::errors::{HttpError, PageError};
use super::page::{PageView, SearchMode, render_page};
use crate::config::{DUMB_RESULTS, SMART_RESULTS};
use crate::filter::{FacetSelection, Where, build_filter};
use crate::render::{CardDetail, result_title};
use crate::search::CardSearcher;
use crate::traits::CardRecord;
use axum::Json;
use axum::extract::{Query, State};
use axum::response::Html;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub searcher: Arc<CardSearcher>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageAction {
    Smart,
    Dumb,
}

/// Query string of the search page. Facet fields are listed one by one
/// because `serde(flatten)` does not mix with numeric form fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    pub set_name: Option<String>,
    pub card_type: Option<String>,
    pub color: Option<String>,
    pub rarity: Option<String>,
    pub level: Option<String>,
    pub triggers: Option<String>,
    pub q: Option<String>,
    pub n_results: Option<usize>,
    pub dumb_limit: Option<usize>,
    pub action: Option<PageAction>,
}

impl PageParams {
    fn selection(&self) -> FacetSelection {
        FacetSelection {
            set_name: self.set_name.clone(),
            card_type: self.card_type.clone(),
            color: self.color.clone(),
            rarity: self.rarity.clone(),
            level: self.level.clone(),
            triggers: self.triggers.clone(),
        }
    }
}

pub async fn index(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Result<Html<String>, PageError> {
    log::debug!("page params: {params:?}");
    let searcher = state.searcher.clone();
    let html = tokio::task::spawn_blocking(move || render_index(&searcher, &params)).await??;
    Ok(Html(html))
}

fn render_index(searcher: &CardSearcher, params: &PageParams) -> anyhow::Result<String> {
    let catalog = searcher.facets()?;
    let selection = params.selection();
    let query = params.q.clone().unwrap_or_default();
    let n_results = SMART_RESULTS.resolve(params.n_results);
    let dumb_limit = DUMB_RESULTS.resolve(params.dumb_limit);

    let results = match params.action {
        Some(PageAction::Smart) => {
            let filter = build_filter(&selection);
            Some((
                SearchMode::Smart,
                searcher.smart_search(&query, n_results, filter.as_ref())?,
            ))
        }
        Some(PageAction::Dumb) => {
            let filter = build_filter(&selection);
            Some((
                SearchMode::Filtered,
                searcher.dumb_search(filter.as_ref(), dumb_limit)?,
            ))
        }
        None => None,
    };

    Ok(render_page(&PageView {
        catalog: &catalog,
        selection: &selection,
        query: &query,
        n_results,
        dumb_limit,
        results: results
            .as_ref()
            .map(|(mode, records)| (*mode, records.as_slice())),
    }))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SmartSearchRequest {
    #[serde(default)]
    pub query: String,
    pub n_results: Option<usize>,
    #[serde(default)]
    pub filters: FacetSelection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DumbSearchRequest {
    pub limit: Option<usize>,
    #[serde(default)]
    pub filters: FacetSelection,
}

/// A result with its display heading and detail projection.
#[derive(Debug, Serialize)]
pub struct CardView {
    pub title: String,
    #[serde(flatten)]
    pub record: CardRecord,
    pub detail: CardDetail,
}

impl From<CardRecord> for CardView {
    fn from(record: CardRecord) -> Self {
        CardView {
            title: result_title(&record),
            detail: CardDetail::from_metadata(&record.metadata),
            record,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub count: usize,
    pub filter: Option<Where>,
    pub results: Vec<CardView>,
}

impl SearchResponse {
    fn new(filter: Option<Where>, records: Vec<CardRecord>) -> Self {
        SearchResponse {
            count: records.len(),
            filter,
            results: records.into_iter().map(CardView::from).collect(),
        }
    }
}

pub async fn facets(State(state): State<AppState>) -> Result<Json<Value>, HttpError> {
    let searcher = state.searcher.clone();
    let catalog = tokio::task::spawn_blocking(move || searcher.facets()).await??;
    Ok(Json(serde_json::to_value(catalog.values)?))
}

pub async fn smart_search(
    State(state): State<AppState>,
    Json(payload): Json<SmartSearchRequest>,
) -> Result<Json<SearchResponse>, HttpError> {
    log::debug!("payload: {payload:?}");
    let searcher = state.searcher.clone();
    let response = tokio::task::spawn_blocking(move || -> anyhow::Result<SearchResponse> {
        let filter = build_filter(&payload.filters);
        let n_results = SMART_RESULTS.resolve(payload.n_results);
        let records = searcher.smart_search(&payload.query, n_results, filter.as_ref())?;
        Ok(SearchResponse::new(filter, records))
    })
    .await??;
    Ok(Json(response))
}

pub async fn dumb_search(
    State(state): State<AppState>,
    Json(payload): Json<DumbSearchRequest>,
) -> Result<Json<SearchResponse>, HttpError> {
    log::debug!("payload: {payload:?}");
    let searcher = state.searcher.clone();
    let response = tokio::task::spawn_blocking(move || -> anyhow::Result<SearchResponse> {
        let filter = build_filter(&payload.filters);
        let limit = DUMB_RESULTS.resolve(payload.limit);
        let records = searcher.dumb_search(filter.as_ref(), limit)?;
        Ok(SearchResponse::new(filter, records))
    })
    .await??;
    Ok(Json(response))
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<Value>, HttpError> {
    let searcher = state.searcher.clone();
    let count = tokio::task::spawn_blocking(move || searcher.collection().count()).await??;
    Ok(Json(json!({
        "collection": state.searcher.collection().name(),
        "count": count,
    })))
}

pub async fn refresh(State(state): State<AppState>) -> Result<Json<Value>, HttpError> {
    let searcher = state.searcher.clone();
    tokio::task::spawn_blocking(move || searcher.refresh()).await??;
    Ok(Json(json!({ "refreshed": true })))
}
