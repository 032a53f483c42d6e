use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::cli::ServeArgs;
use crate::config::EngineConfig;
use crate::dataset;
use crate::error::EngineError;
use crate::index::codes::{CodeIndex, ListQuery, SearchQuery, SortField, SortOrder};
use crate::ntap::{self, NtapEligibilityRequest, NtapPaymentRequest, NtapProgram};
use crate::record::CodeType;
use crate::reimbursement::{self, ScenarioRequest};
use crate::storage::StoragePaths;
use crate::tpt::{self, TptEligibilityRequest, TptPaymentRequest, TptProgram};

const MAX_PAGE_LIMIT: usize = 500;

/// A `type` query param that names an unknown code set matches nothing,
/// which is different from omitting the filter.
enum TypeFilter {
    Any,
    Known(CodeType),
    Unknown,
}

fn parse_type_filter(p: Option<&str>) -> TypeFilter {
    match p.map(str::trim).filter(|s| !s.is_empty()) {
        None => TypeFilter::Any,
        Some(s) => match CodeType::parse(s) {
            Some(t) => TypeFilter::Known(t),
            None => TypeFilter::Unknown,
        },
    }
}

#[derive(Clone)]
struct AppState {
    index: Arc<CodeIndex>,
    config: Arc<EngineConfig>,
    ntap: Arc<NtapProgram>,
    tpt: Arc<TptProgram>,
}

pub async fn run(opts: ServeArgs) -> anyhow::Result<()> {
    let paths = StoragePaths::new(&opts.data_dir);

    // Everything is loaded and indexed before the listener binds, so no
    // request can ever observe a partially built index.
    let records = dataset::load_codes(&paths).context("load code dataset")?;
    let index = CodeIndex::build(records);
    let ntap = dataset::load_ntap_program(&paths).context("load NTAP program data")?;
    let tpt = dataset::load_tpt_program(&paths).context("load TPT program data")?;

    let state = AppState {
        index: Arc::new(index),
        config: Arc::new(EngineConfig::default()),
        ntap: Arc::new(ntap),
        tpt: Arc::new(tpt),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/health", get(api_health))
        .route("/api/codes", get(api_codes))
        .route("/api/codes/search", get(api_code_search))
        .route("/api/codes/stats", get(api_code_stats))
        .route("/api/codes/:code", get(api_code_detail))
        .route("/api/reimbursement/scenario", post(api_scenario))
        .route("/api/reimbursement/compare/:code", get(api_compare))
        .route("/api/reimbursement/sites", get(api_sites))
        .route("/api/ntap/payment", post(api_ntap_payment))
        .route("/api/ntap/eligibility", post(api_ntap_eligibility))
        .route("/api/ntap/approved", get(api_ntap_approved))
        .route("/api/ntap/drgs", get(api_ntap_drgs))
        .route("/api/tpt/payment", post(api_tpt_payment))
        .route("/api/tpt/eligibility", post(api_tpt_eligibility))
        .route("/api/tpt/approved", get(api_tpt_approved))
        .route("/api/tpt/apcs", get(api_tpt_apcs))
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", opts.host, opts.port)
        .parse()
        .context("parse host:port")?;

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn engine_error(e: EngineError) -> Response {
    match e {
        EngineError::Validation(errors) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "errors": errors }))).into_response()
        }
        EngineError::NotFound(what) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("{what} not found") })),
        )
            .into_response(),
    }
}

async fn api_health(State(st): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "totalCodes": st.index.len(),
    }))
}

#[derive(Debug, Deserialize)]
struct CodesParams {
    limit: Option<usize>,
    offset: Option<usize>,
    #[serde(rename = "type")]
    code_type: Option<String>,
    #[serde(rename = "sortBy")]
    sort_by: Option<String>,
    #[serde(rename = "sortOrder")]
    sort_order: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CodesEnvelope {
    data: Vec<crate::record::CodeSummary>,
    total: usize,
    limit: usize,
    offset: usize,
    page: usize,
    total_pages: usize,
    has_more: bool,
}

async fn api_codes(
    State(st): State<AppState>,
    Query(p): Query<CodesParams>,
) -> impl IntoResponse {
    let limit = p.limit.unwrap_or(50).clamp(1, MAX_PAGE_LIMIT);
    let offset = p.offset.unwrap_or(0);
    let code_type = match parse_type_filter(p.code_type.as_deref()) {
        TypeFilter::Any => None,
        TypeFilter::Known(t) => Some(t),
        TypeFilter::Unknown => {
            return Json(CodesEnvelope {
                data: Vec::new(),
                total: 0,
                limit,
                offset,
                page: offset / limit + 1,
                total_pages: 0,
                has_more: false,
            });
        }
    };
    let query = ListQuery {
        limit,
        offset,
        code_type,
        sort_by: SortField::parse(p.sort_by.as_deref()),
        sort_order: SortOrder::parse(p.sort_order.as_deref()),
    };
    let page = st.index.list(&query);
    Json(CodesEnvelope {
        page: page.offset / page.limit + 1,
        total_pages: page.total.div_ceil(page.limit),
        data: page.codes,
        total: page.total,
        limit: page.limit,
        offset: page.offset,
        has_more: page.has_more,
    })
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    limit: Option<usize>,
    #[serde(rename = "type")]
    code_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct SearchEnvelope {
    data: Vec<crate::record::CodeSummary>,
    total: usize,
    query: String,
}

async fn api_code_search(
    State(st): State<AppState>,
    Query(p): Query<SearchParams>,
) -> impl IntoResponse {
    let code_type = match parse_type_filter(p.code_type.as_deref()) {
        TypeFilter::Any => None,
        TypeFilter::Known(t) => Some(t),
        TypeFilter::Unknown => {
            return Json(SearchEnvelope {
                data: Vec::new(),
                total: 0,
                query: p.q,
            });
        }
    };
    let result = st.index.search(&SearchQuery {
        q: p.q,
        limit: p.limit.unwrap_or(50).clamp(1, MAX_PAGE_LIMIT),
        code_type,
    });
    Json(SearchEnvelope {
        data: result.codes,
        total: result.total,
        query: result.query,
    })
}

async fn api_code_stats(State(st): State<AppState>) -> impl IntoResponse {
    Json(st.index.stats())
}

async fn api_code_detail(
    State(st): State<AppState>,
    AxumPath(code): AxumPath<String>,
) -> Response {
    match st.index.detail(&code, &st.config) {
        Some(detail) => Json(detail).into_response(),
        None => engine_error(EngineError::not_found(format!("code {code}"))),
    }
}

async fn api_scenario(
    State(st): State<AppState>,
    Json(req): Json<ScenarioRequest>,
) -> Response {
    match reimbursement::calculate_scenario(&st.index, &st.config, &req) {
        Ok(r) => Json(r).into_response(),
        Err(e) => engine_error(e),
    }
}

#[derive(Debug, Deserialize)]
struct CompareParams {
    #[serde(rename = "deviceCost", default)]
    device_cost: f64,
    #[serde(rename = "ntapAddOn", default)]
    ntap_add_on: f64,
}

async fn api_compare(
    State(st): State<AppState>,
    AxumPath(code): AxumPath<String>,
    Query(p): Query<CompareParams>,
) -> Response {
    match reimbursement::compare_all_sites(&st.index, &st.config, &code, p.device_cost, p.ntap_add_on)
    {
        Ok(r) => Json(r).into_response(),
        Err(e) => engine_error(e),
    }
}

async fn api_sites(State(st): State<AppState>) -> impl IntoResponse {
    Json(reimbursement::site_catalog(&st.config))
}

async fn api_ntap_payment(
    State(st): State<AppState>,
    Json(req): Json<NtapPaymentRequest>,
) -> Response {
    match ntap::calculate_payment(&st.ntap, &st.config, &req) {
        Ok(r) => Json(r).into_response(),
        Err(e) => engine_error(e),
    }
}

async fn api_ntap_eligibility(
    State(st): State<AppState>,
    Json(req): Json<NtapEligibilityRequest>,
) -> Response {
    match ntap::check_eligibility(&st.ntap, &st.config, &req) {
        Ok(r) => Json(r).into_response(),
        Err(e) => engine_error(e),
    }
}

async fn api_ntap_approved(State(st): State<AppState>) -> impl IntoResponse {
    Json(ntap::approved_technologies(&st.ntap))
}

async fn api_ntap_drgs(State(st): State<AppState>) -> impl IntoResponse {
    Json(ntap::available_drgs(&st.ntap))
}

async fn api_tpt_payment(
    State(st): State<AppState>,
    Json(req): Json<TptPaymentRequest>,
) -> Response {
    match tpt::calculate_payment(&st.tpt, &st.config, &req) {
        Ok(r) => Json(r).into_response(),
        Err(e) => engine_error(e),
    }
}

async fn api_tpt_eligibility(
    State(st): State<AppState>,
    Json(req): Json<TptEligibilityRequest>,
) -> Response {
    match tpt::check_eligibility(&st.tpt, &st.config, &req) {
        Ok(r) => Json(r).into_response(),
        Err(e) => engine_error(e),
    }
}

async fn api_tpt_approved(State(st): State<AppState>) -> impl IntoResponse {
    Json(tpt::approved_technologies(&st.tpt, &st.config))
}

async fn api_tpt_apcs(State(st): State<AppState>) -> impl IntoResponse {
    Json(tpt::available_apcs(&st.tpt))
}
