use axum::{
    extract::State,
    http::header,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::{self, AuthenticatedUser};
use crate::error::{ApiError, ApiResult};
use crate::models::Investor;
use crate::reports::{generate_excel, generate_html_report, XLSX_CONTENT_TYPE};
use crate::state::AppState;
use crate::transform::parse_transactions_and_investor;
use crate::xirr_engine::{generate_xirr_report, XirrReport};

#[derive(Deserialize)]
pub struct FetchRequest {
    pub pan: String,
    #[serde(default)]
    pub broker: Option<String>,
}

#[derive(Deserialize)]
pub struct ExportRequest {
    pub pan: String,
    #[serde(default)]
    pub broker: Option<String>,
    pub kind: String,
}

#[derive(Serialize)]
pub struct XirrReportResponse {
    pub investor: Investor,
    #[serde(flatten)]
    pub report: XirrReport,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Fetch, parse and compute. Rejects an empty transaction set before the engine runs.
async fn build_report(
    state: &AppState,
    pan: &str,
    broker: Option<&str>,
) -> ApiResult<(Investor, XirrReport)> {
    let payload = state.upstream().get_client_portfolio(pan).await?;
    let parsed = parse_transactions_and_investor(payload, broker);
    if !parsed.has_cash_flows() {
        return Err(ApiError::BadRequest("No transactions found".to_string()));
    }
    let report = generate_xirr_report(&parsed.transactions, &parsed.valuations)?;
    Ok((parsed.investor, report))
}

fn caller(user: &Option<Extension<AuthenticatedUser>>) -> &str {
    user.as_ref().map(|Extension(u)| u.0.as_str()).unwrap_or("anonymous")
}

async fn xirr_report(
    State(state): State<AppState>,
    user: Option<Extension<AuthenticatedUser>>,
    Json(req): Json<FetchRequest>,
) -> ApiResult<Json<XirrReportResponse>> {
    info!("XIRR report requested by {}", caller(&user));
    let (investor, report) = build_report(&state, &req.pan, req.broker.as_deref()).await?;
    Ok(Json(XirrReportResponse { investor, report }))
}

async fn export(
    State(state): State<AppState>,
    user: Option<Extension<AuthenticatedUser>>,
    Json(req): Json<ExportRequest>,
) -> ApiResult<Response> {
    info!("Export ({}) requested by {}", req.kind, caller(&user));
    let (_investor, report) = build_report(&state, &req.pan, req.broker.as_deref()).await?;

    match req.kind.trim().to_lowercase().as_str() {
        "excel" => {
            let blob = generate_excel(&report)?;
            Ok((
                [
                    (header::CONTENT_TYPE, XLSX_CONTENT_TYPE),
                    (
                        header::CONTENT_DISPOSITION,
                        "attachment; filename=\"XIRR_Fund_Analysis.xlsx\"",
                    ),
                ],
                blob,
            )
                .into_response())
        }
        "html" => {
            let html = generate_html_report(&report)?;
            Ok((
                [
                    (header::CONTENT_TYPE, "text/html; charset=utf-8"),
                    (
                        header::CONTENT_DISPOSITION,
                        "attachment; filename=\"Fund_Analysis_Report.html\"",
                    ),
                ],
                html,
            )
                .into_response())
        }
        _ => Err(ApiError::BadRequest("Unsupported kind (use excel|html)".to_string())),
    }
}

pub fn router(state: AppState) -> Router<AppState> {
    let guarded = Router::new()
        .route("/xirr", post(xirr_report))
        .route("/export", post(export))
        .route_layer(middleware::from_fn_with_state(state, auth::require_auth));

    Router::new()
        .route("/health", get(health))
        .route("/auth/login", post(auth::login))
        .route("/auth/status", get(auth::status))
        .merge(guarded)
}
