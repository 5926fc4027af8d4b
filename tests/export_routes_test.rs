mod common;

use axum::{body::Body, http::{header, Request}};
use serde_json::json;
use tower::ServiceExt;

use common::{body_bytes, body_json, json_post, test_app, GARBLED_PAN, KNOWN_PAN};

#[tokio::test]
async fn health_returns_ok() {
    let app = test_app(false).await;
    let res = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(body_json(res).await["status"], "ok");
}

#[tokio::test]
async fn export_excel_returns_workbook_attachment() {
    let app = test_app(false).await;
    let res = app
        .oneshot(json_post("/export", json!({"pan": KNOWN_PAN, "kind": "excel"}), None))
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(
        res.headers()[header::CONTENT_TYPE],
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    );
    assert_eq!(
        res.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"XIRR_Fund_Analysis.xlsx\""
    );
    let blob = body_bytes(res).await;
    assert!(blob.starts_with(b"PK"));
}

#[tokio::test]
async fn export_kind_is_case_insensitive_for_html() {
    let app = test_app(false).await;
    let res = app
        .oneshot(json_post(
            "/export",
            json!({"pan": "abcde1234f", "broker": "zerodha", "kind": "HTML"}),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert!(res.headers()[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/html"));
    assert_eq!(
        res.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"Fund_Analysis_Report.html\""
    );
    let html = String::from_utf8(body_bytes(res).await).unwrap();
    assert!(html.contains("Axis Bluechip Fund - Direct Growth"));
    assert!(!html.contains("HDFC Index Fund"));
}

#[tokio::test]
async fn unsupported_kind_is_rejected() {
    let app = test_app(false).await;
    let res = app
        .oneshot(json_post("/export", json!({"pan": KNOWN_PAN, "kind": "pdf"}), None))
        .await
        .unwrap();

    assert_eq!(res.status(), 400);
    assert_eq!(body_json(res).await["detail"], "Unsupported kind (use excel|html)");
}

#[tokio::test]
async fn empty_portfolio_is_rejected_before_kind_check() {
    let app = test_app(false).await;
    let res = app
        .oneshot(json_post(
            "/export",
            json!({"pan": KNOWN_PAN, "broker": "nobody", "kind": "pdf"}),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), 400);
    assert_eq!(body_json(res).await["detail"], "No transactions found");
}

#[tokio::test]
async fn invalid_pan_is_rejected() {
    let app = test_app(false).await;
    let res = app
        .oneshot(json_post("/export", json!({"pan": "12345", "kind": "excel"}), None))
        .await
        .unwrap();

    assert_eq!(res.status(), 400);
    assert_eq!(body_json(res).await["detail"], "Invalid PAN format");
}

#[tokio::test]
async fn upstream_failure_maps_to_bad_gateway() {
    let app = test_app(false).await;
    let res = app
        .oneshot(json_post("/export", json!({"pan": "ZZZZZ9999Z", "kind": "excel"}), None))
        .await
        .unwrap();

    assert_eq!(res.status(), 502);
    let detail = body_json(res).await["detail"].as_str().unwrap().to_string();
    assert!(detail.contains("404"), "{detail}");
}

#[tokio::test]
async fn unreadable_upstream_body_maps_to_bad_gateway() {
    let app = test_app(false).await;
    let res = app
        .oneshot(json_post("/xirr", json!({"pan": GARBLED_PAN}), None))
        .await
        .unwrap();

    assert_eq!(res.status(), 502);
    let detail = body_json(res).await["detail"].as_str().unwrap().to_string();
    assert!(detail.starts_with("Upstream returned an unreadable portfolio"), "{detail}");
}

#[tokio::test]
async fn xirr_returns_json_report() {
    let app = test_app(false).await;
    let res = app
        .oneshot(json_post("/xirr", json!({"pan": KNOWN_PAN}), None))
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    let json = body_json(res).await;
    assert_eq!(json["investor"]["name"], "Asha Rao");
    assert_eq!(json["valuation_date"], "2024-01-01");
    assert_eq!(json["summary_scheme"].as_array().unwrap().len(), 2);
    assert_eq!(json["portfolio_xirr"].as_array().unwrap().len(), 5);
    assert!(json["portfolio_xirr"][0]["xirr"].is_null());
    assert!(json["scheme_timelines"]["HDFC Index Fund Nifty 50 Plan"].is_array());
}
