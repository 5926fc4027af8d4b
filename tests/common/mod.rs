#![allow(dead_code)]

use axum::{
    body::Body,
    extract::Path,
    http::{header, HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use mf_xirr_server_rs::{app, config::Config, state::AppState};
use serde_json::{json, Value};

pub const KNOWN_PAN: &str = "ABCDE1234F";
pub const UPSTREAM_KEY: &str = "upstream-key";
/// The fake provider answers this PAN with a truncated JSON body.
pub const GARBLED_PAN: &str = "GARBL0000E";

/// Two folios at different brokers. Axis holds 350 units valued at 60 on 2024-01-01,
/// HDFC holds 100 units valued at 120 after a partial redemption.
pub fn sample_payload() -> Value {
    json!({
        "investor": {"name": "Asha Rao", "pan": KNOWN_PAN, "email": "asha@example.com"},
        "folios": [
            {
                "folio": "1001/22",
                "amc": "Axis Mutual Fund",
                "broker": "Zerodha Coin",
                "schemes": [{
                    "scheme": "Axis Bluechip Fund - Direct Growth - ISIN: INF846K01DP8",
                    "isin": null,
                    "nav": "60.00",
                    "nav_date": "2024-01-01",
                    "transactions": [
                        {
                            "date": "2023-01-01", "type": "PURCHASE",
                            "amount": 10000, "units": 250, "nav": 40
                        },
                        {
                            "date": "2023-07-01", "type": "PURCHASE_SIP",
                            "amount": "5,000.00", "units": "100", "nav": "50"
                        },
                        {"date": "2023-07-01", "type": "STAMP_DUTY_TAX", "amount": "0.25"}
                    ]
                }]
            },
            {
                "folio": 2002,
                "amc": "HDFC Mutual Fund",
                "broker": "Groww",
                "schemes": [{
                    "scheme": "HDFC Index Fund Nifty 50 Plan",
                    "isin": "INF179K01WA6",
                    "nav": 120,
                    "nav_date": "28-Dec-2023",
                    "transactions": [
                        {
                            "date": "01/02/2023", "type": "Purchase",
                            "amount": "₹20,000", "units": 200, "nav": 100
                        },
                        {
                            "date": "2023-10-01", "type": "Redemption",
                            "amount": 11000, "units": -100, "nav": 110
                        }
                    ]
                }]
            }
        ]
    })
}

async fn portfolio(Path(pan): Path<String>, headers: HeaderMap) -> Response {
    let expected = format!("Bearer {}", UPSTREAM_KEY);
    let auth = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    if auth != Some(expected.as_str()) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if pan == KNOWN_PAN {
        Json(sample_payload()).into_response()
    } else if pan == GARBLED_PAN {
        (
            [(header::CONTENT_TYPE, "application/json")],
            r#"{"investor": {"name": "Asha"#,
        )
            .into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

/// Starts a fake data provider on an ephemeral port and returns its base URL.
pub async fn spawn_upstream() -> String {
    let upstream = Router::new().route("/clients/{pan}/portfolio", get(portfolio));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, upstream).await.unwrap();
    });
    format!("http://{}", addr)
}

pub fn test_config(upstream: &str, auth_required: bool) -> Config {
    Config {
        secret_key: "test-secret".to_string(),
        auth_required,
        upstream_base_url: upstream.to_string(),
        upstream_api_key: Some(UPSTREAM_KEY.to_string()),
        ..Config::default()
    }
}

pub async fn test_app(auth_required: bool) -> Router {
    let upstream = spawn_upstream().await;
    let state = AppState::from_config(test_config(&upstream, auth_required)).unwrap();
    app(state)
}

pub fn json_post(uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn body_bytes(res: Response) -> Vec<u8> {
    axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(res: Response) -> Value {
    serde_json::from_slice(&body_bytes(res).await).unwrap()
}
