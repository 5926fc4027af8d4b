use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::Response,
    Json,
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: u64,
    pub exp: u64,
}

/// Subject of a validated bearer token, stored in request extensions by [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub String);

pub struct AuthManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    token_ttl: Duration,
    username: String,
    password: String,
    required: bool,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Serialize)]
pub struct AuthStatusResponse {
    pub auth_required: bool,
}

impl AuthManager {
    pub fn new(config: &Config) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        Self {
            encoding_key: EncodingKey::from_secret(config.secret_key.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret_key.as_bytes()),
            validation,
            token_ttl: config.access_token_ttl,
            username: config.app_user.clone(),
            password: config.app_pass.clone(),
            required: config.auth_required,
        }
    }

    pub fn required(&self) -> bool {
        self.required
    }

    pub fn check_credentials(&self, username: &str, password: &str) -> bool {
        username == self.username && password == self.password
    }

    pub fn issue_token(&self, sub: &str) -> ApiResult<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| ApiError::Internal("System clock is before UNIX_EPOCH".into()))?;
        let claims = Claims {
            sub: sub.to_string(),
            iat: now.as_secs(),
            exp: (now + self.token_ttl).as_secs(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ApiError::Internal(format!("Failed to sign token: {e}")))
    }

    /// Returns the token subject, or `"user"` when the token carries an empty one.
    pub fn validate_token(&self, token: &str) -> Result<String, jsonwebtoken::errors::Error> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        if data.claims.sub.is_empty() {
            Ok("user".to_string())
        } else {
            Ok(data.claims.sub)
        }
    }
}

fn not_authenticated() -> ApiError {
    ApiError::Unauthorized("Not authenticated".to_string())
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let auth = state.auth();
    if !auth.check_credentials(&body.username, &body.password) {
        warn!("Rejected login for {}", body.username);
        return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
    }
    let access_token = auth.issue_token(&body.username)?;
    info!("Issued access token for {}", body.username);
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

pub async fn status(State(state): State<AppState>) -> Json<AuthStatusResponse> {
    Json(AuthStatusResponse {
        auth_required: state.auth().required(),
    })
}

/// Guards routes when authentication is required; open mode passes everything through.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let auth = state.auth();
    if !auth.required() {
        return Ok(next.run(request).await);
    }

    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(not_authenticated)?;
    let (scheme, token) = header.split_once(' ').ok_or_else(not_authenticated)?;
    if !scheme.eq_ignore_ascii_case("Bearer") {
        return Err(not_authenticated());
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(not_authenticated());
    }

    let subject = auth.validate_token(token).map_err(|err| {
        warn!("Token rejected: {}", err);
        ApiError::Unauthorized("Invalid or expired token".to_string())
    })?;
    request.extensions_mut().insert(AuthenticatedUser(subject));
    Ok(next.run(request).await)
}
