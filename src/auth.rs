use std::future::Future;
use axum::{
    extract::{Path, State, Query, Json, FromRequestParts},
    response::{Redirect, IntoResponse, Response},
    http::{StatusCode, request::Parts, HeaderMap, HeaderValue, header},
};
use serde::{Deserialize, Serialize};
use crate::AppState;
use crate::error::AppError;
use oauth2::{
    basic::BasicClient, AuthUrl, ClientId, ClientSecret, RedirectUrl, TokenUrl,
    AuthorizationCode, CsrfToken, EndpointNotSet, EndpointSet, Scope,
};
use oauth2::TokenResponse;
use std::env;
use jsonwebtoken::{encode, decode, EncodingKey, DecodingKey, Header, Validation};
use chrono::{Utc, Duration};
use serde_json::Value;

const AUTH_COOKIE_NAME: &str = "auth_token";

/// Self-selected marketplace role. It rides in the session token and is
/// never checked against a server-side record.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Donor,
    Partner,
}

#[derive(Deserialize)]
pub struct AuthCallback {
    code: String,
    state: String,
}

#[derive(Deserialize)]
pub struct DevLoginRequest {
    username: String,
    password: String,
}

#[derive(Deserialize)]
pub struct RoleRequest {
    pub role: Option<Role>,
}

#[derive(Serialize)]
pub struct AuthResponse {
    user: UserProfile,
}

#[derive(Serialize, Clone, Debug)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    pub provider: String,
    pub role: Option<Role>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    exp: usize,
    pub email: String,
    pub provider: String,
    pub name: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    iss: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    aud: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StateClaims {
    exp: usize,
    provider: String,
    nonce: String,
}

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub provider: String,
    pub role: Option<Role>,
}

impl AuthenticatedUser {
    pub fn require_role(&self, role: Role) -> Result<(), AppError> {
        match self.role {
            Some(current) if current == role => Ok(()),
            _ => Err(AppError::Forbidden(match role {
                Role::Donor => "Donor role required",
                Role::Partner => "Partner role required",
            })),
        }
    }

    fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            provider: self.provider.clone(),
            role: self.role,
        }
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync + 'static,
{
    type Rejection = (StatusCode, String);

    fn from_request_parts(parts: &mut Parts, _state: &S) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            let token = extract_token_from_headers(&parts.headers)
                .ok_or((StatusCode::UNAUTHORIZED, "Missing auth token".to_string()))?;

            let claims = validate_token_str(&token).map_err(|e| {
                tracing::warn!("Token error: {}", e);
                (StatusCode::UNAUTHORIZED, "Invalid token".to_string())
            })?;

            Ok(AuthenticatedUser {
                id: claims.sub,
                email: claims.email,
                name: claims.name,
                provider: claims.provider,
                role: claims.role,
            })
        }
    }
}

pub fn validate_token_str(token: &str) -> anyhow::Result<Claims> {
    let secret = env::var("JWT_SECRET")
        .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable not set"))?;

    let mut validation = Validation::default();
    validation.validate_exp = true;
    if let Ok(issuer) = env::var("JWT_ISSUER") {
        validation.set_issuer(&[issuer.as_str()]);
    }
    if let Ok(audience) = env::var("JWT_AUDIENCE") {
        validation.set_audience(&[audience.as_str()]);
    }

    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_ref()), &validation)?;
    Ok(data.claims)
}

pub async fn login(Path(provider): Path<String>) -> impl IntoResponse {
    let cfg = match load_provider_config(&provider) {
        Ok(c) => c,
        Err(e) => return (StatusCode::BAD_REQUEST, e).into_response(),
    };

    let state = match create_state_token(&provider) {
        Ok(s) => s,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };

    match cfg.authorize_url(state) {
        Ok(url) => Redirect::to(&url).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e).into_response(),
    }
}

pub async fn callback(
    Path(provider): Path<String>,
    Query(params): Query<AuthCallback>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let cfg = match load_provider_config(&provider) {
        Ok(c) => c,
        Err(e) => return (StatusCode::BAD_REQUEST, e).into_response(),
    };

    if let Err(e) = validate_state_token(&params.state, &provider) {
        tracing::warn!("OAuth state invalid: {}", e);
        return (StatusCode::UNAUTHORIZED, "Invalid state").into_response();
    }

    let client = match cfg.client() {
        Ok(c) => c,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e).into_response(),
    };

    let http_client = match reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("HTTP client build failed: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Auth failed").into_response();
        }
    };

    let token_result = match client
        .exchange_code(AuthorizationCode::new(params.code.clone()))
        .request_async(&http_client)
        .await
    {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("OAuth token exchange failed: {}", e);
            return (StatusCode::BAD_GATEWAY, "OAuth token exchange failed").into_response();
        }
    };

    let access_token = token_result.access_token().secret();
    let profile = match fetch_user_profile(&state.http, &cfg.userinfo_url, access_token).await {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("Userinfo fetch failed: {}", e);
            return (StatusCode::BAD_GATEWAY, "Userinfo fetch failed").into_response();
        }
    };

    let user = UserProfile {
        id: profile.id,
        email: profile.email,
        name: profile.name,
        provider,
        role: None,
    };
    tracing::info!(user_id = %user.id, provider = %user.provider, "user signed in");

    match issue_token(&user) {
        Ok(token) => with_auth_cookie(Redirect::to("/").into_response(), &build_auth_cookie(&token)),
        Err(e) => {
            tracing::error!("JWT creation failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Auth failed").into_response()
        }
    }
}

pub async fn dev_login(Json(payload): Json<DevLoginRequest>) -> impl IntoResponse {
    let env_mode = env::var("RUST_ENV").unwrap_or_else(|_| "development".to_string());
    // Only in development and only when explicitly enabled
    if env_mode == "production" || env::var("ALLOW_DEV_LOGIN").unwrap_or_default() != "true" {
        return (StatusCode::FORBIDDEN, "Dev login disabled").into_response();
    }

    let dev_user = env::var("DEV_USERNAME").unwrap_or_else(|_| "admin".to_string());
    let dev_pass = env::var("DEV_PASSWORD").unwrap_or_else(|_| "password".to_string());

    if dev_pass == "password" {
        tracing::warn!("Default DEV_PASSWORD is not allowed");
        return (StatusCode::FORBIDDEN, "Dev login misconfigured").into_response();
    }

    if payload.username != dev_user || payload.password != dev_pass {
        return (StatusCode::UNAUTHORIZED, "Invalid credentials").into_response();
    }

    let user = UserProfile {
        id: "dev-1".to_string(),
        email: "dev@local".to_string(),
        name: "Developer".to_string(),
        provider: "local".to_string(),
        role: None,
    };
    match issue_token(&user) {
        Ok(token) => with_auth_cookie(Json(AuthResponse { user }).into_response(), &build_auth_cookie(&token)),
        Err(e) => {
            tracing::error!("JWT creation failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to create token").into_response()
        }
    }
}

pub async fn logout() -> impl IntoResponse {
    with_auth_cookie((StatusCode::OK, "OK").into_response(), &clear_auth_cookie())
}

pub async fn me(user: AuthenticatedUser) -> impl IntoResponse {
    Json(user.profile())
}

/// Re-issues the session with the chosen role (or none, to reset it).
pub async fn update_role(user: AuthenticatedUser, Json(req): Json<RoleRequest>) -> impl IntoResponse {
    let mut profile = user.profile();
    profile.role = req.role;

    match issue_token(&profile) {
        Ok(token) => {
            tracing::info!(user_id = %profile.id, role = ?profile.role, "role selected");
            with_auth_cookie(Json(AuthResponse { user: profile }).into_response(), &build_auth_cookie(&token))
        }
        Err(e) => {
            tracing::error!("JWT creation failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to create token").into_response()
        }
    }
}

pub fn issue_token(user: &UserProfile) -> anyhow::Result<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::days(1))
        .ok_or_else(|| anyhow::anyhow!("token expiry out of range"))?
        .timestamp();

    let claims = Claims {
        sub: user.id.clone(),
        email: user.email.clone(),
        provider: user.provider.clone(),
        name: user.name.clone(),
        role: user.role,
        exp: expiration as usize,
        iss: env::var("JWT_ISSUER").ok(),
        aud: env::var("JWT_AUDIENCE").ok(),
    };

    let secret = env::var("JWT_SECRET")
        .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable not set"))?;
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_ref()))?;

    Ok(token)
}

pub fn extract_token_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        if let Some(token) = auth_header.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }

    let cookie_header = headers.get(header::COOKIE).and_then(|h| h.to_str().ok())?;
    cookie_header.split(';').find_map(|cookie| {
        let (k, v) = cookie.trim().split_once('=')?;
        (k == AUTH_COOKIE_NAME).then(|| v.to_string())
    })
}

fn with_auth_cookie(mut response: Response, cookie: &str) -> Response {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().insert(header::SET_COOKIE, value);
            response
        }
        Err(e) => {
            tracing::error!("Invalid cookie header: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Auth failed").into_response()
        }
    }
}

fn secure_cookies() -> bool {
    env::var("RUST_ENV").unwrap_or_else(|_| "development".to_string()) == "production"
}

fn build_auth_cookie(token: &str) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age=86400",
        AUTH_COOKIE_NAME,
        token
    );
    if secure_cookies() {
        cookie.push_str("; Secure");
    }
    cookie
}

fn clear_auth_cookie() -> String {
    let mut cookie = format!(
        "{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0",
        AUTH_COOKIE_NAME
    );
    if secure_cookies() {
        cookie.push_str("; Secure");
    }
    cookie
}

struct ProviderConfig {
    client_id: String,
    client_secret: String,
    auth_url: String,
    token_url: String,
    userinfo_url: String,
    redirect_url: String,
}

type OAuthClient = BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

impl ProviderConfig {
    fn client(&self) -> Result<OAuthClient, String> {
        let auth = AuthUrl::new(self.auth_url.clone()).map_err(|e| format!("Invalid auth url: {}", e))?;
        let token = TokenUrl::new(self.token_url.clone()).map_err(|e| format!("Invalid token url: {}", e))?;
        let redirect = RedirectUrl::new(self.redirect_url.clone()).map_err(|e| format!("Invalid redirect url: {}", e))?;

        Ok(BasicClient::new(ClientId::new(self.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.client_secret.clone()))
            .set_auth_uri(auth)
            .set_token_uri(token)
            .set_redirect_uri(redirect))
    }

    /// Provider consent URL carrying `state` and the OpenID profile scopes.
    fn authorize_url(&self, state: String) -> Result<String, String> {
        let (url, _csrf) = self
            .client()?
            .authorize_url(|| CsrfToken::new(state))
            .add_scope(Scope::new("openid".to_string()))
            .add_scope(Scope::new("email".to_string()))
            .add_scope(Scope::new("profile".to_string()))
            .url();
        Ok(url.to_string())
    }
}

fn load_provider_config(provider: &str) -> Result<ProviderConfig, String> {
    let allowed = env::var("OAUTH_PROVIDERS").unwrap_or_default();
    let allowed_list: Vec<String> = allowed.split(',').map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty()).collect();
    if !allowed_list.contains(&provider.to_lowercase()) {
        return Err("OAuth provider not allowed".to_string());
    }

    let prefix = provider.to_uppercase();
    let client_id = env::var(format!("{}_CLIENT_ID", prefix)).map_err(|_| "Missing client id".to_string())?;
    let client_secret = env::var(format!("{}_CLIENT_SECRET", prefix)).map_err(|_| "Missing client secret".to_string())?;
    let auth_url = env::var(format!("{}_AUTH_URL", prefix)).map_err(|_| "Missing auth url".to_string())?;
    let token_url = env::var(format!("{}_TOKEN_URL", prefix)).map_err(|_| "Missing token url".to_string())?;
    let userinfo_url = env::var(format!("{}_USERINFO_URL", prefix)).map_err(|_| "Missing userinfo url".to_string())?;
    let redirect_url = env::var(format!("{}_REDIRECT_URL", prefix))
        .unwrap_or_else(|_| format!("http://localhost:8080/auth/callback/{}", provider));

    Ok(ProviderConfig {
        client_id,
        client_secret,
        auth_url,
        token_url,
        userinfo_url,
        redirect_url,
    })
}

fn create_state_token(provider: &str) -> anyhow::Result<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::minutes(10))
        .ok_or_else(|| anyhow::anyhow!("state expiry out of range"))?
        .timestamp();
    let state = StateClaims {
        exp: expiration as usize,
        provider: provider.to_string(),
        nonce: uuid::Uuid::new_v4().to_string(),
    };
    let secret = env::var("JWT_SECRET")
        .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable not set"))?;
    let token = encode(&Header::default(), &state, &EncodingKey::from_secret(secret.as_ref()))?;
    Ok(token)
}

fn validate_state_token(token: &str, provider: &str) -> anyhow::Result<()> {
    let secret = env::var("JWT_SECRET")
        .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable not set"))?;
    let mut validation = Validation::default();
    validation.validate_exp = true;
    let data = decode::<StateClaims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &validation,
    )?;
    if !data.claims.provider.eq_ignore_ascii_case(provider) {
        return Err(anyhow::anyhow!("provider mismatch"));
    }
    Ok(())
}

struct ProviderProfile {
    id: String,
    email: String,
    name: String,
}

async fn fetch_user_profile(client: &reqwest::Client, userinfo_url: &str, access_token: &str) -> anyhow::Result<ProviderProfile> {
    let resp = client
        .get(userinfo_url)
        .bearer_auth(access_token)
        .send()
        .await?;

    if !resp.status().is_success() {
        return Err(anyhow::anyhow!("userinfo response status {}", resp.status()));
    }

    let json: Value = resp.json().await?;
    let id = json.get("sub")
        .or_else(|| json.get("id"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("missing user id"))?
        .to_string();
    let email = json.get("email")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown@example.com")
        .to_string();
    let name = json.get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("Anonymous")
        .to_string();

    Ok(ProviderProfile { id, email, name })
}
