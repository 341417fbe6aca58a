//! Google OAuth (authorization-code flow) used for external sign-in.
//!
//! `GOOGLE_OAUTH_API_BASE` points both the token and userinfo calls at one
//! base URL so tests can mock the upstream.

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Subset of the OpenID Connect userinfo payload we consume.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleUser {
    pub sub: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl OAuthConfig {
    /// None when Google sign-in is not configured; callers degrade to 503.
    pub fn from_env() -> Option<Self> {
        let client_id = std::env::var("GOOGLE_CLIENT_ID").ok()?;
        let client_secret = std::env::var("GOOGLE_CLIENT_SECRET").ok()?;
        let redirect_uri = std::env::var("GOOGLE_REDIRECT_URI")
            .unwrap_or_else(|_| "http://localhost:8080/api/v1/auth/google/callback".to_string());
        Some(Self { client_id, client_secret, redirect_uri })
    }

    pub fn authorize_url(&self) -> String {
        format!(
            "https://accounts.google.com/o/oauth2/v2/auth?client_id={}&redirect_uri={}&response_type=code&scope=openid%20email%20profile",
            self.client_id,
            urlencoding::encode(&self.redirect_uri)
        )
    }
}

fn token_url() -> String {
    match std::env::var("GOOGLE_OAUTH_API_BASE") {
        Ok(base) => format!("{}/token", base.trim_end_matches('/')),
        Err(_) => "https://oauth2.googleapis.com/token".to_string(),
    }
}

fn userinfo_url() -> String {
    match std::env::var("GOOGLE_OAUTH_API_BASE") {
        Ok(base) => format!("{}/v1/userinfo", base.trim_end_matches('/')),
        Err(_) => "https://openidconnect.googleapis.com/v1/userinfo".to_string(),
    }
}

/// Exchange an authorization code for the signed-in user's identity.
pub async fn exchange_code(cfg: &OAuthConfig, code: &str) -> anyhow::Result<GoogleUser> {
    let client = reqwest::Client::new();

    let token = client
        .post(token_url())
        .form(&[
            ("client_id", cfg.client_id.as_str()),
            ("client_secret", cfg.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", cfg.redirect_uri.as_str()),
        ])
        .send()
        .await
        .context("token endpoint unreachable")?
        .error_for_status()
        .context("token exchange rejected")?
        .json::<TokenResponse>()
        .await
        .context("malformed token response")?;

    let user = client
        .get(userinfo_url())
        .bearer_auth(&token.access_token)
        .send()
        .await
        .context("userinfo endpoint unreachable")?
        .error_for_status()
        .context("userinfo rejected")?
        .json::<GoogleUser>()
        .await
        .context("malformed userinfo response")?;

    Ok(user)
}
