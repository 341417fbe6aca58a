use actix_web::{dev::Payload, Error, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::env;
use std::future::{ready, Ready};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub roles: Vec<Role>,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| matches!(r, Role::Admin))
    }
}

/// Validate a JWT and return its claims.
fn decode_jwt(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let secret = env::var("JWT_SECRET").expect("JWT_SECRET not set");
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

/// Extractor yielding validated `Claims`.
pub struct Auth(pub Claims);

impl FromRequest for Auth {
    type Error = Error;
    type Future = Ready<Result<Self, Error>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        // Delegate to BearerAuth to parse the header.
        if let Ok(bearer) = BearerAuth::from_request(req, pl).into_inner() {
            match decode_jwt(bearer.token()) {
                Ok(claims) => return ready(Ok(Auth(claims))),
                Err(_) => return ready(Err(actix_web::error::ErrorUnauthorized("Invalid JWT"))),
            }
        }
        ready(Err(actix_web::error::ErrorUnauthorized(
            "Authorization required",
        )))
    }
}

/// Create a JWT for an identity subject ("google:<id>", "admin:<email>").
pub fn create_jwt(sub: &str, roles: Vec<Role>) -> Result<String, jsonwebtoken::errors::Error> {
    let secret = env::var("JWT_SECRET").expect("JWT_SECRET not set");
    let expiration = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::hours(24))
        .expect("valid timestamp")
        .timestamp() as usize;

    let claims = Claims {
        sub: sub.to_string(),
        exp: expiration,
        roles,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Server-side check of the moderation account credentials. The password is
/// never stored in clear: `ADMIN_PASSWORD_SHA256` carries the hex digest.
pub fn verify_admin_credentials(email: &str, password: &str) -> bool {
    use sha2::{Digest, Sha256};

    let (Ok(expected_email), Ok(expected_digest)) =
        (env::var("ADMIN_EMAIL"), env::var("ADMIN_PASSWORD_SHA256"))
    else {
        return false;
    };
    if email != expected_email {
        return false;
    }
    let digest = hex::encode(Sha256::digest(password.as_bytes()));
    digest.eq_ignore_ascii_case(expected_digest.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_credentials_checked_against_env_digest() {
        std::env::set_var("ADMIN_EMAIL", "jin@namisapo.com");
        // sha256("counselor123")
        std::env::set_var(
            "ADMIN_PASSWORD_SHA256",
            "5efd3d99ffa5347945cb96ce0cfc994d55d76a10ed702336aae44f7919db98a2",
        );
        assert!(verify_admin_credentials("jin@namisapo.com", "counselor123"));
        assert!(!verify_admin_credentials("jin@namisapo.com", "wrong"));
        assert!(!verify_admin_credentials("other@namisapo.com", "counselor123"));
    }
}
