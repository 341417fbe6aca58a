use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{NaiveDate, Utc};

use crate::auth::{Auth, Role};
use crate::error::ApiError;
use crate::filter::{apply_filters, FilterSpec};
use crate::models::*;
use crate::oauth;
use crate::rate_limit::RateLimiterFacade;
use crate::repo::Repo;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(
                web::resource("/diaries")
                    .route(web::get().to(list_entries))
                    .route(web::post().to(create_entry)),
            )
            .service(
                web::resource("/diaries/{id}")
                    .route(web::get().to(get_entry))
                    .route(web::patch().to(update_entry))
                    .route(web::delete().to(delete_entry)),
            )
            .service(web::resource("/diaries/{id}/comments").route(web::get().to(list_comments)))
            .service(web::resource("/comments").route(web::post().to(create_comment)))
            .service(
                web::resource("/profiles/{id}")
                    .route(web::get().to(get_profile))
                    .route(web::patch().to(update_profile)),
            )
            .service(web::resource("/auth/google/login").route(web::get().to(google_login)))
            .service(web::resource("/auth/google/callback").route(web::get().to(google_callback)))
            .service(web::resource("/auth/admin/login").route(web::post().to(admin_login)))
            .service(web::resource("/auth/refresh").route(web::post().to(refresh_token)))
            .service(web::resource("/auth/me").route(web::get().to(auth_me)))
            // Admin console endpoints
            .service(web::resource("/admin/users").route(web::get().to(admin_list_users)))
            .service(
                web::resource("/admin/users/{id}/block").route(web::post().to(admin_block_user)),
            )
            .service(
                web::resource("/admin/users/{id}/unblock")
                    .route(web::post().to(admin_unblock_user)),
            )
            .service(web::resource("/admin/diaries").route(web::get().to(admin_list_entries)))
            .service(
                web::resource("/admin/diaries/{id}").route(web::delete().to(admin_delete_entry)),
            )
            .service(
                web::resource("/admin/announcements")
                    .route(web::post().to(admin_create_announcement)),
            ),
    );
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub rate_limiter: Option<RateLimiterFacade>,
}

// ---------------- helpers ----------------------------------------------

macro_rules! ensure_admin { ($auth:expr) => { if !$auth.0.is_admin() { return Err(ApiError::Forbidden); } }; }

fn client_ip(req: &HttpRequest) -> String {
    req.peer_addr()
        .map(|a| a.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Trimmed, non-blank, within the shared character budget.
fn validate_content(raw: &str) -> Result<String, ApiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_CONTENT_CHARS {
        return Err(ApiError::BadRequest);
    }
    Ok(trimmed.to_string())
}

fn normalize_nickname(nickname: Option<String>) -> Option<String> {
    nickname.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

fn can_view(entry: &DiaryEntry, auth: &Option<Auth>) -> bool {
    if entry.is_public {
        return true;
    }
    match auth {
        Some(a) => a.0.is_admin() || entry.user_id.as_deref() == Some(a.0.sub.as_str()),
        None => false,
    }
}

/// Blocked identities cannot write. Identities without a profile yet (fresh
/// OAuth subjects) are treated as unblocked.
async fn ensure_not_blocked(data: &AppState, auth: &Option<Auth>) -> Result<(), ApiError> {
    if let Some(a) = auth {
        match data.repo.get_profile(&a.0.sub).await {
            Ok(p) if p.is_blocked => return Err(ApiError::Forbidden),
            _ => {}
        }
    }
    Ok(())
}

// ---------------- board ------------------------------------------------

#[derive(Debug, serde::Deserialize, utoipa::IntoParams)]
pub struct EntryListQuery {
    pub keyword: Option<String>,
    pub username: Option<String>,
    pub emotion: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

impl TryFrom<EntryListQuery> for FilterSpec {
    type Error = ApiError;

    fn try_from(q: EntryListQuery) -> Result<Self, ApiError> {
        fn parse_emotion(raw: Option<String>) -> Result<Option<Emotion>, ApiError> {
            match raw.as_deref().map(str::trim) {
                None | Some("") => Ok(None),
                Some(tag) => tag.parse().map(Some).map_err(|_| ApiError::BadRequest),
            }
        }
        fn parse_date(raw: Option<String>) -> Result<Option<NaiveDate>, ApiError> {
            match raw.as_deref().map(str::trim) {
                None | Some("") => Ok(None),
                Some(d) => d.parse().map(Some).map_err(|_| ApiError::BadRequest),
            }
        }
        Ok(FilterSpec {
            keyword: q.keyword.unwrap_or_default(),
            username: q.username.unwrap_or_default(),
            emotion: parse_emotion(q.emotion)?,
            date_from: parse_date(q.date_from)?,
            date_to: parse_date(q.date_to)?,
        })
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/diaries",
    params(EntryListQuery),
    responses(
        (status = 200, description = "Public entries, newest first, filtered", body = [DiaryEntry]),
        (status = 400, description = "Unknown emotion tag or malformed date")
    )
)]
pub async fn list_entries(
    data: web::Data<AppState>,
    query: web::Query<EntryListQuery>,
) -> Result<HttpResponse, ApiError> {
    let spec = FilterSpec::try_from(query.into_inner())?;
    // a failed read degrades to an empty board, never an error page
    let entries = match data.repo.list_public().await {
        Ok(v) => v,
        Err(e) => {
            log::error!("listing entries failed: {e}");
            Vec::new()
        }
    };
    Ok(HttpResponse::Ok().json(apply_filters(entries, &spec)))
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct CreateEntryRequest {
    pub nickname: Option<String>,
    pub content: String,
    pub emotion: Option<Emotion>,
    /// Defaults to public; only public entries are ever listed.
    pub is_public: Option<bool>,
}

#[utoipa::path(
    post,
    path = "/api/v1/diaries",
    request_body = CreateEntryRequest,
    responses(
        (status = 201, description = "Entry created", body = DiaryEntry),
        (status = 400, description = "Blank or over-long content"),
        (status = 403, description = "Author is blocked"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn create_entry(
    req: HttpRequest,
    auth: Option<Auth>,
    data: web::Data<AppState>,
    payload: web::Json<CreateEntryRequest>,
) -> Result<HttpResponse, ApiError> {
    if let Some(rl) = &data.rate_limiter {
        if !rl.allow_entry(&client_ip(&req)) {
            return Err(ApiError::RateLimited);
        }
    }
    ensure_not_blocked(&data, &auth).await?;

    let payload = payload.into_inner();
    let content = validate_content(&payload.content)?;
    let entry = data
        .repo
        .create_entry(NewDiaryEntry {
            user_id: auth.map(|a| a.0.sub),
            nickname: normalize_nickname(payload.nickname),
            content,
            emotion: payload.emotion,
            is_public: payload.is_public.unwrap_or(true),
        })
        .await?;
    Ok(HttpResponse::Created().json(entry))
}

#[utoipa::path(
    get,
    path = "/api/v1/diaries/{id}",
    params(("id" = Id, Path, description = "Entry id")),
    responses(
        (status = 200, description = "Entry", body = DiaryEntry),
        (status = 404, description = "Absent or private entry")
    )
)]
pub async fn get_entry(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let entry = data.repo.get_entry(path.into_inner()).await?;
    if !can_view(&entry, &auth) {
        return Err(ApiError::NotFound);
    }
    Ok(HttpResponse::Ok().json(entry))
}

#[utoipa::path(
    patch,
    path = "/api/v1/diaries/{id}",
    request_body = UpdateDiaryEntry,
    params(("id" = Id, Path, description = "Entry id")),
    responses(
        (status = 200, description = "Entry updated", body = DiaryEntry),
        (status = 403, description = "Not the author and not an admin"),
        (status = 404, description = "Entry not found")
    )
)]
pub async fn update_entry(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateDiaryEntry>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let entry = data.repo.get_entry(id).await?;
    let is_owner = entry.user_id.as_deref() == Some(auth.0.sub.as_str());
    if !is_owner && !auth.0.is_admin() {
        return Err(ApiError::Forbidden);
    }

    let mut upd = payload.into_inner();
    if let Some(content) = upd.content.take() {
        upd.content = Some(validate_content(&content)?);
    }
    if let Some(nickname) = upd.nickname.take() {
        upd.nickname = Some(nickname.and_then(|n| normalize_nickname(Some(n))));
    }
    let updated = data.repo.update_entry(id, upd).await?;
    Ok(HttpResponse::Ok().json(updated))
}

#[utoipa::path(
    delete,
    path = "/api/v1/diaries/{id}",
    params(("id" = Id, Path, description = "Entry id")),
    responses(
        (status = 204, description = "Entry deleted"),
        (status = 403, description = "Not the author and not an admin"),
        (status = 404, description = "Entry not found")
    )
)]
pub async fn delete_entry(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let entry = data.repo.get_entry(id).await?;
    let is_owner = entry.user_id.as_deref() == Some(auth.0.sub.as_str());
    if !is_owner && !auth.0.is_admin() {
        return Err(ApiError::Forbidden);
    }
    data.repo.delete_entry(id).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ---------------- comments ---------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/diaries/{id}/comments",
    params(("id" = Id, Path, description = "Entry id")),
    responses(
        (status = 200, description = "Comments, oldest first", body = [Comment]),
        (status = 404, description = "Absent or private entry")
    )
)]
pub async fn list_comments(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let diary_id = path.into_inner();
    let entry = data.repo.get_entry(diary_id).await?;
    if !can_view(&entry, &auth) {
        return Err(ApiError::NotFound);
    }
    let comments = match data.repo.list_comments(diary_id).await {
        Ok(v) => v,
        Err(e) => {
            log::error!("listing comments for {diary_id} failed: {e}");
            Vec::new()
        }
    };
    Ok(HttpResponse::Ok().json(comments))
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct CreateCommentRequest {
    pub diary_id: Id,
    pub nickname: Option<String>,
    pub content: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/comments",
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment created", body = Comment),
        (status = 400, description = "Blank or over-long content"),
        (status = 404, description = "Entry not found"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn create_comment(
    req: HttpRequest,
    auth: Option<Auth>,
    data: web::Data<AppState>,
    payload: web::Json<CreateCommentRequest>,
) -> Result<HttpResponse, ApiError> {
    if let Some(rl) = &data.rate_limiter {
        if !rl.allow_comment(&client_ip(&req)) {
            return Err(ApiError::RateLimited);
        }
    }
    ensure_not_blocked(&data, &auth).await?;

    let payload = payload.into_inner();
    let content = validate_content(&payload.content)?;
    let entry = data.repo.get_entry(payload.diary_id).await?;
    if !can_view(&entry, &auth) {
        return Err(ApiError::NotFound);
    }
    let comment = data
        .repo
        .create_comment(NewComment {
            diary_id: payload.diary_id,
            user_id: auth.map(|a| a.0.sub),
            nickname: normalize_nickname(payload.nickname),
            content,
        })
        .await?;
    Ok(HttpResponse::Created().json(comment))
}

// ---------------- profiles ---------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/profiles/{id}",
    params(("id" = String, Path, description = "Profile id")),
    responses(
        (status = 200, description = "Profile", body = Profile),
        (status = 403, description = "Not the owner and not an admin"),
        (status = 404, description = "Profile not found")
    )
)]
pub async fn get_profile(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    if auth.0.sub != id && !auth.0.is_admin() {
        return Err(ApiError::Forbidden);
    }
    let profile = data.repo.get_profile(&id).await?;
    Ok(HttpResponse::Ok().json(profile))
}

#[utoipa::path(
    patch,
    path = "/api/v1/profiles/{id}",
    request_body = UpdateProfile,
    params(("id" = String, Path, description = "Profile id")),
    responses(
        (status = 200, description = "Profile updated", body = Profile),
        (status = 403, description = "Not the owner and not an admin"),
        (status = 404, description = "Profile not found")
    )
)]
pub async fn update_profile(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UpdateProfile>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    if auth.0.sub != id && !auth.0.is_admin() {
        return Err(ApiError::Forbidden);
    }
    let profile = data.repo.update_profile(&id, payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(profile))
}

// ---------------- auth --------------------------------------------------

pub async fn google_login() -> Result<HttpResponse, ApiError> {
    // Graceful degradation: 503 JSON when Google OAuth isn't configured
    let Some(cfg) = oauth::OAuthConfig::from_env() else {
        return Ok(HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "error": "google_oauth_not_configured",
            "message": "Set GOOGLE_CLIENT_ID / GOOGLE_CLIENT_SECRET to enable Google login"
        })));
    };
    Ok(HttpResponse::Found()
        .insert_header(("Location", cfg.authorize_url()))
        .finish())
}

#[derive(serde::Deserialize)]
pub struct GoogleCallback {
    code: String,
}

pub async fn google_callback(
    query: web::Query<GoogleCallback>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let Some(cfg) = oauth::OAuthConfig::from_env() else {
        return Ok(HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "error": "google_oauth_not_configured"
        })));
    };

    // A failed exchange is reported and leaves every session state untouched.
    let user = oauth::exchange_code(&cfg, &query.code).await.map_err(|e| {
        log::error!("google code exchange failed: {e:#}");
        ApiError::Unauthorized
    })?;

    // Lazy profile creation on first authentication.
    let sub = format!("google:{}", user.sub);
    let profile = data
        .repo
        .upsert_profile(Profile {
            id: sub.clone(),
            email: user.email,
            display_name: user.name,
            avatar_url: user.picture,
            is_admin: false,
            is_blocked: false,
            created_at: Utc::now(),
        })
        .await?;

    let roles = if profile.is_admin { vec![Role::Admin, Role::User] } else { vec![Role::User] };
    let jwt = crate::auth::create_jwt(&sub, roles).map_err(|_| ApiError::Internal)?;

    let frontend_url =
        std::env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5173".to_string());
    Ok(HttpResponse::Found()
        .insert_header(("Location", format!("{}/?token={}", frontend_url, jwt)))
        .finish())
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct AdminLoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct TokenResponse {
    pub token: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/admin/login",
    request_body = AdminLoginRequest,
    responses(
        (status = 200, description = "Admin token issued", body = TokenResponse),
        (status = 401, description = "Wrong credentials")
    )
)]
pub async fn admin_login(
    data: web::Data<AppState>,
    payload: web::Json<AdminLoginRequest>,
) -> Result<HttpResponse, ApiError> {
    if !crate::auth::verify_admin_credentials(&payload.email, &payload.password) {
        return Err(ApiError::Unauthorized);
    }

    let sub = format!("admin:{}", payload.email);
    data.repo
        .upsert_profile(Profile {
            id: sub.clone(),
            email: Some(payload.email.clone()),
            display_name: Some("管理者".to_string()),
            avatar_url: None,
            is_admin: true,
            is_blocked: false,
            created_at: Utc::now(),
        })
        .await?;

    let jwt = crate::auth::create_jwt(&sub, vec![Role::Admin, Role::User])
        .map_err(|_| ApiError::Internal)?;
    Ok(HttpResponse::Ok().json(TokenResponse { token: jwt }))
}

pub async fn refresh_token(auth: Auth) -> Result<HttpResponse, ApiError> {
    let jwt = crate::auth::create_jwt(&auth.0.sub, auth.0.roles.clone())
        .map_err(|_| ApiError::Internal)?;
    Ok(HttpResponse::Ok().json(TokenResponse { token: jwt }))
}

#[derive(serde::Serialize)]
struct MeResponse {
    id: String,
    role: String,
    profile: Option<Profile>,
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Current identity and profile"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn auth_me(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let role = if auth.0.is_admin() { "admin" } else { "user" };
    // the profile may not exist yet; that is not an error for /me
    let profile = data.repo.get_profile(&auth.0.sub).await.ok();
    Ok(HttpResponse::Ok().json(MeResponse {
        id: auth.0.sub.clone(),
        role: role.to_string(),
        profile,
    }))
}

// ---------------- admin console ----------------------------------------

#[derive(Debug, serde::Deserialize, utoipa::IntoParams)]
pub struct AdminSearchQuery {
    /// Substring search over the visible columns of the tab.
    pub q: Option<String>,
}

pub async fn admin_list_users(
    auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<AdminSearchQuery>,
) -> Result<HttpResponse, ApiError> {
    ensure_admin!(auth);
    let mut users = data.repo.list_profiles().await?;
    if let Some(q) = query.into_inner().q.filter(|q| !q.trim().is_empty()) {
        let q = q.trim().to_lowercase();
        users.retain(|u| {
            u.display_name.as_deref().map_or(false, |n| n.to_lowercase().contains(&q))
                || u.email.as_deref().map_or(false, |e| e.to_lowercase().contains(&q))
        });
    }
    Ok(HttpResponse::Ok().json(users))
}

pub async fn admin_block_user(auth: Auth, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    ensure_admin!(auth);
    let profile = data.repo.set_blocked(&path.into_inner(), true).await?;
    Ok(HttpResponse::Ok().json(profile))
}

pub async fn admin_unblock_user(auth: Auth, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    ensure_admin!(auth);
    let profile = data.repo.set_blocked(&path.into_inner(), false).await?;
    Ok(HttpResponse::Ok().json(profile))
}

pub async fn admin_list_entries(
    auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<AdminSearchQuery>,
) -> Result<HttpResponse, ApiError> {
    ensure_admin!(auth);
    let mut entries = data.repo.list_all().await?;
    if let Some(q) = query.into_inner().q.filter(|q| !q.trim().is_empty()) {
        let q = q.trim().to_lowercase();
        entries.retain(|e| {
            e.content.to_lowercase().contains(&q)
                || e.nickname.as_deref().map_or(false, |n| n.to_lowercase().contains(&q))
        });
    }
    Ok(HttpResponse::Ok().json(entries))
}

pub async fn admin_delete_entry(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    ensure_admin!(auth);
    data.repo.delete_entry(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct AnnouncementRequest {
    pub title: String,
    pub content: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/announcements",
    request_body = AnnouncementRequest,
    responses(
        (status = 201, description = "Announcement posted", body = DiaryEntry),
        (status = 400, description = "Blank title/content or over budget"),
        (status = 403, description = "Forbidden - admins only")
    )
)]
pub async fn admin_create_announcement(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<AnnouncementRequest>,
) -> Result<HttpResponse, ApiError> {
    ensure_admin!(auth);
    let payload = payload.into_inner();
    let title = payload.title.trim();
    let body = payload.content.trim();
    if title.is_empty() || body.is_empty() {
        return Err(ApiError::BadRequest);
    }
    let content = validate_content(&format!("【{}】\n\n{}", title, body))?;

    let nickname = data
        .repo
        .get_profile(&auth.0.sub)
        .await
        .ok()
        .and_then(|p| p.display_name)
        .unwrap_or_else(|| "管理者".to_string());

    let entry = data
        .repo
        .create_entry(NewDiaryEntry {
            user_id: Some(auth.0.sub),
            nickname: Some(nickname),
            content,
            emotion: None,
            is_public: true,
        })
        .await?;
    Ok(HttpResponse::Created().json(entry))
}
