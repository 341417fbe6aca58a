use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use uuid::Uuid;

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait DiaryRepo: Send + Sync {
    /// Public entries, newest first.
    async fn list_public(&self) -> RepoResult<Vec<DiaryEntry>>;
    /// Every entry including private ones (admin console view), newest first.
    async fn list_all(&self) -> RepoResult<Vec<DiaryEntry>>;
    async fn get_entry(&self, id: Id) -> RepoResult<DiaryEntry>;
    /// Assigns a fresh id and creation timestamp; the new entry becomes the
    /// head of the list.
    async fn create_entry(&self, new: NewDiaryEntry) -> RepoResult<DiaryEntry>;
    /// Merges only the provided fields; `created_at` is immutable.
    async fn update_entry(&self, id: Id, upd: UpdateDiaryEntry) -> RepoResult<DiaryEntry>;
    /// Idempotent: deleting an absent id succeeds and changes nothing.
    async fn delete_entry(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    /// Comments of one entry in ascending creation order.
    async fn list_comments(&self, diary_id: Id) -> RepoResult<Vec<Comment>>;
    /// Fails with `NotFound` when the referenced entry does not exist.
    async fn create_comment(&self, new: NewComment) -> RepoResult<Comment>;
}

#[async_trait]
pub trait ProfileRepo: Send + Sync {
    async fn get_profile(&self, id: &str) -> RepoResult<Profile>;
    /// Lazy creation on first authentication. An existing row keeps fields
    /// its owner may have edited (display_name, avatar_url); email is
    /// refreshed and the admin flag can only be widened.
    async fn upsert_profile(&self, profile: Profile) -> RepoResult<Profile>;
    async fn update_profile(&self, id: &str, upd: UpdateProfile) -> RepoResult<Profile>;
    async fn list_profiles(&self) -> RepoResult<Vec<Profile>>;
    async fn set_blocked(&self, id: &str, blocked: bool) -> RepoResult<Profile>;
}

pub trait Repo: DiaryRepo + CommentRepo + ProfileRepo {}

impl<T> Repo for T where T: DiaryRepo + CommentRepo + ProfileRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::path::{Path, PathBuf};

    const SNAPSHOT_PATH: &str = "data/state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        // newest first; create prepends so the head is always the latest entry
        entries: Vec<DiaryEntry>,
        // ascending creation order; create appends
        comments: Vec<Comment>,
        profiles: HashMap<String, Profile>,
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<PathBuf>,
    }

    impl InMemRepo {
        fn data_dir() -> PathBuf {
            std::env::var("KANJOU_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data"))
        }

        fn snapshot_path() -> PathBuf {
            if std::env::var("KANJOU_DATA_DIR").is_ok() {
                let mut p = Self::data_dir();
                p.push("state.json");
                p
            } else {
                PathBuf::from(SNAPSHOT_PATH)
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        log::info!("loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        log::warn!(
                            "failed to parse snapshot '{}': {e}. Starting empty.",
                            path.display()
                        );
                        State::default()
                    }
                },
                Err(e) => {
                    log::info!("no snapshot at '{}': {e}. Starting empty.", path.display());
                    State::default()
                }
            }
        }

        fn persist(&self) {
            let path = self.snapshot_path.clone();
            if let Ok(s) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(&*path, s) {
                    log::error!("failed to write snapshot '{}': {e}", path.display());
                }
            }
        }

        pub fn new() -> Self {
            let snapshot_path = Self::snapshot_path();
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(snapshot_path),
            }
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self { Self::new() }
    }

    #[async_trait]
    impl DiaryRepo for InMemRepo {
        async fn list_public(&self) -> RepoResult<Vec<DiaryEntry>> {
            let s = self.state.read().unwrap();
            Ok(s.entries.iter().filter(|e| e.is_public).cloned().collect())
        }

        async fn list_all(&self) -> RepoResult<Vec<DiaryEntry>> {
            let s = self.state.read().unwrap();
            Ok(s.entries.clone())
        }

        async fn get_entry(&self, id: Id) -> RepoResult<DiaryEntry> {
            let s = self.state.read().unwrap();
            s.entries
                .iter()
                .find(|e| e.id == id)
                .cloned()
                .ok_or(RepoError::NotFound)
        }

        async fn create_entry(&self, new: NewDiaryEntry) -> RepoResult<DiaryEntry> {
            let entry = DiaryEntry {
                id: Uuid::new_v4(),
                user_id: new.user_id,
                nickname: new.nickname,
                content: new.content,
                emotion: new.emotion,
                created_at: Some(Utc::now()),
                is_public: new.is_public,
            };
            let mut s = self.state.write().unwrap();
            s.entries.insert(0, entry.clone());
            drop(s); // release lock before persisting
            self.persist();
            Ok(entry)
        }

        async fn update_entry(&self, id: Id, upd: UpdateDiaryEntry) -> RepoResult<DiaryEntry> {
            let mut s = self.state.write().unwrap();
            let entry = s
                .entries
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or(RepoError::NotFound)?;

            if let Some(nickname) = upd.nickname { entry.nickname = nickname; }
            if let Some(content) = upd.content { entry.content = content; }
            if let Some(emotion) = upd.emotion { entry.emotion = emotion; }
            if let Some(is_public) = upd.is_public { entry.is_public = is_public; }

            let updated = entry.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn delete_entry(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let before = s.entries.len();
            s.entries.retain(|e| e.id != id);
            let removed = s.entries.len() != before;
            if removed {
                // comments are owned per-entry; drop orphans with it
                s.comments.retain(|c| c.diary_id != id);
            }
            drop(s);
            if removed {
                self.persist();
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CommentRepo for InMemRepo {
        async fn list_comments(&self, diary_id: Id) -> RepoResult<Vec<Comment>> {
            let s = self.state.read().unwrap();
            Ok(s.comments
                .iter()
                .filter(|c| c.diary_id == diary_id)
                .cloned()
                .collect())
        }

        async fn create_comment(&self, new: NewComment) -> RepoResult<Comment> {
            let mut s = self.state.write().unwrap();
            if !s.entries.iter().any(|e| e.id == new.diary_id) {
                return Err(RepoError::NotFound);
            }
            let comment = Comment {
                id: Uuid::new_v4(),
                diary_id: new.diary_id,
                user_id: new.user_id,
                nickname: new.nickname,
                content: new.content,
                created_at: Utc::now(),
            };
            s.comments.push(comment.clone());
            drop(s);
            self.persist();
            Ok(comment)
        }
    }

    #[async_trait]
    impl ProfileRepo for InMemRepo {
        async fn get_profile(&self, id: &str) -> RepoResult<Profile> {
            let s = self.state.read().unwrap();
            s.profiles.get(id).cloned().ok_or(RepoError::NotFound)
        }

        async fn upsert_profile(&self, profile: Profile) -> RepoResult<Profile> {
            let mut s = self.state.write().unwrap();
            let merged = match s.profiles.get(&profile.id) {
                Some(existing) => {
                    let mut p = existing.clone();
                    if profile.email.is_some() {
                        p.email = profile.email;
                    }
                    p.is_admin = p.is_admin || profile.is_admin;
                    if p.display_name.is_none() {
                        p.display_name = profile.display_name;
                    }
                    if p.avatar_url.is_none() {
                        p.avatar_url = profile.avatar_url;
                    }
                    p
                }
                None => profile,
            };
            s.profiles.insert(merged.id.clone(), merged.clone());
            drop(s);
            self.persist();
            Ok(merged)
        }

        async fn update_profile(&self, id: &str, upd: UpdateProfile) -> RepoResult<Profile> {
            let mut s = self.state.write().unwrap();
            let profile = s.profiles.get_mut(id).ok_or(RepoError::NotFound)?;
            if let Some(display_name) = upd.display_name { profile.display_name = display_name; }
            if let Some(avatar_url) = upd.avatar_url { profile.avatar_url = avatar_url; }
            let updated = profile.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn list_profiles(&self) -> RepoResult<Vec<Profile>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.profiles.values().cloned().collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(v)
        }

        async fn set_blocked(&self, id: &str, blocked: bool) -> RepoResult<Profile> {
            let mut s = self.state.write().unwrap();
            let profile = s.profiles.get_mut(id).ok_or(RepoError::NotFound)?;
            profile.is_blocked = blocked;
            let updated = profile.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use chrono::{DateTime, Utc};
    use sqlx::{FromRow, Pool, Postgres};

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }
    }

    fn internal(e: sqlx::Error) -> RepoError {
        RepoError::Internal(e.to_string())
    }

    // Row types keep the SQL mapping out of the domain models; `emotion`
    // travels as text and unknown tags degrade to untagged on read.
    #[derive(FromRow)]
    struct DiaryRow {
        id: Uuid,
        user_id: Option<String>,
        nickname: Option<String>,
        content: String,
        emotion: Option<String>,
        created_at: Option<DateTime<Utc>>,
        is_public: bool,
    }

    impl From<DiaryRow> for DiaryEntry {
        fn from(r: DiaryRow) -> Self {
            DiaryEntry {
                id: r.id,
                user_id: r.user_id,
                nickname: r.nickname,
                content: r.content,
                emotion: r.emotion.as_deref().and_then(|e| e.parse().ok()),
                created_at: r.created_at,
                is_public: r.is_public,
            }
        }
    }

    #[derive(FromRow)]
    struct CommentRow {
        id: Uuid,
        diary_id: Uuid,
        user_id: Option<String>,
        nickname: Option<String>,
        content: String,
        created_at: DateTime<Utc>,
    }

    impl From<CommentRow> for Comment {
        fn from(r: CommentRow) -> Self {
            Comment {
                id: r.id,
                diary_id: r.diary_id,
                user_id: r.user_id,
                nickname: r.nickname,
                content: r.content,
                created_at: r.created_at,
            }
        }
    }

    #[derive(FromRow)]
    struct ProfileRow {
        id: String,
        email: Option<String>,
        display_name: Option<String>,
        avatar_url: Option<String>,
        is_admin: bool,
        is_blocked: bool,
        created_at: DateTime<Utc>,
    }

    impl From<ProfileRow> for Profile {
        fn from(r: ProfileRow) -> Self {
            Profile {
                id: r.id,
                email: r.email,
                display_name: r.display_name,
                avatar_url: r.avatar_url,
                is_admin: r.is_admin,
                is_blocked: r.is_blocked,
                created_at: r.created_at,
            }
        }
    }

    const DIARY_COLS: &str = "id, user_id, nickname, content, emotion, created_at, is_public";
    const PROFILE_COLS: &str =
        "id, email, display_name, avatar_url, is_admin, is_blocked, created_at";

    #[async_trait]
    impl DiaryRepo for PgRepo {
        async fn list_public(&self) -> RepoResult<Vec<DiaryEntry>> {
            let rows = sqlx::query_as::<_, DiaryRow>(&format!(
                "SELECT {DIARY_COLS} FROM diary WHERE is_public = TRUE \
                 ORDER BY created_at DESC NULLS LAST"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;
            Ok(rows.into_iter().map(Into::into).collect())
        }

        async fn list_all(&self) -> RepoResult<Vec<DiaryEntry>> {
            let rows = sqlx::query_as::<_, DiaryRow>(&format!(
                "SELECT {DIARY_COLS} FROM diary ORDER BY created_at DESC NULLS LAST"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;
            Ok(rows.into_iter().map(Into::into).collect())
        }

        async fn get_entry(&self, id: Id) -> RepoResult<DiaryEntry> {
            let row = sqlx::query_as::<_, DiaryRow>(&format!(
                "SELECT {DIARY_COLS} FROM diary WHERE id = $1"
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
            row.map(Into::into).ok_or(RepoError::NotFound)
        }

        async fn create_entry(&self, new: NewDiaryEntry) -> RepoResult<DiaryEntry> {
            let row = sqlx::query_as::<_, DiaryRow>(&format!(
                "INSERT INTO diary (id, user_id, nickname, content, emotion, created_at, is_public) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {DIARY_COLS}"
            ))
            .bind(Uuid::new_v4())
            .bind(&new.user_id)
            .bind(&new.nickname)
            .bind(&new.content)
            .bind(new.emotion.map(|e| e.as_str().to_string()))
            .bind(Utc::now())
            .bind(new.is_public)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)?;
            Ok(row.into())
        }

        async fn update_entry(&self, id: Id, upd: UpdateDiaryEntry) -> RepoResult<DiaryEntry> {
            // Each pair (set_x, x) merges one field; unset pairs keep the column.
            let row = sqlx::query_as::<_, DiaryRow>(&format!(
                "UPDATE diary SET \
                   nickname  = CASE WHEN $2 THEN $3 ELSE nickname END, \
                   content   = COALESCE($4, content), \
                   emotion   = CASE WHEN $5 THEN $6 ELSE emotion END, \
                   is_public = COALESCE($7, is_public) \
                 WHERE id = $1 RETURNING {DIARY_COLS}"
            ))
            .bind(id)
            .bind(upd.nickname.is_some())
            .bind(upd.nickname.flatten())
            .bind(upd.content)
            .bind(upd.emotion.is_some())
            .bind(upd.emotion.flatten().map(|e| e.as_str().to_string()))
            .bind(upd.is_public)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
            row.map(Into::into).ok_or(RepoError::NotFound)
        }

        async fn delete_entry(&self, id: Id) -> RepoResult<()> {
            // comments reference diary with ON DELETE CASCADE; absent ids
            // delete zero rows and still succeed
            sqlx::query("DELETE FROM diary WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(internal)?;
            Ok(())
        }
    }

    #[async_trait]
    impl CommentRepo for PgRepo {
        async fn list_comments(&self, diary_id: Id) -> RepoResult<Vec<Comment>> {
            let rows = sqlx::query_as::<_, CommentRow>(
                "SELECT id, diary_id, user_id, nickname, content, created_at \
                 FROM comments WHERE diary_id = $1 ORDER BY created_at ASC",
            )
            .bind(diary_id)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;
            Ok(rows.into_iter().map(Into::into).collect())
        }

        async fn create_comment(&self, new: NewComment) -> RepoResult<Comment> {
            let row = sqlx::query_as::<_, CommentRow>(
                "INSERT INTO comments (id, diary_id, user_id, nickname, content, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 RETURNING id, diary_id, user_id, nickname, content, created_at",
            )
            .bind(Uuid::new_v4())
            .bind(new.diary_id)
            .bind(&new.user_id)
            .bind(&new.nickname)
            .bind(&new.content)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            // FK violation on diary_id → the entry does not exist
            .map_err(|_| RepoError::NotFound)?;
            Ok(row.into())
        }
    }

    #[async_trait]
    impl ProfileRepo for PgRepo {
        async fn get_profile(&self, id: &str) -> RepoResult<Profile> {
            let row = sqlx::query_as::<_, ProfileRow>(&format!(
                "SELECT {PROFILE_COLS} FROM profiles WHERE id = $1"
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
            row.map(Into::into).ok_or(RepoError::NotFound)
        }

        async fn upsert_profile(&self, profile: Profile) -> RepoResult<Profile> {
            let row = sqlx::query_as::<_, ProfileRow>(&format!(
                "INSERT INTO profiles (id, email, display_name, avatar_url, is_admin, is_blocked, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT (id) DO UPDATE SET \
                   email        = COALESCE(EXCLUDED.email, profiles.email), \
                   display_name = COALESCE(profiles.display_name, EXCLUDED.display_name), \
                   avatar_url   = COALESCE(profiles.avatar_url, EXCLUDED.avatar_url), \
                   is_admin     = profiles.is_admin OR EXCLUDED.is_admin \
                 RETURNING {PROFILE_COLS}"
            ))
            .bind(&profile.id)
            .bind(&profile.email)
            .bind(&profile.display_name)
            .bind(&profile.avatar_url)
            .bind(profile.is_admin)
            .bind(profile.is_blocked)
            .bind(profile.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)?;
            Ok(row.into())
        }

        async fn update_profile(&self, id: &str, upd: UpdateProfile) -> RepoResult<Profile> {
            let row = sqlx::query_as::<_, ProfileRow>(&format!(
                "UPDATE profiles SET \
                   display_name = CASE WHEN $2 THEN $3 ELSE display_name END, \
                   avatar_url   = CASE WHEN $4 THEN $5 ELSE avatar_url END \
                 WHERE id = $1 RETURNING {PROFILE_COLS}"
            ))
            .bind(id)
            .bind(upd.display_name.is_some())
            .bind(upd.display_name.flatten())
            .bind(upd.avatar_url.is_some())
            .bind(upd.avatar_url.flatten())
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
            row.map(Into::into).ok_or(RepoError::NotFound)
        }

        async fn list_profiles(&self) -> RepoResult<Vec<Profile>> {
            let rows = sqlx::query_as::<_, ProfileRow>(&format!(
                "SELECT {PROFILE_COLS} FROM profiles ORDER BY created_at DESC"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;
            Ok(rows.into_iter().map(Into::into).collect())
        }

        async fn set_blocked(&self, id: &str, blocked: bool) -> RepoResult<Profile> {
            let row = sqlx::query_as::<_, ProfileRow>(&format!(
                "UPDATE profiles SET is_blocked = $2 WHERE id = $1 RETURNING {PROFILE_COLS}"
            ))
            .bind(id)
            .bind(blocked)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
            row.map(Into::into).ok_or(RepoError::NotFound)
        }
    }
}
