use crate::models::{
    Comment, DiaryEntry, Emotion, NewComment, NewDiaryEntry, Profile, UpdateDiaryEntry,
    UpdateProfile,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::list_entries,
        crate::routes::create_entry,
        crate::routes::get_entry,
        crate::routes::update_entry,
        crate::routes::delete_entry,
        crate::routes::list_comments,
        crate::routes::create_comment,
        crate::routes::get_profile,
        crate::routes::update_profile,
        crate::routes::admin_login,
        crate::routes::auth_me,
        crate::routes::admin_create_announcement,
    ),
    components(schemas(
        DiaryEntry, NewDiaryEntry, UpdateDiaryEntry, Emotion,
        Comment, NewComment, Profile, UpdateProfile,
        crate::routes::CreateEntryRequest, crate::routes::CreateCommentRequest,
        crate::routes::AdminLoginRequest, crate::routes::TokenResponse,
        crate::routes::AnnouncementRequest,
    )),
    tags(
        (name = "diaries", description = "Diary entry operations"),
        (name = "comments", description = "Comment operations"),
        (name = "profiles", description = "Profile operations"),
    )
)]
pub struct ApiDoc;
