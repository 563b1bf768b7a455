use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use perch_db::models::UserUpdate;
use perch_db::{Database, is_constraint_violation};
use perch_types::api::{
    Claims, MediaUploadResponse, OffsetQuery, ProfilePictureResponse, UpdateUserRequest, UserView,
};

use crate::auth::{AppState, validate_email, validate_username};
use crate::enrich::Enricher;
use crate::error::{ApiError, ApiResult};
use crate::media::{MediaMethod, new_object_key};
use crate::pagination::resolve_offset;
use crate::run_blocking;
use crate::visibility::VisibilityPolicy;

#[derive(Clone)]
pub struct UserService {
    db: Arc<Database>,
    policy: VisibilityPolicy,
    enricher: Enricher,
}

impl UserService {
    pub fn new(db: Arc<Database>, policy: VisibilityPolicy, enricher: Enricher) -> Self {
        Self { db, policy, enricher }
    }

    pub fn me(&self, actor: Uuid) -> ApiResult<UserView> {
        self.enricher.user_by_id(actor)?.ok_or(ApiError::NotFound)
    }

    /// A profile is content: private accounts are NotFound to non-followers.
    pub fn get_user(&self, viewer: Uuid, user_id: Uuid) -> ApiResult<UserView> {
        let row = self.policy.ensure_owner_visible(viewer, user_id)?;
        Ok(self.enricher.user_view(&row))
    }

    /// Discovery by username fragment. Not visibility-gated: only the public
    /// summary is returned.
    pub fn search_by_username(&self, fragment: &str, query: &OffsetQuery) -> ApiResult<Vec<UserView>> {
        let page = resolve_offset(query)?;
        let rows = self.db.search_users_by_username(fragment, page)?;
        Ok(rows.iter().map(|row| self.enricher.user_view(row)).collect())
    }

    pub fn update_me(&self, actor: Uuid, req: &UpdateUserRequest) -> ApiResult<UserView> {
        if let Some(username) = &req.username {
            validate_username(username)?;
        }
        if let Some(email) = &req.email {
            validate_email(email)?;
        }
        if let Some(name) = &req.name {
            if name.trim().is_empty() {
                return Err(ApiError::validation("name must not be empty"));
            }
        }

        let update = UserUpdate {
            name: req.name.as_deref(),
            username: req.username.as_deref(),
            email: req.email.as_deref(),
            public_account: req.public_account,
        };

        let updated = self.db.update_user(&actor.to_string(), &update).map_err(|e| {
            if is_constraint_violation(&e) {
                ApiError::Conflict("USERNAME_OR_EMAIL_TAKEN")
            } else {
                ApiError::Internal(e)
            }
        })?;
        if !updated {
            return Err(ApiError::NotFound);
        }

        info!("{} updated their profile", actor);
        self.me(actor)
    }

    /// Delete the account. Posts, comments, reactions, follow edges and
    /// messages go with it.
    pub fn delete_me(&self, actor: Uuid) -> ApiResult<()> {
        if !self.db.delete_user(&actor.to_string())? {
            return Err(ApiError::NotFound);
        }
        info!("{} deleted their account", actor);
        Ok(())
    }

    /// Accounts worth suggesting: not the actor, and either public or already
    /// followed by someone the actor follows. Pages over all accounts by id, so
    /// a page may come back short.
    pub fn recommendations(&self, actor: Uuid, query: &OffsetQuery) -> ApiResult<Vec<UserView>> {
        let page = resolve_offset(query)?;
        let actor_id = actor.to_string();

        let mut out = Vec::new();
        for row in self.db.list_users(page)? {
            if row.id == actor_id {
                continue;
            }
            if row.public_account || self.db.is_followed_by_followee(&actor_id, &row.id)? {
                out.push(self.enricher.user_view(&row));
            }
        }
        Ok(out)
    }

    pub fn profile_picture_url(&self, actor: Uuid) -> ApiResult<ProfilePictureResponse> {
        let row = self
            .db
            .get_user_by_id(&actor.to_string())?
            .ok_or(ApiError::NotFound)?;
        let url = row
            .profile_picture_key
            .as_deref()
            .map(|key| self.enricher.media().sign(key, MediaMethod::Get));
        Ok(ProfilePictureResponse { url })
    }

    /// Point the profile picture at a fresh key and hand back a PUT URL for it.
    pub fn profile_picture_upload_url(&self, actor: Uuid) -> ApiResult<MediaUploadResponse> {
        let object_key = new_object_key(&format!("users/{}", actor), "jpeg");
        if !self.db.set_profile_picture_key(&actor.to_string(), &object_key)? {
            return Err(ApiError::NotFound);
        }

        let put_url = self.enricher.media().sign(&object_key, MediaMethod::Put);
        Ok(MediaUploadResponse { put_url, object_key })
    }
}

// -- Handlers --

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user = run_blocking(state, move |s| s.users.me(claims.sub)).await?;
    Ok(Json(user))
}

pub async fn get_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user = run_blocking(state, move |s| s.users.get_user(claims.sub, user_id)).await?;
    Ok(Json(user))
}

pub async fn search_by_username(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<OffsetQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let users = run_blocking(state, move |s| s.users.search_by_username(&username, &query)).await?;
    Ok(Json(users))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = run_blocking(state, move |s| s.users.update_me(claims.sub, &req)).await?;
    Ok(Json(user))
}

pub async fn delete_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    run_blocking(state, move |s| s.users.delete_me(claims.sub)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn recommendations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<OffsetQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let users = run_blocking(state, move |s| s.users.recommendations(claims.sub, &query)).await?;
    Ok(Json(users))
}

pub async fn profile_picture(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let picture = run_blocking(state, move |s| s.users.profile_picture_url(claims.sub)).await?;
    Ok(Json(picture))
}

pub async fn profile_picture_upload(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let upload = run_blocking(state, move |s| s.users.profile_picture_upload_url(claims.sub)).await?;
    Ok(Json(upload))
}
