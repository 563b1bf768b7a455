use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use perch_db::{Database, is_constraint_violation};
use perch_types::api::{Claims, FollowResponse};

use crate::auth::AppState;
use crate::convert::follow_response;
use crate::error::{ApiError, ApiResult};
use crate::run_blocking;
use crate::visibility::VisibilityPolicy;

#[derive(Clone)]
pub struct FollowService {
    db: Arc<Database>,
    policy: VisibilityPolicy,
}

impl FollowService {
    pub fn new(db: Arc<Database>, policy: VisibilityPolicy) -> Self {
        Self { db, policy }
    }

    pub fn follow(&self, follower: Uuid, followed: Uuid) -> ApiResult<FollowResponse> {
        if follower == followed {
            return Err(ApiError::Conflict("CANNOT_FOLLOW_YOURSELF"));
        }

        let (follower_id, followed_id) = (follower.to_string(), followed.to_string());
        if self.db.get_user_by_id(&followed_id)?.is_none() {
            return Err(ApiError::NotFound);
        }
        if self.db.is_following(&follower_id, &followed_id)? {
            return Err(ApiError::Conflict("ALREADY_FOLLOWED"));
        }

        let inserted = self.db.insert_follow(&follower_id, &followed_id).map_err(|e| {
            if is_constraint_violation(&e) {
                ApiError::NotFound
            } else {
                ApiError::Internal(e)
            }
        })?;

        match inserted {
            Some(row) => {
                info!("{} followed {}", follower, followed);
                Ok(follow_response(&row))
            }
            None => {
                warn!("lost a follow race between {} and {}", follower, followed);
                Err(ApiError::Conflict("ALREADY_FOLLOWED"))
            }
        }
    }

    pub fn unfollow(&self, follower: Uuid, followed: Uuid) -> ApiResult<FollowResponse> {
        let removed = self
            .db
            .delete_follow(&follower.to_string(), &followed.to_string())?
            .ok_or(ApiError::Conflict("NOT_FOLLOWED"))?;

        info!("{} unfollowed {}", follower, followed);
        Ok(follow_response(&removed))
    }

    /// Who follows `user`. The account itself has to be visible to the viewer.
    pub fn followers(&self, viewer: Uuid, user: Uuid) -> ApiResult<Vec<FollowResponse>> {
        self.policy.ensure_owner_visible(viewer, user)?;
        let rows = self.db.get_followers(&user.to_string())?;
        Ok(rows.iter().map(follow_response).collect())
    }

    /// Who `user` follows. The account itself has to be visible to the viewer.
    pub fn following(&self, viewer: Uuid, user: Uuid) -> ApiResult<Vec<FollowResponse>> {
        self.policy.ensure_owner_visible(viewer, user)?;
        let rows = self.db.get_following(&user.to_string())?;
        Ok(rows.iter().map(follow_response).collect())
    }
}

// -- Handlers --

pub async fn follow(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let edge = run_blocking(state, move |s| s.follows.follow(claims.sub, user_id)).await?;
    Ok((StatusCode::CREATED, Json(edge)))
}

pub async fn unfollow(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let edge = run_blocking(state, move |s| s.follows.unfollow(claims.sub, user_id)).await?;
    Ok(Json(edge))
}

pub async fn followers(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let edges = run_blocking(state, move |s| s.follows.followers(claims.sub, user_id)).await?;
    Ok(Json(edges))
}

pub async fn following(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let edges = run_blocking(state, move |s| s.follows.following(claims.sub, user_id)).await?;
    Ok(Json(edges))
}
