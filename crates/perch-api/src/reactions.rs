use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use perch_db::Database;
use perch_types::api::{Claims, ReactRequest, ReactionResponse};
use perch_types::models::ReactionKind;

use crate::auth::AppState;
use crate::convert::reaction_response;
use crate::error::{ApiError, ApiResult};
use crate::run_blocking;
use crate::visibility::VisibilityPolicy;

fn already_reacted(kind: ReactionKind) -> ApiError {
    ApiError::Conflict(match kind {
        ReactionKind::Like => "POST_ALREADY_LIKE",
        ReactionKind::Retweet => "POST_ALREADY_RETWEET",
    })
}

fn not_reacted(kind: ReactionKind) -> ApiError {
    ApiError::Conflict(match kind {
        ReactionKind::Like => "POST_NOT_LIKE",
        ReactionKind::Retweet => "POST_NOT_RETWEET",
    })
}

#[derive(Clone)]
pub struct ReactionService {
    db: Arc<Database>,
    policy: VisibilityPolicy,
}

impl ReactionService {
    pub fn new(db: Arc<Database>, policy: VisibilityPolicy) -> Self {
        Self { db, policy }
    }

    /// Visibility is checked before the duplicate check, so reacting to a
    /// hidden post is NotFound even when a reaction already exists.
    pub fn react(&self, actor: Uuid, post_id: Uuid, kind: ReactionKind) -> ApiResult<ReactionResponse> {
        let post = self.policy.ensure_content_visible(actor, post_id)?;
        let actor_id = actor.to_string();

        if self.db.get_reaction(&post.id, &actor_id, kind.as_str())?.is_some() {
            return Err(already_reacted(kind));
        }

        match self.db.insert_reaction(&post.id, &actor_id, kind.as_str())? {
            Some(row) => {
                info!("{} reacted {} on {}", actor, kind, post.id);
                Ok(reaction_response(&row))
            }
            None => {
                warn!("lost a {} race on {} for {}", kind, post.id, actor);
                Err(already_reacted(kind))
            }
        }
    }

    pub fn unreact(&self, actor: Uuid, post_id: Uuid, kind: ReactionKind) -> ApiResult<ReactionResponse> {
        let post = self.policy.ensure_content_visible(actor, post_id)?;

        let removed = self
            .db
            .delete_reaction(&post.id, &actor.to_string(), kind.as_str())?
            .ok_or_else(|| not_reacted(kind))?;

        info!("{} removed {} on {}", actor, kind, post.id);
        Ok(reaction_response(&removed))
    }

    pub fn get_reaction(
        &self,
        actor: Uuid,
        post_id: Uuid,
        kind: ReactionKind,
    ) -> ApiResult<Option<ReactionResponse>> {
        let post = self.policy.ensure_content_visible(actor, post_id)?;
        let row = self.db.get_reaction(&post.id, &actor.to_string(), kind.as_str())?;
        Ok(row.as_ref().map(reaction_response))
    }

    pub fn reactions_by_post(
        &self,
        viewer: Uuid,
        post_id: Uuid,
        kind: ReactionKind,
    ) -> ApiResult<Vec<ReactionResponse>> {
        let post = self.policy.ensure_content_visible(viewer, post_id)?;
        let rows = self.db.get_reactions_by_post(&post.id, kind.as_str())?;
        Ok(rows.iter().map(reaction_response).collect())
    }

    /// A user's reactions of one kind, limited to posts the viewer can see.
    pub fn reactions_by_user(
        &self,
        viewer: Uuid,
        user_id: Uuid,
        kind: ReactionKind,
    ) -> ApiResult<Vec<ReactionResponse>> {
        self.policy.ensure_owner_visible(viewer, user_id)?;

        let mut scope = self.policy.scope(viewer);
        let mut visible = Vec::new();
        for row in self.db.get_reactions_by_user(&user_id.to_string(), kind.as_str())? {
            let Some(post) = self.db.get_post(&row.post_id)? else {
                continue;
            };
            if scope.can_view_content(&post)? {
                visible.push(reaction_response(&row));
            }
        }
        Ok(visible)
    }
}

// -- Handlers --

#[derive(Debug, Deserialize)]
pub struct KindQuery {
    #[serde(rename = "type")]
    pub kind: ReactionKind,
}

pub async fn react(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
    Json(req): Json<ReactRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reaction = run_blocking(state, move |s| s.reactions.react(claims.sub, post_id, req.kind)).await?;
    Ok((StatusCode::CREATED, Json(reaction)))
}

pub async fn unreact(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
    Json(req): Json<ReactRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reaction = run_blocking(state, move |s| s.reactions.unreact(claims.sub, post_id, req.kind)).await?;
    Ok(Json(reaction))
}

pub async fn get_reaction(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
    Query(query): Query<KindQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let reaction = run_blocking(state, move |s| s.reactions.get_reaction(claims.sub, post_id, query.kind)).await?;
    Ok(Json(reaction))
}

async fn by_post(state: AppState, viewer: Uuid, post_id: Uuid, kind: ReactionKind) -> ApiResult<Json<Vec<ReactionResponse>>> {
    let reactions = run_blocking(state, move |s| s.reactions.reactions_by_post(viewer, post_id, kind)).await?;
    Ok(Json(reactions))
}

async fn by_user(state: AppState, viewer: Uuid, user_id: Uuid, kind: ReactionKind) -> ApiResult<Json<Vec<ReactionResponse>>> {
    let reactions = run_blocking(state, move |s| s.reactions.reactions_by_user(viewer, user_id, kind)).await?;
    Ok(Json(reactions))
}

pub async fn likes_by_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
) -> ApiResult<Json<Vec<ReactionResponse>>> {
    by_post(state, claims.sub, post_id, ReactionKind::Like).await
}

pub async fn retweets_by_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
) -> ApiResult<Json<Vec<ReactionResponse>>> {
    by_post(state, claims.sub, post_id, ReactionKind::Retweet).await
}

pub async fn likes_by_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<Vec<ReactionResponse>>> {
    by_user(state, claims.sub, user_id, ReactionKind::Like).await
}

pub async fn retweets_by_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<Vec<ReactionResponse>>> {
    by_user(state, claims.sub, user_id, ReactionKind::Retweet).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use perch_db::models::{NewPost, NewUser, UserUpdate};

    fn fixture() -> (Arc<Database>, ReactionService) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let reactions = ReactionService::new(db.clone(), VisibilityPolicy::new(db.clone()));
        (db, reactions)
    }

    fn user(db: &Database, username: &str, public: bool) -> Uuid {
        let id = Uuid::new_v4();
        db.create_user(&NewUser {
            id: &id.to_string(),
            name: username,
            username,
            email: &format!("{}@example.com", username),
            password_hash: "x",
        })
        .unwrap();
        db.update_user(
            &id.to_string(),
            &UserUpdate {
                public_account: Some(public),
                ..Default::default()
            },
        )
        .unwrap();
        id
    }

    fn post(db: &Database, author: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        db.insert_post(&NewPost {
            id: &id.to_string(),
            author_id: &author.to_string(),
            content: "post",
            images: &[],
            parent_id: None,
        })
        .unwrap();
        id
    }

    #[test]
    fn react_twice_conflicts() {
        let (db, reactions) = fixture();
        let author = user(&db, "author", true);
        let fan = user(&db, "fan", true);
        let post = post(&db, author);

        let reaction = reactions.react(fan, post, ReactionKind::Like).unwrap();
        assert_eq!(reaction.kind, ReactionKind::Like);
        assert!(matches!(
            reactions.react(fan, post, ReactionKind::Like),
            Err(ApiError::Conflict("POST_ALREADY_LIKE"))
        ));
        // A retweet is a separate reaction.
        reactions.react(fan, post, ReactionKind::Retweet).unwrap();
    }

    #[test]
    fn unreact_without_react_conflicts() {
        let (db, reactions) = fixture();
        let author = user(&db, "author", true);
        let post = post(&db, author);

        assert!(matches!(
            reactions.unreact(author, post, ReactionKind::Retweet),
            Err(ApiError::Conflict("POST_NOT_RETWEET"))
        ));
    }

    #[test]
    fn react_unreact_then_nothing_left() {
        let (db, reactions) = fixture();
        let author = user(&db, "author", true);
        let post = post(&db, author);

        reactions.react(author, post, ReactionKind::Like).unwrap();
        assert!(reactions.get_reaction(author, post, ReactionKind::Like).unwrap().is_some());

        reactions.unreact(author, post, ReactionKind::Like).unwrap();
        assert!(reactions.get_reaction(author, post, ReactionKind::Like).unwrap().is_none());
    }

    #[test]
    fn visibility_is_checked_before_conflict() {
        let (db, reactions) = fixture();
        let author = user(&db, "author", false);
        let fan = user(&db, "fan", true);
        let post = post(&db, author);

        // Fan follows, likes, then unfollows: the like stays but the post is hidden.
        db.insert_follow(&fan.to_string(), &author.to_string()).unwrap();
        reactions.react(fan, post, ReactionKind::Like).unwrap();
        db.delete_follow(&fan.to_string(), &author.to_string()).unwrap();

        assert!(matches!(
            reactions.react(fan, post, ReactionKind::Like),
            Err(ApiError::NotFound)
        ));
        assert!(matches!(
            reactions.react(fan, post, ReactionKind::Like),
            Err(ApiError::NotFound)
        ));
    }

    #[test]
    fn reactions_by_user_hide_invisible_posts() {
        let (db, reactions) = fixture();
        let fan = user(&db, "fan", true);
        let open = user(&db, "open", true);
        let closed = user(&db, "closed", false);
        let viewer = user(&db, "viewer", true);

        let open_post = post(&db, open);
        let closed_post = post(&db, closed);
        db.insert_follow(&fan.to_string(), &closed.to_string()).unwrap();
        reactions.react(fan, open_post, ReactionKind::Like).unwrap();
        reactions.react(fan, closed_post, ReactionKind::Like).unwrap();

        assert_eq!(reactions.reactions_by_user(viewer, fan, ReactionKind::Like).unwrap().len(), 1);
        assert_eq!(reactions.reactions_by_user(fan, fan, ReactionKind::Like).unwrap().len(), 2);
        assert!(reactions.reactions_by_user(fan, fan, ReactionKind::Retweet).unwrap().is_empty());

        assert_eq!(reactions.reactions_by_post(viewer, open_post, ReactionKind::Like).unwrap().len(), 1);
        assert!(matches!(
            reactions.reactions_by_post(viewer, closed_post, ReactionKind::Like),
            Err(ApiError::NotFound)
        ));
    }
}
