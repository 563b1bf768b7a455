use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use perch_db::Database;
use perch_db::models::{NewPost, PostRow, PostScope};
use perch_types::api::{Claims, CreatePostRequest, ExtendedPostResponse, PageQuery, PostResponse};

use crate::auth::AppState;
use crate::enrich::Enricher;
use crate::error::{ApiError, ApiResult};
use crate::pagination::resolve_page;
use crate::posts::validate_body;
use crate::run_blocking;
use crate::visibility::VisibilityPolicy;

#[derive(Clone)]
pub struct CommentService {
    db: Arc<Database>,
    policy: VisibilityPolicy,
    enricher: Enricher,
}

impl CommentService {
    pub fn new(db: Arc<Database>, policy: VisibilityPolicy, enricher: Enricher) -> Self {
        Self { db, policy, enricher }
    }

    pub fn comment(&self, actor: Uuid, post_id: Uuid, req: CreatePostRequest) -> ApiResult<PostResponse> {
        let parent = self.policy.ensure_content_visible(actor, post_id)?;
        let content = validate_body(&req.content, &req.images)?;
        let id = Uuid::new_v4().to_string();

        let row = self.db.insert_post(&NewPost {
            id: &id,
            author_id: &actor.to_string(),
            content: &content,
            images: &req.images,
            parent_id: Some(&parent.id),
        })?;

        info!("{} commented {} on {}", actor, id, parent.id);
        Ok(self.enricher.post(&row))
    }

    pub fn get_comment(&self, viewer: Uuid, post_id: Uuid, comment_id: Uuid) -> ApiResult<ExtendedPostResponse> {
        let comment = self.visible_comment(viewer, post_id, comment_id)?;
        self.enricher.extend(comment)
    }

    pub fn delete_comment(&self, actor: Uuid, post_id: Uuid, comment_id: Uuid) -> ApiResult<()> {
        let comment = self.visible_comment(actor, post_id, comment_id)?;
        if comment.author_id != actor.to_string() {
            return Err(ApiError::Forbidden("NOT_COMMENT_AUTHOR"));
        }

        if !self.db.delete_post(&comment.id)? {
            return Err(ApiError::NotFound);
        }
        info!("{} deleted comment {}", actor, comment.id);
        Ok(())
    }

    /// Every visible comment under a post. A missing or hidden parent yields
    /// an empty list.
    pub fn post_comments(&self, viewer: Uuid, post_id: Uuid) -> ApiResult<Vec<ExtendedPostResponse>> {
        let mut scope = self.policy.scope(viewer);
        let Some(parent) = self.db.get_post(&post_id.to_string())? else {
            return Ok(Vec::new());
        };
        if !scope.can_view_content(&parent)? {
            return Ok(Vec::new());
        }

        let rows = self.db.list_comments(&parent.id)?;
        let visible = scope.retain_visible(rows)?;
        self.enricher.extend_all(visible)
    }

    pub fn post_comments_page(
        &self,
        viewer: Uuid,
        post_id: Uuid,
        query: &PageQuery,
    ) -> ApiResult<Vec<ExtendedPostResponse>> {
        let page = resolve_page(query)?;
        let mut scope = self.policy.scope(viewer);
        let Some(parent) = self.db.get_post(&post_id.to_string())? else {
            return Ok(Vec::new());
        };
        if !scope.can_view_content(&parent)? {
            return Ok(Vec::new());
        }

        let rows = self.db.list_posts_page(PostScope::CommentsOf(&parent.id), &page)?;
        let visible = scope.retain_visible(rows)?;
        self.enricher.extend_all(visible)
    }

    /// A user's comments, limited to those under posts the viewer can see.
    pub fn comments_by_user(&self, viewer: Uuid, user_id: Uuid) -> ApiResult<Vec<ExtendedPostResponse>> {
        self.policy.ensure_owner_visible(viewer, user_id)?;

        let mut scope = self.policy.scope(viewer);
        let mut visible = Vec::new();
        for comment in self.db.list_comments_by_author(&user_id.to_string())? {
            let Some(parent_id) = comment.parent_id.as_deref() else {
                continue;
            };
            let Some(parent) = self.db.get_post(parent_id)? else {
                continue;
            };
            if scope.can_view_content(&parent)? {
                visible.push(comment);
            }
        }

        self.enricher.extend_all(visible)
    }

    /// The comment, provided it sits under `post_id` and the viewer can see
    /// both it and its parent.
    fn visible_comment(&self, viewer: Uuid, post_id: Uuid, comment_id: Uuid) -> ApiResult<PostRow> {
        let comment = self
            .db
            .get_comment(&post_id.to_string(), &comment_id.to_string())?
            .ok_or(ApiError::NotFound)?;

        let parent = self.db.get_post(&post_id.to_string())?.ok_or(ApiError::NotFound)?;
        let mut scope = self.policy.scope(viewer);
        scope.ensure_content_visible(parent)?;
        scope.ensure_content_visible(comment)
    }
}

// -- Handlers --

pub async fn create_comment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
    Json(req): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let comment = run_blocking(state, move |s| s.comments.comment(claims.sub, post_id, req)).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// Without paging parameters this returns every visible comment.
pub async fn post_comments(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let comments = run_blocking(state, move |s| {
        if query.is_empty() {
            s.comments.post_comments(claims.sub, post_id)
        } else {
            s.comments.post_comments_page(claims.sub, post_id, &query)
        }
    })
    .await?;
    Ok(Json(comments))
}

pub async fn get_comment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((post_id, comment_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let comment = run_blocking(state, move |s| s.comments.get_comment(claims.sub, post_id, comment_id)).await?;
    Ok(Json(comment))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((post_id, comment_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    run_blocking(state, move |s| s.comments.delete_comment(claims.sub, post_id, comment_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn comments_by_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let comments = run_blocking(state, move |s| s.comments.comments_by_user(claims.sub, user_id)).await?;
    Ok(Json(comments))
}
