use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use perch_db::Database;
use perch_db::models::{PostRow, UserRow};

use crate::error::{ApiError, ApiResult};

/// The one place that decides whether a viewer may see an account or a piece
/// of content. Every content-facing service holds a clone.
#[derive(Clone)]
pub struct VisibilityPolicy {
    db: Arc<Database>,
}

impl VisibilityPolicy {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Start a scope that memoizes owner decisions for one service call.
    pub fn scope(&self, viewer: Uuid) -> ViewerScope<'_> {
        ViewerScope {
            policy: self,
            viewer: viewer.to_string(),
            owners: HashMap::new(),
        }
    }

    /// NotFound if the owner doesn't exist.
    pub fn can_view_owner(&self, viewer: Uuid, owner: Uuid) -> ApiResult<bool> {
        self.scope(viewer).can_view_owner(&owner.to_string())
    }

    /// NotFound if the content or its author doesn't exist.
    pub fn can_view_content(&self, viewer: Uuid, content_id: Uuid) -> ApiResult<bool> {
        let content = self.load_content(content_id)?;
        self.scope(viewer).can_view_content(&content)
    }

    /// Like `can_view_owner`, but a denial becomes NotFound.
    pub fn ensure_owner_visible(&self, viewer: Uuid, owner: Uuid) -> ApiResult<UserRow> {
        let owner_id = owner.to_string();
        let row = self.db.get_user_by_id(&owner_id)?.ok_or(ApiError::NotFound)?;
        if self.decide(&viewer.to_string(), &row)? {
            Ok(row)
        } else {
            debug!("{} may not view account {}", viewer, owner);
            Err(ApiError::NotFound)
        }
    }

    /// Like `can_view_content`, but a denial becomes NotFound. Returns the
    /// content so callers don't have to load it twice.
    pub fn ensure_content_visible(&self, viewer: Uuid, content_id: Uuid) -> ApiResult<PostRow> {
        let content = self.load_content(content_id)?;
        self.scope(viewer).ensure_content_visible(content)
    }

    fn load_content(&self, content_id: Uuid) -> ApiResult<PostRow> {
        self.db
            .get_post(&content_id.to_string())?
            .ok_or(ApiError::NotFound)
    }

    /// Public accounts are visible to everyone; private ones to themselves and
    /// to viewers holding a viewer -> owner follow edge.
    fn decide(&self, viewer: &str, owner: &UserRow) -> ApiResult<bool> {
        if owner.public_account || owner.id == viewer {
            return Ok(true);
        }
        Ok(self.db.is_following(viewer, &owner.id)?)
    }
}

/// Per-call memo of owner decisions. A listing with many items by the same
/// author costs one owner lookup and one edge lookup for that author.
pub struct ViewerScope<'a> {
    policy: &'a VisibilityPolicy,
    viewer: String,
    owners: HashMap<String, bool>,
}

impl ViewerScope<'_> {
    pub fn can_view_owner(&mut self, owner_id: &str) -> ApiResult<bool> {
        if let Some(&allowed) = self.owners.get(owner_id) {
            return Ok(allowed);
        }

        let owner = self
            .policy
            .db
            .get_user_by_id(owner_id)?
            .ok_or(ApiError::NotFound)?;
        let allowed = self.policy.decide(&self.viewer, &owner)?;
        self.owners.insert(owner_id.to_string(), allowed);
        Ok(allowed)
    }

    pub fn can_view_content(&mut self, content: &PostRow) -> ApiResult<bool> {
        self.can_view_owner(&content.author_id)
    }

    pub fn ensure_content_visible(&mut self, content: PostRow) -> ApiResult<PostRow> {
        if self.can_view_content(&content)? {
            Ok(content)
        } else {
            debug!("{} may not view content {}", self.viewer, content.id);
            Err(ApiError::NotFound)
        }
    }

    /// Drop the items this viewer can't see, keeping order.
    pub fn retain_visible(&mut self, items: Vec<PostRow>) -> ApiResult<Vec<PostRow>> {
        let mut visible = Vec::with_capacity(items.len());
        for item in items {
            if self.can_view_content(&item)? {
                visible.push(item);
            }
        }
        Ok(visible)
    }
}
