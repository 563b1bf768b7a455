use anyhow::Result;
use rusqlite::types::ToSql;
use rusqlite::{Connection, Row};

use super::{OptionalExt, images_column, images_to_json};
use crate::Database;
use crate::models::{Cursor, EngagementCounts, NewPost, Page, PostRow, PostScope};

const POST_COLUMNS: &str = "id, author_id, content, images, parent_id, is_comment, created_at";

impl Database {
    // -- Posts & comments --

    pub fn insert_post(&self, post: &NewPost<'_>) -> Result<PostRow> {
        let images = images_to_json(post.images)?;

        self.with_conn_mut(|conn| {
            let sql = format!(
                "INSERT INTO posts (id, author_id, content, images, parent_id, is_comment)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 RETURNING {}",
                POST_COLUMNS
            );
            let row = conn.query_row(
                &sql,
                (
                    post.id,
                    post.author_id,
                    post.content,
                    &images,
                    post.parent_id,
                    post.parent_id.is_some(),
                ),
                post_from_row,
            )?;
            Ok(row)
        })
    }

    /// Any post or comment by id.
    pub fn get_post(&self, id: &str) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM posts WHERE id = ?1", POST_COLUMNS);
            conn.query_row(&sql, [id], post_from_row).optional()
        })
    }

    /// A comment, only if it hangs off `parent_id`.
    pub fn get_comment(&self, parent_id: &str, comment_id: &str) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM posts WHERE id = ?1 AND parent_id = ?2 AND is_comment = 1",
                POST_COLUMNS
            );
            conn.query_row(&sql, (comment_id, parent_id), post_from_row).optional()
        })
    }

    /// Delete a post. Its comments and reactions cascade.
    pub fn delete_post(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute("DELETE FROM posts WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    /// One cursor page of `scope`, ordered by reaction count desc, created_at desc, id desc.
    /// A cursor id outside the scope yields an empty page.
    pub fn list_posts_page(&self, scope: PostScope<'_>, page: &Page) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| query_post_page(conn, scope, page))
    }

    /// Every comment of `parent_id`, in listing order.
    pub fn list_comments(&self, parent_id: &str) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM posts p WHERE p.parent_id = ?1 AND p.is_comment = 1
                 ORDER BY (SELECT COUNT(*) FROM reactions r WHERE r.post_id = p.id) DESC,
                          p.created_at DESC, p.id DESC",
                POST_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([parent_id], post_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Every comment written by `author_id`, newest first.
    pub fn list_comments_by_author(&self, author_id: &str) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM posts WHERE author_id = ?1 AND is_comment = 1
                 ORDER BY created_at DESC, id DESC",
                POST_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([author_id], post_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn engagement_counts(&self, post_id: &str) -> Result<EngagementCounts> {
        self.with_conn(|conn| {
            let (comments, likes, retweets): (i64, i64, i64) = conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM posts WHERE parent_id = ?1 AND is_comment = 1),
                    (SELECT COUNT(*) FROM reactions WHERE post_id = ?1 AND kind = 'LIKE'),
                    (SELECT COUNT(*) FROM reactions WHERE post_id = ?1 AND kind = 'RETWEET')",
                [post_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

            Ok(EngagementCounts {
                comments: comments as u64,
                likes: likes as u64,
                retweets: retweets as u64,
            })
        })
    }
}

fn query_post_page(conn: &Connection, scope: PostScope<'_>, page: &Page) -> Result<Vec<PostRow>> {
    let (filter, scope_id) = match scope {
        PostScope::TopLevel => ("p.is_comment = 0", None),
        PostScope::ByAuthor(author_id) => ("p.is_comment = 0 AND p.author_id = :scope", Some(author_id)),
        PostScope::CommentsOf(parent_id) => ("p.is_comment = 1 AND p.parent_id = :scope", Some(parent_id)),
    };

    // `before` walks the order in reverse and is flipped back below.
    let (boundary, direction, cursor_id) = match &page.cursor {
        None => ("", "DESC", None),
        Some(Cursor::After(id)) => (
            "WHERE (engagement, created_at, id) <
                (SELECT engagement, created_at, id FROM ranked WHERE id = :cursor)",
            "DESC",
            Some(id.as_str()),
        ),
        Some(Cursor::Before(id)) => (
            "WHERE (engagement, created_at, id) >
                (SELECT engagement, created_at, id FROM ranked WHERE id = :cursor)",
            "ASC",
            Some(id.as_str()),
        ),
    };

    let sql = format!(
        "WITH ranked AS (
            SELECT p.id, p.author_id, p.content, p.images, p.parent_id, p.is_comment, p.created_at,
                   (SELECT COUNT(*) FROM reactions r WHERE r.post_id = p.id) AS engagement
            FROM posts p
            WHERE {filter}
         )
         SELECT {columns} FROM ranked
         {boundary}
         ORDER BY engagement {direction}, created_at {direction}, id {direction}
         LIMIT :limit",
        columns = POST_COLUMNS,
    );

    let mut params: Vec<(&str, &dyn ToSql)> = vec![(":limit", &page.limit)];
    if let Some(scope_id) = &scope_id {
        params.push((":scope", scope_id));
    }
    if let Some(cursor_id) = &cursor_id {
        params.push((":cursor", cursor_id));
    }

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt
        .query_map(params.as_slice(), post_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if matches!(page.cursor, Some(Cursor::Before(_))) {
        rows.reverse();
    }

    Ok(rows)
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        author_id: row.get(1)?,
        content: row.get(2)?,
        images: images_column(row, 3)?,
        parent_id: row.get(4)?,
        is_comment: row.get(5)?,
        created_at: row.get(6)?,
    })
}
