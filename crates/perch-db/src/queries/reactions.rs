use anyhow::Result;
use rusqlite::Row;

use super::OptionalExt;
use crate::Database;
use crate::models::ReactionRow;

impl Database {
    // -- Reactions --

    /// Insert a reaction. Returns None when the same (post, user, kind) already
    /// exists; the primary key is the guard against concurrent duplicates.
    pub fn insert_reaction(&self, post_id: &str, user_id: &str, kind: &str) -> Result<Option<ReactionRow>> {
        self.with_conn_mut(|conn| {
            conn.query_row(
                "INSERT OR IGNORE INTO reactions (post_id, user_id, kind) VALUES (?1, ?2, ?3)
                 RETURNING post_id, user_id, kind, created_at",
                (post_id, user_id, kind),
                reaction_from_row,
            )
            .optional()
        })
    }

    /// Remove a reaction and return it, or None when it didn't exist.
    pub fn delete_reaction(&self, post_id: &str, user_id: &str, kind: &str) -> Result<Option<ReactionRow>> {
        self.with_conn_mut(|conn| {
            conn.query_row(
                "DELETE FROM reactions WHERE post_id = ?1 AND user_id = ?2 AND kind = ?3
                 RETURNING post_id, user_id, kind, created_at",
                (post_id, user_id, kind),
                reaction_from_row,
            )
            .optional()
        })
    }

    pub fn get_reaction(&self, post_id: &str, user_id: &str, kind: &str) -> Result<Option<ReactionRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT post_id, user_id, kind, created_at FROM reactions
                 WHERE post_id = ?1 AND user_id = ?2 AND kind = ?3",
                (post_id, user_id, kind),
                reaction_from_row,
            )
            .optional()
        })
    }

    pub fn get_reactions_by_post(&self, post_id: &str, kind: &str) -> Result<Vec<ReactionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT post_id, user_id, kind, created_at FROM reactions
                 WHERE post_id = ?1 AND kind = ?2 ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map((post_id, kind), reaction_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_reactions_by_user(&self, user_id: &str, kind: &str) -> Result<Vec<ReactionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT post_id, user_id, kind, created_at FROM reactions
                 WHERE user_id = ?1 AND kind = ?2 ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map((user_id, kind), reaction_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn reaction_from_row(row: &Row<'_>) -> rusqlite::Result<ReactionRow> {
    Ok(ReactionRow {
        post_id: row.get(0)?,
        user_id: row.get(1)?,
        kind: row.get(2)?,
        created_at: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::queries::test_support;

    #[test]
    fn one_reaction_per_kind_per_user() {
        let db = test_support::db();
        let author = test_support::user(&db, "author", true);
        let fan = test_support::user(&db, "fan", true);
        let post = test_support::post(&db, &author, None);

        assert!(db.insert_reaction(&post, &fan, "LIKE").unwrap().is_some());
        assert!(db.insert_reaction(&post, &fan, "LIKE").unwrap().is_none());
        assert!(db.insert_reaction(&post, &fan, "RETWEET").unwrap().is_some());

        assert_eq!(db.get_reactions_by_post(&post, "LIKE").unwrap().len(), 1);
        assert_eq!(db.get_reactions_by_user(&fan, "RETWEET").unwrap().len(), 1);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let db = test_support::db();
        let author = test_support::user(&db, "author", true);
        let post = test_support::post(&db, &author, None);

        // OR IGNORE also swallows the CHECK failure, so nothing is stored.
        assert!(db.insert_reaction(&post, &author, "LOVE").unwrap().is_none());
        assert!(db.get_reaction(&post, &author, "LOVE").unwrap().is_none());
    }

    #[test]
    fn delete_returns_removed_row() {
        let db = test_support::db();
        let author = test_support::user(&db, "author", true);
        let post = test_support::post(&db, &author, None);

        assert!(db.delete_reaction(&post, &author, "LIKE").unwrap().is_none());
        db.insert_reaction(&post, &author, "LIKE").unwrap();

        let removed = db.delete_reaction(&post, &author, "LIKE").unwrap().unwrap();
        assert_eq!(removed.kind, "LIKE");
        assert!(db.get_reaction(&post, &author, "LIKE").unwrap().is_none());
    }
}
