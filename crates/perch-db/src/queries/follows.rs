use anyhow::Result;
use rusqlite::Row;

use super::OptionalExt;
use crate::Database;
use crate::models::FollowRow;

impl Database {
    // -- Follow graph --

    /// Insert the edge follower -> followed. Returns None when it already exists;
    /// the primary key decides, so concurrent duplicates can't both succeed.
    pub fn insert_follow(&self, follower_id: &str, followed_id: &str) -> Result<Option<FollowRow>> {
        self.with_conn_mut(|conn| {
            conn.query_row(
                "INSERT OR IGNORE INTO follows (follower_id, followed_id) VALUES (?1, ?2)
                 RETURNING follower_id, followed_id, created_at",
                (follower_id, followed_id),
                follow_from_row,
            )
            .optional()
        })
    }

    /// Remove the edge and return it, or None when there was nothing to remove.
    pub fn delete_follow(&self, follower_id: &str, followed_id: &str) -> Result<Option<FollowRow>> {
        self.with_conn_mut(|conn| {
            conn.query_row(
                "DELETE FROM follows WHERE follower_id = ?1 AND followed_id = ?2
                 RETURNING follower_id, followed_id, created_at",
                (follower_id, followed_id),
                follow_from_row,
            )
            .optional()
        })
    }

    pub fn is_following(&self, follower_id: &str, followed_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM follows WHERE follower_id = ?1 AND followed_id = ?2)",
                (follower_id, followed_id),
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    /// Edges pointing at `user_id` (who follows them), newest first.
    pub fn get_followers(&self, user_id: &str) -> Result<Vec<FollowRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT follower_id, followed_id, created_at FROM follows
                 WHERE followed_id = ?1 ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map([user_id], follow_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Edges leaving `user_id` (who they follow), newest first.
    pub fn get_following(&self, user_id: &str) -> Result<Vec<FollowRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT follower_id, followed_id, created_at FROM follows
                 WHERE follower_id = ?1 ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map([user_id], follow_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// True when some account that `user_id` follows in turn follows `candidate_id`.
    pub fn is_followed_by_followee(&self, user_id: &str, candidate_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM follows mine
                    JOIN follows theirs ON theirs.follower_id = mine.followed_id
                    WHERE mine.follower_id = ?1 AND theirs.followed_id = ?2
                 )",
                (user_id, candidate_id),
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }
}

fn follow_from_row(row: &Row<'_>) -> rusqlite::Result<FollowRow> {
    Ok(FollowRow {
        follower_id: row.get(0)?,
        followed_id: row.get(1)?,
        created_at: row.get(2)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::queries::test_support;

    #[test]
    fn follow_edge_is_directed_and_unique() {
        let db = test_support::db();
        let a = test_support::user(&db, "a", true);
        let b = test_support::user(&db, "b", true);

        assert!(db.insert_follow(&a, &b).unwrap().is_some());
        assert!(db.insert_follow(&a, &b).unwrap().is_none());

        assert!(db.is_following(&a, &b).unwrap());
        assert!(!db.is_following(&b, &a).unwrap());

        assert_eq!(db.get_followers(&b).unwrap().len(), 1);
        assert_eq!(db.get_following(&a).unwrap().len(), 1);
        assert!(db.get_following(&b).unwrap().is_empty());
    }

    #[test]
    fn delete_follow_reports_missing_edge() {
        let db = test_support::db();
        let a = test_support::user(&db, "a", true);
        let b = test_support::user(&db, "b", true);

        assert!(db.delete_follow(&a, &b).unwrap().is_none());
        db.insert_follow(&a, &b).unwrap();
        let removed = db.delete_follow(&a, &b).unwrap().unwrap();
        assert_eq!(removed.follower_id, a);
        assert!(!db.is_following(&a, &b).unwrap());
    }

    #[test]
    fn self_follow_is_rejected_by_the_store() {
        let db = test_support::db();
        let a = test_support::user(&db, "a", true);

        assert!(db.insert_follow(&a, &a).unwrap().is_none());
        assert!(!db.is_following(&a, &a).unwrap());
    }

    #[test]
    fn friend_of_friend_lookup() {
        let db = test_support::db();
        let me = test_support::user(&db, "me", true);
        let friend = test_support::user(&db, "friend", true);
        let stranger = test_support::user(&db, "stranger", false);
        let loner = test_support::user(&db, "loner", false);

        db.insert_follow(&me, &friend).unwrap();
        db.insert_follow(&friend, &stranger).unwrap();

        assert!(db.is_followed_by_followee(&me, &stranger).unwrap());
        assert!(!db.is_followed_by_followee(&me, &loner).unwrap());
    }
}
