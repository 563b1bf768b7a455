use anyhow::Result;
use rusqlite::Row;

use super::{images_column, images_to_json};
use crate::Database;
use crate::models::{MessageRow, NewMessage};

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, content, images, created_at";

impl Database {
    // -- Direct messages --

    pub fn insert_message(&self, message: &NewMessage<'_>) -> Result<MessageRow> {
        let images = images_to_json(message.images)?;

        self.with_conn_mut(|conn| {
            let sql = format!(
                "INSERT INTO messages (id, sender_id, receiver_id, content, images)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 RETURNING {}",
                MESSAGE_COLUMNS
            );
            let row = conn.query_row(
                &sql,
                (message.id, message.sender_id, message.receiver_id, message.content, &images),
                message_from_row,
            )?;
            Ok(row)
        })
    }

    /// Messages exchanged between two users in either direction, oldest first.
    pub fn get_conversation(&self, user_a: &str, user_b: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY created_at ASC, id ASC",
                MESSAGE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map((user_a, user_b), message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        content: row.get(3)?,
        images: images_column(row, 4)?,
        created_at: row.get(5)?,
    })
}
