use database::{self, RepositoryError};

/// Key/value access to the `local_storage` table, the persistent stand-in for
/// the browser's `localStorage`.
pub(crate) struct StorageRepository<'a> {
    conn: &'a mut database::Connection,
}

impl<'a> StorageRepository<'a> {
    pub fn new(conn: &'a mut database::Connection) -> Self {
        Self { conn }
    }

    pub async fn get_item(&mut self, key: &str) -> Result<Option<String>, RepositoryError> {
        let value: Option<String> = sqlx::query_scalar(
            "SELECT value FROM local_storage WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(value)
    }

    pub async fn set_item(&mut self, key: &str, value: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO local_storage (key, value) VALUES ($1, $2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, \
             updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')",
        )
        .bind(key)
        .bind(value)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }
}
