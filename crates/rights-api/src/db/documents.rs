//! Document persistence operations.
//!
//! All functions take a `&PgPool` and one [`DocumentTable`]. Table names
//! come only from the enum, never from input. State machine rules are
//! enforced in memory before anything reaches SQL.

use serde::de::DeserializeOwned;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentTable {
    Assets,
    Terms,
    Applications,
    Products,
    Transactions,
    Chains,
}

impl DocumentTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assets => "ip_assets",
            Self::Terms => "license_terms",
            Self::Applications => "license_applications",
            Self::Products => "products",
            Self::Transactions => "transactions",
            Self::Chains => "authorization_chains",
        }
    }
}

/// Insert or replace a document.
pub async fn upsert(
    pool: &PgPool,
    table: DocumentTable,
    id: Uuid,
    document: &serde_json::Value,
) -> Result<(), sqlx::Error> {
    let sql = format!(
        "INSERT INTO {} (id, document, updated_at) VALUES ($1, $2, now())
         ON CONFLICT (id) DO UPDATE SET document = EXCLUDED.document, updated_at = now()",
        table.as_str()
    );
    sqlx::query(&sql)
        .bind(id)
        .bind(document)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete a document. Returns whether a row was removed.
pub async fn delete(pool: &PgPool, table: DocumentTable, id: Uuid) -> Result<bool, sqlx::Error> {
    let sql = format!("DELETE FROM {} WHERE id = $1", table.as_str());
    let result = sqlx::query(&sql).bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

/// Load every document of a table, oldest write first.
pub async fn load_all<T: DeserializeOwned>(
    pool: &PgPool,
    table: DocumentTable,
) -> Result<Vec<T>, sqlx::Error> {
    let sql = format!("SELECT document FROM {} ORDER BY updated_at", table.as_str());
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows.into_iter()
        .map(|row| {
            let document: serde_json::Value = row.try_get("document")?;
            serde_json::from_value(document).map_err(|e| {
                tracing::error!(table = table.as_str(), error = %e, "stored document does not deserialize");
                sqlx::Error::Decode(Box::new(e))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_are_distinct() {
        let all = [
            DocumentTable::Assets,
            DocumentTable::Terms,
            DocumentTable::Applications,
            DocumentTable::Products,
            DocumentTable::Transactions,
            DocumentTable::Chains,
        ];
        let names: std::collections::HashSet<_> = all.iter().map(|t| t.as_str()).collect();
        assert_eq!(names.len(), all.len());
    }
}
