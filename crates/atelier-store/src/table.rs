//! Row operations on one structured store table.
//!
//! Rows cross this boundary as JSON objects. On auto-increment tables the
//! `id` field is lifted out of the document on write and put back on read,
//! so the stored document never disagrees with its primary key. Keyed
//! tables read their key from the field named by [`KeyPolicy::Field`].

use serde_json::{Map, Value};
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::StoreError;
use crate::schema::{KeyPolicy, RecordKey, TableSpec};

/// Field holding the store-assigned identity on auto-increment tables.
const ID_FIELD: &str = "id";

/// Whether a write may replace an existing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Insert,
    Upsert,
}

/// Operations on one table, bound to a connection pool.
#[derive(Debug, Clone, Copy)]
pub struct Table<'a> {
    pool: &'a SqlitePool,
    spec: &'static TableSpec,
}

impl<'a> Table<'a> {
    /// Create a table handle bound to a connection pool.
    pub const fn new(pool: &'a SqlitePool, spec: &'static TableSpec) -> Self {
        Self { pool, spec }
    }

    /// The layout of this table.
    pub const fn spec(&self) -> &'static TableSpec {
        self.spec
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Fetch one row by key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`] if the key kind does not match the
    /// table, or [`StoreError::Sqlite`] if the query fails.
    pub async fn get(&self, key: &RecordKey) -> Result<Option<Value>, StoreError> {
        match self.spec.key {
            KeyPolicy::AutoIncrement => {
                let id = self.numeric_key(key)?;
                let row: Option<(i64, String)> = sqlx::query_as(&format!(
                    "SELECT id, data FROM {} WHERE id = ?1",
                    self.spec.quoted_name()
                ))
                .bind(id)
                .fetch_optional(self.pool)
                .await?;
                row.map(|(id, data)| decode_with_id(id, &data)).transpose()
            }
            KeyPolicy::Field(_) => {
                let name = self.string_key(key)?;
                let data: Option<String> = sqlx::query_scalar(&format!(
                    "SELECT data FROM {} WHERE key = ?1",
                    self.spec.quoted_name()
                ))
                .bind(name)
                .fetch_optional(self.pool)
                .await?;
                data.map(|data| decode(&data)).transpose()
            }
        }
    }

    /// Fetch every row in primary-key order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if the query fails, or
    /// [`StoreError::Serialization`] if a stored document is corrupt.
    pub async fn get_all(&self) -> Result<Vec<Value>, StoreError> {
        match self.spec.key {
            KeyPolicy::AutoIncrement => {
                let rows: Vec<(i64, String)> = sqlx::query_as(&format!(
                    "SELECT id, data FROM {} ORDER BY id",
                    self.spec.quoted_name()
                ))
                .fetch_all(self.pool)
                .await?;
                rows.iter()
                    .map(|(id, data)| decode_with_id(*id, data))
                    .collect()
            }
            KeyPolicy::Field(_) => {
                let rows: Vec<String> = sqlx::query_scalar(&format!(
                    "SELECT data FROM {} ORDER BY key",
                    self.spec.quoted_name()
                ))
                .fetch_all(self.pool)
                .await?;
                rows.iter().map(|data| decode(data)).collect()
            }
        }
    }

    /// Fetch every row whose indexed `attribute` equals `value`.
    ///
    /// `value` must be a string, number, or boolean.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if `attribute` is not indexed on this
    /// table or `value` is not a scalar, or [`StoreError::Sqlite`] if the
    /// query fails.
    pub async fn find_by_index(
        &self,
        attribute: &str,
        value: &Value,
    ) -> Result<Vec<Value>, StoreError> {
        if !self.spec.is_indexed(attribute) {
            return Err(StoreError::Query(format!(
                "{} has no index on {attribute}",
                self.spec.collection
            )));
        }

        let (select, order) = match self.spec.key {
            KeyPolicy::AutoIncrement => ("id, data", "id"),
            KeyPolicy::Field(_) => ("0, data", "key"),
        };
        let sql = format!(
            "SELECT {select} FROM {} WHERE json_extract(data, '$.{attribute}') = ?1 ORDER BY {order}",
            self.spec.quoted_name()
        );

        let query = sqlx::query_as::<_, (i64, String)>(&sql);
        let query = match value {
            Value::String(s) => query.bind(s.as_str()),
            Value::Bool(b) => query.bind(i64::from(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    query.bind(i)
                } else if let Some(f) = n.as_f64() {
                    query.bind(f)
                } else {
                    return Err(StoreError::Query(format!("unsupported index value {n}")));
                }
            }
            Value::Null | Value::Array(_) | Value::Object(_) => {
                return Err(StoreError::Query(format!(
                    "index lookups need a scalar value, got {value}"
                )));
            }
        };

        let rows = query.fetch_all(self.pool).await?;
        rows.iter()
            .map(|(id, data)| {
                if self.spec.is_auto_increment() {
                    decode_with_id(*id, data)
                } else {
                    decode(data)
                }
            })
            .collect()
    }

    /// Number of rows in the table.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if the query fails.
    pub async fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {}",
            self.spec.quoted_name()
        ))
        .fetch_one(self.pool)
        .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Insert or replace one row, returning its key.
    ///
    /// On auto-increment tables a record without an `id` gets a fresh one; a
    /// record with an `id` replaces that row or creates it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`] if the record's key is missing or
    /// malformed, or [`StoreError::Sqlite`] if the write fails.
    pub async fn put(&self, record: &Value) -> Result<RecordKey, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let key = write_one(&mut *conn, self.spec, record, WriteMode::Upsert).await?;
        tracing::debug!(collection = %self.spec.collection, %key, "Put row");
        Ok(key)
    }

    /// Insert many rows atomically, returning their keys in input order.
    ///
    /// Fails without writing anything if any row conflicts with an existing
    /// key or with another row of the batch.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] on a key conflict or write failure, or
    /// [`StoreError::InvalidKey`] if a record's key is malformed.
    pub async fn bulk_add(&self, records: &[Value]) -> Result<Vec<RecordKey>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut keys = Vec::with_capacity(records.len());
        for record in records {
            keys.push(write_one(&mut *tx, self.spec, record, WriteMode::Insert).await?);
        }
        tx.commit().await?;

        tracing::debug!(
            collection = %self.spec.collection,
            count = keys.len(),
            "Bulk-added rows"
        );
        Ok(keys)
    }

    /// Replace the whole table content with `records` atomically.
    ///
    /// If any row fails, the previous content is kept.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] under the same conditions as [`Self::bulk_add`].
    pub async fn replace_all(&self, records: &[Value]) -> Result<Vec<RecordKey>, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DELETE FROM {}", self.spec.quoted_name()))
            .execute(&mut *tx)
            .await?;
        let mut keys = Vec::with_capacity(records.len());
        for record in records {
            keys.push(write_one(&mut *tx, self.spec, record, WriteMode::Insert).await?);
        }
        tx.commit().await?;

        tracing::debug!(
            collection = %self.spec.collection,
            count = keys.len(),
            "Replaced table content"
        );
        Ok(keys)
    }

    /// Delete one row. Deleting a missing key is not an error.
    ///
    /// Returns whether a row was removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`] if the key kind does not match the
    /// table, or [`StoreError::Sqlite`] if the delete fails.
    pub async fn delete(&self, key: &RecordKey) -> Result<bool, StoreError> {
        let result = match self.spec.key {
            KeyPolicy::AutoIncrement => {
                let id = self.numeric_key(key)?;
                sqlx::query(&format!(
                    "DELETE FROM {} WHERE id = ?1",
                    self.spec.quoted_name()
                ))
                .bind(id)
                .execute(self.pool)
                .await?
            }
            KeyPolicy::Field(_) => {
                let name = self.string_key(key)?;
                sqlx::query(&format!(
                    "DELETE FROM {} WHERE key = ?1",
                    self.spec.quoted_name()
                ))
                .bind(name)
                .execute(self.pool)
                .await?
            }
        };
        Ok(result.rows_affected() > 0)
    }

    /// Delete every row of the table.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if the delete fails.
    pub async fn clear(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(&format!("DELETE FROM {}", self.spec.quoted_name()))
            .execute(self.pool)
            .await?;
        tracing::debug!(
            collection = %self.spec.collection,
            removed = result.rows_affected(),
            "Cleared table"
        );
        Ok(result.rows_affected())
    }

    // -------------------------------------------------------------------------
    // Key handling
    // -------------------------------------------------------------------------

    fn numeric_key(&self, key: &RecordKey) -> Result<i64, StoreError> {
        match key {
            RecordKey::Id(id) => Ok(*id),
            RecordKey::Name(name) => name.parse().map_err(|e| StoreError::InvalidKey {
                collection: self.spec.collection,
                reason: format!("expected an integer id, got {name:?}: {e}"),
            }),
        }
    }

    fn string_key<'k>(&self, key: &'k RecordKey) -> Result<&'k str, StoreError> {
        match key {
            RecordKey::Name(name) => Ok(name),
            RecordKey::Id(id) => Err(StoreError::InvalidKey {
                collection: self.spec.collection,
                reason: format!("expected a string key, got integer {id}"),
            }),
        }
    }
}

/// Write one record on an open connection or transaction.
async fn write_one(
    conn: &mut SqliteConnection,
    spec: &TableSpec,
    record: &Value,
    mode: WriteMode,
) -> Result<RecordKey, StoreError> {
    let Value::Object(fields) = record else {
        return Err(StoreError::InvalidKey {
            collection: spec.collection,
            reason: "record is not a JSON object".to_owned(),
        });
    };
    let table = spec.quoted_name();

    match spec.key {
        KeyPolicy::AutoIncrement => {
            let id = match fields.get(ID_FIELD) {
                None | Some(Value::Null) => None,
                Some(value) => Some(value.as_i64().ok_or_else(|| StoreError::InvalidKey {
                    collection: spec.collection,
                    reason: format!("id must be an integer, got {value}"),
                })?),
            };
            let data = encode_without_id(fields)?;

            match (id, mode) {
                (None, _) => {
                    let result = sqlx::query(&format!("INSERT INTO {table} (data) VALUES (?1)"))
                        .bind(data)
                        .execute(&mut *conn)
                        .await?;
                    Ok(RecordKey::Id(result.last_insert_rowid()))
                }
                (Some(id), WriteMode::Insert) => {
                    sqlx::query(&format!("INSERT INTO {table} (id, data) VALUES (?1, ?2)"))
                        .bind(id)
                        .bind(data)
                        .execute(&mut *conn)
                        .await?;
                    Ok(RecordKey::Id(id))
                }
                (Some(id), WriteMode::Upsert) => {
                    sqlx::query(&format!(
                        "INSERT INTO {table} (id, data) VALUES (?1, ?2)
                         ON CONFLICT (id) DO UPDATE SET data = excluded.data"
                    ))
                    .bind(id)
                    .bind(data)
                    .execute(&mut *conn)
                    .await?;
                    Ok(RecordKey::Id(id))
                }
            }
        }
        KeyPolicy::Field(field) => {
            let key = match fields.get(field) {
                Some(Value::String(key)) if !key.is_empty() => key.clone(),
                _ => {
                    return Err(StoreError::InvalidKey {
                        collection: spec.collection,
                        reason: format!("missing non-empty string field {field:?}"),
                    });
                }
            };
            let data = serde_json::to_string(record)?;
            let sql = match mode {
                WriteMode::Insert => format!("INSERT INTO {table} (key, data) VALUES (?1, ?2)"),
                WriteMode::Upsert => format!(
                    "INSERT INTO {table} (key, data) VALUES (?1, ?2)
                     ON CONFLICT (key) DO UPDATE SET data = excluded.data"
                ),
            };
            sqlx::query(&sql)
                .bind(key.as_str())
                .bind(data)
                .execute(&mut *conn)
                .await?;
            Ok(RecordKey::Name(key))
        }
    }
}

fn encode_without_id(fields: &Map<String, Value>) -> Result<String, StoreError> {
    let stripped: Map<String, Value> = fields
        .iter()
        .filter(|(name, _)| name.as_str() != ID_FIELD)
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    Ok(serde_json::to_string(&stripped)?)
}

fn decode(data: &str) -> Result<Value, StoreError> {
    Ok(serde_json::from_str(data)?)
}

fn decode_with_id(id: i64, data: &str) -> Result<Value, StoreError> {
    let mut value: Value = serde_json::from_str(data)?;
    if let Value::Object(fields) = &mut value {
        fields.insert(ID_FIELD.to_owned(), Value::from(id));
    }
    Ok(value)
}
