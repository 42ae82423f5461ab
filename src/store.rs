//! SQLite persistence for per-player stat tables.
//!
//! Each player gets one table named `p<player id>`. Its columns are a
//! `playoffs` flag followed by the schema derived from the first table
//! ever ingested for that player; later ingests never alter it.

use std::path::{Path, PathBuf};

use itertools::Itertools;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection, Row, TypeInfo, ValueRef};
use tracing::{debug, instrument, warn};

use crate::error::{NbaError, Result};
use crate::ingest::{derive_schema, extract_rows};
use crate::model::{Column, ColumnKind, DerivedSchema, StatRow, StatTable, StatValue};

pub const DEFAULT_DATABASE: &str = "data.db";

const PLAYOFFS_COLUMN: &str = "playoffs";
const SEASON_COLUMN: &str = "Season";

/// What to do when an ingested row's (season, playoffs) key is already
/// stored for the player.
#[derive(
    Default,
    Debug,
    Clone,
    Copy,
    Hash,
    Eq,
    PartialEq,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Insert anyway; re-scraping a season stores it twice.
    #[default]
    Allow,
    /// Fail the whole batch with [`NbaError::DuplicateRow`].
    Reject,
    /// Delete the stored rows for that key before inserting.
    Overwrite,
}

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub path: PathBuf,
    pub duplicates: DuplicatePolicy,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DATABASE),
            duplicates: DuplicatePolicy::default(),
        }
    }
}

/// File-backed store of player stat tables.
///
/// Every operation opens its own connection, commits, and closes it
/// again; nothing is pooled between calls.
#[derive(Debug, Clone)]
pub struct StatStore {
    options: StoreOptions,
}

impl StatStore {
    pub fn new(options: StoreOptions) -> Self {
        Self { options }
    }

    /// Store at `path` with the default duplicate policy.
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self::new(StoreOptions {
            path: path.as_ref().to_path_buf(),
            ..StoreOptions::default()
        })
    }

    pub fn path(&self) -> &Path {
        &self.options.path
    }

    pub fn duplicate_policy(&self) -> DuplicatePolicy {
        self.options.duplicates
    }

    pub fn table_name(player_id: u32) -> String {
        format!("p{player_id}")
    }

    async fn connect(&self) -> Result<SqliteConnection> {
        let connection = SqliteConnectOptions::new()
            .filename(&self.options.path)
            .create_if_missing(true)
            .connect()
            .await?;
        Ok(connection)
    }

    /// Create the player's table from `schema` unless it already exists.
    ///
    /// Returns the stored columns, which are the existing ones when the
    /// table was created by an earlier call.
    #[instrument(skip(self, schema))]
    pub async fn initialize_schema(&self, player_id: u32, schema: &[Column]) -> Result<DerivedSchema> {
        let table = Self::table_name(player_id);
        let mut connection = self.connect().await?;

        let mut tx = connection.begin().await?;
        let columns = ensure_schema(&mut tx, &table, schema).await?;
        tx.commit().await?;

        connection.close().await?;
        Ok(columns)
    }

    /// Persist every row of `table` for `player_id` as one batch.
    ///
    /// Creates the player's table on first sight. Returns the number of
    /// rows inserted.
    #[instrument(skip(self, table))]
    pub async fn ingest(&self, table: &StatTable, player_id: u32, playoffs: bool) -> Result<usize> {
        let name = Self::table_name(player_id);
        let derived = derive_schema(&table.headers);
        let rows = extract_rows(table, playoffs)?;

        let mut connection = self.connect().await?;
        let mut tx = connection.begin().await?;

        let columns = ensure_schema(&mut tx, &name, &derived).await?;
        if columns != derived {
            return Err(NbaError::SchemaMismatch {
                table: name,
                expected: column_names(&columns),
                found: column_names(&derived),
            });
        }
        if let Some(row) = rows.iter().find(|row| row.values.len() != columns.len()) {
            return Err(NbaError::RowWidth {
                table: name,
                expected: columns.len(),
                found: row.values.len(),
            });
        }

        self.apply_duplicate_policy(&mut tx, &name, &columns, &rows)
            .await?;

        let placeholders = vec!["?"; columns.len() + 1].join(", ");
        let sql = format!("INSERT INTO {} VALUES ({placeholders})", quote_ident(&name));
        for row in &rows {
            let mut query = sqlx::query(&sql).bind(i64::from(row.playoffs));
            for value in &row.values {
                query = match value {
                    StatValue::Null => query.bind(None::<f64>),
                    StatValue::Text(text) => query.bind(text.clone()),
                    StatValue::Number(number) => query.bind(*number),
                };
            }
            query.execute(&mut *tx).await?;
        }

        tx.commit().await?;
        connection.close().await?;

        debug!(count = rows.len(), player_id, playoffs, "ingested stat rows");
        Ok(rows.len())
    }

    async fn apply_duplicate_policy(
        &self,
        tx: &mut SqliteConnection,
        table: &str,
        columns: &[Column],
        rows: &[StatRow],
    ) -> Result<()> {
        let policy = self.options.duplicates;
        if policy == DuplicatePolicy::Allow {
            return Ok(());
        }
        let Some(season_idx) = columns.iter().position(|c| c.name == SEASON_COLUMN) else {
            warn!(table, %policy, "no Season column; duplicate rows are allowed");
            return Ok(());
        };

        let keys = rows
            .iter()
            .filter_map(|row| {
                row.values[season_idx]
                    .as_text()
                    .map(|season| (season.to_string(), row.playoffs))
            })
            .unique()
            .collect_vec();

        for (season, playoffs) in keys {
            let filter = format!(
                "FROM {} WHERE {} = ? AND {PLAYOFFS_COLUMN} = ?",
                quote_ident(table),
                quote_ident(SEASON_COLUMN)
            );
            match policy {
                DuplicatePolicy::Reject => {
                    let stored: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {filter}"))
                        .bind(&season)
                        .bind(i64::from(playoffs))
                        .fetch_one(&mut *tx)
                        .await?;
                    if stored > 0 {
                        return Err(NbaError::DuplicateRow {
                            table: table.to_string(),
                            season,
                            playoffs,
                        });
                    }
                }
                DuplicatePolicy::Overwrite => {
                    let deleted = sqlx::query(&format!("DELETE {filter}"))
                        .bind(&season)
                        .bind(i64::from(playoffs))
                        .execute(&mut *tx)
                        .await?
                        .rows_affected();
                    if deleted > 0 {
                        debug!(table, season = %season, playoffs, deleted, "replacing stored rows");
                    }
                }
                DuplicatePolicy::Allow => {}
            }
        }
        Ok(())
    }

    /// Stored columns for the player, without the `playoffs` flag, or
    /// `None` if nothing has been ingested yet.
    pub async fn columns(&self, player_id: u32) -> Result<Option<DerivedSchema>> {
        let mut connection = self.connect().await?;
        let columns = load_columns(&mut connection, &Self::table_name(player_id)).await?;
        connection.close().await?;
        Ok(columns)
    }

    /// Every stored row for the player in insertion order.
    pub async fn rows(&self, player_id: u32) -> Result<Vec<StatRow>> {
        let table = Self::table_name(player_id);
        let mut connection = self.connect().await?;
        if load_columns(&mut connection, &table).await?.is_none() {
            connection.close().await?;
            return Ok(Vec::new());
        }

        let sql = format!("SELECT * FROM {} ORDER BY rowid", quote_ident(&table));
        let records = sqlx::query(&sql).fetch_all(&mut connection).await?;
        connection.close().await?;

        records
            .iter()
            .map(|record| -> Result<StatRow> {
                let playoffs: i64 = record.try_get(PLAYOFFS_COLUMN)?;
                let values = (1..record.len())
                    .map(|idx| decode_value(record, idx))
                    .collect::<Result<_>>()?;
                Ok(StatRow {
                    playoffs: playoffs != 0,
                    values,
                })
            })
            .collect()
    }
}

/// Create `table` from `schema` if it is absent, otherwise leave it alone.
async fn ensure_schema(
    connection: &mut SqliteConnection,
    table: &str,
    schema: &[Column],
) -> Result<DerivedSchema> {
    if let Some(existing) = load_columns(connection, table).await? {
        debug!(table, "table exists; keeping its schema");
        return Ok(existing);
    }

    let table_ident = quote_ident(table);
    sqlx::query(&format!("CREATE TABLE {table_ident} ({PLAYOFFS_COLUMN} INTEGER)"))
        .execute(&mut *connection)
        .await?;
    for column in schema {
        let sql = format!(
            "ALTER TABLE {table_ident} ADD {} {}",
            quote_ident(&column.name),
            column.kind.sql_type()
        );
        sqlx::query(&sql).execute(&mut *connection).await?;
    }

    debug!(table, columns = schema.len(), "created player table");
    Ok(schema.to_vec())
}

async fn load_columns(connection: &mut SqliteConnection, table: &str) -> Result<Option<DerivedSchema>> {
    let sql = format!("PRAGMA table_info({})", quote_ident(table));
    let info = sqlx::query(&sql).fetch_all(&mut *connection).await?;
    if info.is_empty() {
        return Ok(None);
    }

    let columns = info
        .iter()
        .map(|row| -> Result<Column> {
            let name: String = row.try_get("name")?;
            let declared: String = row.try_get("type")?;
            Ok(Column {
                name,
                kind: ColumnKind::from_sql_type(&declared),
            })
        })
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .filter(|column| column.name != PLAYOFFS_COLUMN)
        .collect();
    Ok(Some(columns))
}

fn decode_value(record: &sqlx::sqlite::SqliteRow, idx: usize) -> Result<StatValue> {
    let raw = record.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(StatValue::Null);
    }
    // NUMERIC affinity keeps unparseable text as TEXT, so go by the
    // stored type rather than the declared one.
    let is_text = raw.type_info().name() == "TEXT";
    if is_text {
        Ok(StatValue::Text(record.try_get_unchecked::<String, _>(idx)?))
    } else {
        Ok(StatValue::Number(record.try_get_unchecked::<f64, _>(idx)?))
    }
}

fn column_names(columns: &[Column]) -> Vec<String> {
    columns.iter().map(|c| c.name.clone()).collect()
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
