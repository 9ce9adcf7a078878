use chrono::{DateTime, TimeZone, Utc};
use recall_algo::{DuePolicy, MemoryState, NewItemOrder, Selection};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

pub const MAX_BATCH_SIZE: usize = 500;

const RECORD_COLUMNS: &str = r#"
    "id", "user_id", "item_id", "stability", "difficulty", "repetitions", "lapses",
    "last_reviewed_at_ms", "next_due_at_ms", "is_mastered", "is_favorite", "last_correct",
    "wrong_count", "version", "created_at_ms", "updated_at_ms"
"#;

/// Persisted memory state of one user-item pair plus the flags the
/// application keeps next to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecord {
    pub id: String,
    pub user_id: String,
    pub item_id: String,
    pub memory: MemoryState,
    /// Permanently excluded from review
    pub is_mastered: bool,
    pub is_favorite: bool,
    pub last_correct: bool,
    /// Failed reviews, first exposure included
    pub wrong_count: u32,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStats {
    pub due_count: i64,
    pub new_count: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("corrupt row: {0}")]
    CorruptRow(String),
    #[error("db mutation failed: {0}")]
    Mutation(String),
    #[error(transparent)]
    Sql(#[from] sqlx::Error),
}

pub async fn register_item(
    pool: &SqlitePool,
    item_id: &str,
    now: DateTime<Utc>,
) -> Result<bool, StoreError> {
    validate_id("item_id", item_id)?;
    let result = sqlx::query(r#"INSERT OR IGNORE INTO "items" ("id", "created_at_ms") VALUES (?1, ?2)"#)
        .bind(item_id)
        .bind(now.timestamp_millis())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn get_record(
    pool: &SqlitePool,
    user_id: &str,
    item_id: &str,
) -> Result<Option<ReviewRecord>, StoreError> {
    validate_id("user_id", user_id)?;
    validate_id("item_id", item_id)?;
    let sql = format!(
        r#"SELECT {RECORD_COLUMNS} FROM "memory_states" WHERE "user_id" = ?1 AND "item_id" = ?2 LIMIT 1"#
    );
    let row = sqlx::query(&sql)
        .bind(user_id)
        .bind(item_id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(map_row).transpose()
}

/// Returns the record for the pair, inserting an unseen one (and the catalog
/// entry) on first contact.
pub async fn get_or_create_record(
    pool: &SqlitePool,
    user_id: &str,
    item_id: &str,
    now: DateTime<Utc>,
) -> Result<ReviewRecord, StoreError> {
    if let Some(record) = get_record(pool, user_id, item_id).await? {
        return Ok(record);
    }

    register_item(pool, item_id, now).await?;
    let now_ms = now.timestamp_millis();
    sqlx::query(
        r#"
        INSERT INTO "memory_states" ("id", "user_id", "item_id", "created_at_ms", "updated_at_ms")
        VALUES (?1, ?2, ?3, ?4, ?4)
        ON CONFLICT ("user_id", "item_id") DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(item_id)
    .bind(now_ms)
    .execute(pool)
    .await?;

    get_record(pool, user_id, item_id)
        .await?
        .ok_or_else(|| StoreError::Mutation(format!("record {user_id}/{item_id} missing after insert")))
}

/// Writes a new memory state if the row still carries `record.version`.
///
/// A failed review (`last_correct == false`) also bumps `wrong_count`.
/// Returns `false` when another writer got there first; the caller should
/// reload and recompute.
pub async fn save_memory_state(
    pool: &SqlitePool,
    record: &ReviewRecord,
    memory: &MemoryState,
    last_correct: bool,
    now: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE "memory_states" SET
            "stability" = ?1,
            "difficulty" = ?2,
            "repetitions" = ?3,
            "lapses" = ?4,
            "last_reviewed_at_ms" = ?5,
            "next_due_at_ms" = ?6,
            "last_correct" = ?7,
            "wrong_count" = "wrong_count" + ?8,
            "version" = "version" + 1,
            "updated_at_ms" = ?9
        WHERE "id" = ?10 AND "version" = ?11
        "#,
    )
    .bind(memory.stability)
    .bind(memory.difficulty)
    .bind(i64::from(memory.repetitions))
    .bind(i64::from(memory.lapses))
    .bind(memory.last_reviewed_at.map(|t| t.timestamp_millis()))
    .bind(memory.next_due_at.map(|t| t.timestamp_millis()))
    .bind(last_correct)
    .bind(if last_correct { 0i64 } else { 1i64 })
    .bind(now.timestamp_millis())
    .bind(&record.id)
    .bind(record.version)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Due reviews for a user, most overdue first. The limit is applied in SQL.
pub async fn due_records(
    pool: &SqlitePool,
    user_id: &str,
    policy: &DuePolicy,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<ReviewRecord>, StoreError> {
    validate_id("user_id", user_id)?;
    let limit = validate_limit(limit)?;
    let sql = format!(
        r#"
        SELECT {RECORD_COLUMNS} FROM "memory_states"
        WHERE "user_id" = ?1 {DUE_FILTER}
        ORDER BY "next_due_at_ms" ASC, "item_id" ASC
        LIMIT ?4
        "#
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(now.timestamp_millis())
        .bind(policy.cooldown_cutoff(now).timestamp_millis())
        .bind(limit)
        .fetch_all(pool)
        .await?;
    rows.iter().map(map_row).collect()
}

/// Catalog items the user has never attempted and that are not mastered.
pub async fn new_item_ids(
    pool: &SqlitePool,
    user_id: &str,
    order: NewItemOrder,
    limit: usize,
) -> Result<Vec<String>, StoreError> {
    validate_id("user_id", user_id)?;
    let limit = validate_limit(limit)?;
    let order_by = match order {
        NewItemOrder::Insertion => r#""i"."created_at_ms" ASC, "i".rowid ASC"#,
        NewItemOrder::Shuffled => "RANDOM()",
    };
    let sql = format!(
        r#"
        SELECT "i"."id" FROM "items" AS "i"
        WHERE {NOT_ATTEMPTED_FILTER}
        ORDER BY {order_by}
        LIMIT ?2
        "#
    );
    let ids = sqlx::query_scalar::<_, String>(&sql)
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(ids)
}

/// Due reviews first, then never-attempted items up to `limit`.
pub async fn select_review_batch(
    pool: &SqlitePool,
    user_id: &str,
    policy: &DuePolicy,
    order: NewItemOrder,
    limit: usize,
    now: DateTime<Utc>,
) -> Result<Selection<String>, StoreError> {
    let due: Vec<String> = due_records(pool, user_id, policy, now, limit)
        .await?
        .into_iter()
        .map(|record| record.item_id)
        .collect();

    let needed = limit - due.len();
    let fresh = if needed > 0 {
        new_item_ids(pool, user_id, order, needed).await?
    } else {
        Vec::new()
    };

    Ok(Selection { due, fresh })
}

pub async fn review_stats(
    pool: &SqlitePool,
    user_id: &str,
    policy: &DuePolicy,
    now: DateTime<Utc>,
) -> Result<ReviewStats, StoreError> {
    validate_id("user_id", user_id)?;

    let due_sql = format!(r#"SELECT COUNT(*) FROM "memory_states" WHERE "user_id" = ?1 {DUE_FILTER}"#);
    let due_count = sqlx::query_scalar::<_, i64>(&due_sql)
        .bind(user_id)
        .bind(now.timestamp_millis())
        .bind(policy.cooldown_cutoff(now).timestamp_millis())
        .fetch_one(pool)
        .await?;

    let new_sql = format!(r#"SELECT COUNT(*) FROM "items" AS "i" WHERE {NOT_ATTEMPTED_FILTER}"#);
    let new_count = sqlx::query_scalar::<_, i64>(&new_sql)
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    Ok(ReviewStats {
        due_count,
        new_count,
    })
}

/// Items the user has answered wrong at least once, most failures first.
pub async fn wrong_records(
    pool: &SqlitePool,
    user_id: &str,
    limit: usize,
) -> Result<Vec<ReviewRecord>, StoreError> {
    validate_id("user_id", user_id)?;
    let limit = validate_limit(limit)?;
    let sql = format!(
        r#"
        SELECT {RECORD_COLUMNS} FROM "memory_states"
        WHERE "user_id" = ?1 AND "wrong_count" > 0
        ORDER BY "wrong_count" DESC, "updated_at_ms" DESC
        LIMIT ?2
        "#
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    rows.iter().map(map_row).collect()
}

pub async fn favorite_records(
    pool: &SqlitePool,
    user_id: &str,
    limit: usize,
) -> Result<Vec<ReviewRecord>, StoreError> {
    validate_id("user_id", user_id)?;
    let limit = validate_limit(limit)?;
    let sql = format!(
        r#"
        SELECT {RECORD_COLUMNS} FROM "memory_states"
        WHERE "user_id" = ?1 AND "is_favorite" = 1
        ORDER BY "updated_at_ms" DESC
        LIMIT ?2
        "#
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    rows.iter().map(map_row).collect()
}

/// Flips the favorite flag and returns its new value.
pub async fn toggle_favorite(
    pool: &SqlitePool,
    user_id: &str,
    item_id: &str,
    now: DateTime<Utc>,
) -> Result<bool, StoreError> {
    get_or_create_record(pool, user_id, item_id, now).await?;
    let value = sqlx::query_scalar::<_, bool>(
        r#"
        UPDATE "memory_states"
        SET "is_favorite" = 1 - "is_favorite", "version" = "version" + 1, "updated_at_ms" = ?3
        WHERE "user_id" = ?1 AND "item_id" = ?2
        RETURNING "is_favorite"
        "#,
    )
    .bind(user_id)
    .bind(item_id)
    .bind(now.timestamp_millis())
    .fetch_one(pool)
    .await?;
    Ok(value)
}

pub async fn set_mastered(
    pool: &SqlitePool,
    user_id: &str,
    item_id: &str,
    mastered: bool,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    get_or_create_record(pool, user_id, item_id, now).await?;
    sqlx::query(
        r#"
        UPDATE "memory_states"
        SET "is_mastered" = ?3, "version" = "version" + 1, "updated_at_ms" = ?4
        WHERE "user_id" = ?1 AND "item_id" = ?2
        "#,
    )
    .bind(user_id)
    .bind(item_id)
    .bind(mastered)
    .bind(now.timestamp_millis())
    .execute(pool)
    .await?;
    Ok(())
}

// Binds: ?1 user_id, ?2 now_ms, ?3 cooldown cutoff ms
const DUE_FILTER: &str = r#"
    AND "repetitions" > 0
    AND "is_mastered" = 0
    AND "next_due_at_ms" IS NOT NULL
    AND "next_due_at_ms" <= ?2
    AND ("last_reviewed_at_ms" IS NULL OR "last_reviewed_at_ms" <= ?3)
"#;

// Binds: ?1 user_id
const NOT_ATTEMPTED_FILTER: &str = r#"
    NOT EXISTS (
        SELECT 1 FROM "memory_states" AS "s"
        WHERE "s"."user_id" = ?1
          AND "s"."item_id" = "i"."id"
          AND ("s"."repetitions" > 0 OR "s"."is_mastered" = 1)
    )
"#;

fn validate_id(field: &str, value: &str) -> Result<(), StoreError> {
    if value.trim().is_empty() {
        return Err(StoreError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn validate_limit(limit: usize) -> Result<i64, StoreError> {
    if limit == 0 || limit > MAX_BATCH_SIZE {
        return Err(StoreError::Validation(format!(
            "limit must be between 1 and {MAX_BATCH_SIZE}, got {limit}"
        )));
    }
    Ok(limit as i64)
}

fn map_row(row: &SqliteRow) -> Result<ReviewRecord, StoreError> {
    let id: String = row.try_get("id")?;
    let memory = MemoryState {
        stability: row.try_get("stability")?,
        difficulty: row.try_get("difficulty")?,
        repetitions: counter(row, &id, "repetitions")?,
        lapses: counter(row, &id, "lapses")?,
        last_reviewed_at: optional_timestamp(row, &id, "last_reviewed_at_ms")?,
        next_due_at: optional_timestamp(row, &id, "next_due_at_ms")?,
    };
    Ok(ReviewRecord {
        user_id: row.try_get("user_id")?,
        item_id: row.try_get("item_id")?,
        memory,
        is_mastered: row.try_get("is_mastered")?,
        is_favorite: row.try_get("is_favorite")?,
        last_correct: row.try_get("last_correct")?,
        wrong_count: counter(row, &id, "wrong_count")?,
        version: row.try_get("version")?,
        created_at: timestamp(row, &id, "created_at_ms")?,
        updated_at: timestamp(row, &id, "updated_at_ms")?,
        id,
    })
}

fn counter(row: &SqliteRow, id: &str, column: &str) -> Result<u32, StoreError> {
    let raw: i64 = row.try_get(column)?;
    u32::try_from(raw)
        .map_err(|_| StoreError::CorruptRow(format!("{id}: {column} out of range ({raw})")))
}

fn optional_timestamp(
    row: &SqliteRow,
    id: &str,
    column: &str,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    let raw: Option<i64> = row.try_get(column)?;
    raw.map(|ms| from_millis(id, column, ms)).transpose()
}

fn timestamp(row: &SqliteRow, id: &str, column: &str) -> Result<DateTime<Utc>, StoreError> {
    let ms: i64 = row.try_get(column)?;
    from_millis(id, column, ms)
}

fn from_millis(id: &str, column: &str, ms: i64) -> Result<DateTime<Utc>, StoreError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StoreError::CorruptRow(format!("{id}: {column} is not a valid timestamp ({ms})")))
}
