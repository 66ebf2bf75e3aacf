use std::collections::HashMap;

use anyhow::Context;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::models::Snapshot;
use crate::snapshot::{self, ATTENDANCE_KEY, BATCHES_KEY, STUDENTS_KEY};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Writes the demo dataset over the three stored keys.
pub async fn seed(pool: &PgPool, today: NaiveDate) -> anyhow::Result<()> {
    let demo = snapshot::demo(today);
    let values = [
        (BATCHES_KEY, serde_json::to_string(&demo.batches)?),
        (STUDENTS_KEY, serde_json::to_string(&demo.students)?),
        (ATTENDANCE_KEY, serde_json::to_string(&demo.attendance)?),
    ];

    for (key, value) in values {
        sqlx::query(
            r#"
            INSERT INTO attendance_insights.app_store (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value, updated_at = now()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(pool)
        .await
        .with_context(|| format!("failed to store `{key}`"))?;
    }

    info!(
        batches = demo.batches.len(),
        students = demo.students.len(),
        "seeded demo data"
    );
    Ok(())
}

pub async fn fetch_snapshot(pool: &PgPool) -> anyhow::Result<Snapshot> {
    let rows = sqlx::query(
        "SELECT key, value FROM attendance_insights.app_store WHERE key = ANY($1)",
    )
    .bind(vec![BATCHES_KEY, STUDENTS_KEY, ATTENDANCE_KEY])
    .fetch_all(pool)
    .await
    .context("failed to read stored attendance data")?;

    let mut values: HashMap<String, String> = HashMap::new();
    for row in rows {
        values.insert(row.get("key"), row.get("value"));
    }
    debug!(keys = values.len(), "read stored values");

    snapshot::decode(
        values.get(BATCHES_KEY).map(String::as_str),
        values.get(STUDENTS_KEY).map(String::as_str),
        values.get(ATTENDANCE_KEY).map(String::as_str),
    )
}
