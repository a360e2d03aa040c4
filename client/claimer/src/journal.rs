//! Claim journal: SQLite persistence for lifecycle events.
//!
//! Keeps a record of every submitted hash so one that resolves on-chain after
//! its tranche was reset can still be traced.

use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::errors::Result;
use crate::events::{ClaimEvent, ClaimEventRecord};

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

/// Persist one event. Exact duplicates are ignored.
pub async fn insert_event(pool: &SqlitePool, ev: &ClaimEvent) -> Result<bool> {
    let rows_affected = sqlx::query(
        r#"
        INSERT OR IGNORE INTO claim_events
            (tranche, account, kind, tx_hash, detail, timestamp)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(ev.tranche.as_str())
    .bind(ev.account.to_string())
    .bind(ev.kind.as_str())
    .bind(ev.tx_hash.map(|h| h.to_string()))
    .bind(&ev.detail)
    .bind(ev.timestamp)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(rows_affected > 0)
}

/// Fetch all events for an account, oldest first.
pub async fn get_events_for_account(
    pool: &SqlitePool,
    account: &str,
) -> Result<Vec<ClaimEventRecord>> {
    let rows = sqlx::query_as::<_, ClaimEventRecord>(
        r#"
        SELECT id, tranche, account, kind, tx_hash, detail, timestamp, created_at
        FROM   claim_events
        WHERE  account = ?1
        ORDER  BY timestamp ASC, id ASC
        "#,
    )
    .bind(account)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Background task: drain the event channel into the journal until the
/// channel closes or `shutdown` fires. Events already buffered when
/// `shutdown` fires are still written.
pub async fn run(
    pool: SqlitePool,
    mut events: broadcast::Receiver<ClaimEvent>,
    shutdown: CancellationToken,
) {
    info!("Claim journal started");
    loop {
        let received = tokio::select! {
            biased;
            received = events.recv() => received,
            _ = shutdown.cancelled() => break,
        };
        match received {
            Ok(ev) => record(&pool, &ev).await,
            Err(RecvError::Lagged(missed)) => warn!("Claim journal lagged, {missed} events lost"),
            Err(RecvError::Closed) => break,
        }
    }

    let mut flushed = 0usize;
    loop {
        match events.try_recv() {
            Ok(ev) => {
                record(&pool, &ev).await;
                flushed += 1;
            }
            Err(TryRecvError::Lagged(missed)) => warn!("Claim journal lagged, {missed} events lost"),
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
    if flushed > 0 {
        info!("Claim journal flushed {flushed} buffered events");
    }
    info!("Claim journal stopped");
}

async fn record(pool: &SqlitePool, ev: &ClaimEvent) {
    if let Err(e) = insert_event(pool, ev).await {
        error!("Journal write failed for {} {}: {e}", ev.tranche, ev.kind.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ClaimEventKind;
    use crate::types::Tranche;
    use alloy_primitives::{Address, B256};

    async fn memory_pool() -> SqlitePool {
        // One connection, or every connection gets its own empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn event(kind: ClaimEventKind) -> ClaimEvent {
        ClaimEvent {
            tranche: Tranche::Mandatory,
            account: Address::repeat_byte(0x42),
            kind,
            tx_hash: Some(B256::repeat_byte(0xab)),
            detail: None,
            timestamp: 1_704_067_200,
        }
    }

    #[tokio::test]
    async fn insert_and_read_back() {
        let pool = memory_pool().await;
        assert!(insert_event(&pool, &event(ClaimEventKind::Submitted)).await.unwrap());
        assert!(insert_event(&pool, &event(ClaimEventKind::Confirmed)).await.unwrap());

        let account = Address::repeat_byte(0x42).to_string();
        let rows = get_events_for_account(&pool, &account).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].kind, "submitted");
        assert_eq!(rows[1].kind, "confirmed");
        assert_eq!(rows[0].tranche, "mandatory");
        assert_eq!(
            rows[0].tx_hash.as_deref(),
            Some(B256::repeat_byte(0xab).to_string().as_str())
        );
    }

    #[tokio::test]
    async fn duplicate_events_are_ignored() {
        let pool = memory_pool().await;
        let ev = event(ClaimEventKind::Submitted);
        assert!(insert_event(&pool, &ev).await.unwrap());
        assert!(!insert_event(&pool, &ev).await.unwrap());
    }

    #[tokio::test]
    async fn run_drains_channel_until_closed() {
        let pool = memory_pool().await;
        let (tx, rx) = broadcast::channel(8);
        let task = tokio::spawn(run(pool.clone(), rx, CancellationToken::new()));

        tx.send(event(ClaimEventKind::Submitted)).unwrap();
        tx.send(event(ClaimEventKind::Reverted)).unwrap();
        drop(tx);
        task.await.unwrap();

        let account = Address::repeat_byte(0x42).to_string();
        let rows = get_events_for_account(&pool, &account).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn shutdown_flushes_buffered_events() {
        let pool = memory_pool().await;
        let (tx, rx) = broadcast::channel(8);
        let shutdown = CancellationToken::new();

        tx.send(event(ClaimEventKind::Submitted)).unwrap();
        tx.send(event(ClaimEventKind::Confirmed)).unwrap();
        shutdown.cancel();
        run(pool.clone(), rx, shutdown).await;

        let account = Address::repeat_byte(0x42).to_string();
        let rows = get_events_for_account(&pool, &account).await.unwrap();
        assert_eq!(rows.len(), 2);
    }
}
