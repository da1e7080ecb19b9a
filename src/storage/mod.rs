//! SQLite persistence layer
//!
//! One `Database` handle owns schema creation and every query in the bot.
//! The `trades` table is populated by an external ingestion pipeline and
//! is only ever read here; `signals`, `paper_positions` and
//! `signal_history` are written by the gate and the ledger. Money values
//! are stored as REAL and converted to `Decimal` at this boundary.

use crate::detector::SignalSnapshot;
use crate::error::Result;
use crate::types::{Side, StoredTrade};
use chrono::Utc;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS trades (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    market_slug TEXT NOT NULL,
    market_question TEXT NOT NULL,
    outcome TEXT NOT NULL,
    side TEXT NOT NULL,
    price REAL NOT NULL,
    size_usd REAL NOT NULL,
    timestamp INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_trades_time ON trades(timestamp);
CREATE INDEX IF NOT EXISTS idx_trades_market ON trades(market_slug, outcome, timestamp);

CREATE TABLE IF NOT EXISTS signals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    type TEXT NOT NULL,
    confidence INTEGER NOT NULL,
    market_slug TEXT NOT NULL,
    market_question TEXT NOT NULL,
    outcome TEXT NOT NULL,
    direction TEXT NOT NULL,
    price REAL NOT NULL,
    details TEXT,
    timestamp INTEGER NOT NULL,
    position_opened INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS paper_positions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    signal_id INTEGER,
    market_slug TEXT NOT NULL,
    market_question TEXT NOT NULL,
    outcome TEXT NOT NULL,
    direction TEXT NOT NULL,
    entry_price REAL NOT NULL,
    entry_time INTEGER NOT NULL,
    size REAL NOT NULL,
    confidence INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'open',
    current_price REAL,
    unrealized_pnl REAL,
    unrealized_roi REAL,
    exit_price REAL,
    exit_time INTEGER,
    pnl REAL,
    roi REAL,
    close_reason TEXT,
    notes TEXT,
    updated_at INTEGER
);
CREATE INDEX IF NOT EXISTS idx_positions_status ON paper_positions(status);
CREATE INDEX IF NOT EXISTS idx_positions_market ON paper_positions(market_slug, outcome, status);

CREATE TABLE IF NOT EXISTS signal_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    signal_id TEXT UNIQUE NOT NULL,
    signal_type TEXT NOT NULL,
    market_slug TEXT NOT NULL,
    market_name TEXT NOT NULL,
    market_end_date TEXT,
    detected_at INTEGER NOT NULL,
    confidence REAL NOT NULL,
    recommendation TEXT NOT NULL,
    entry_price REAL NOT NULL,
    reasoning TEXT,
    outcome_known INTEGER NOT NULL DEFAULT 0,
    outcome_checked_at INTEGER,
    market_result TEXT,
    final_price REAL,
    signal_correct INTEGER,
    edge REAL,
    position_opened INTEGER NOT NULL DEFAULT 0,
    position_id INTEGER
);
CREATE INDEX IF NOT EXISTS idx_history_type ON signal_history(signal_type);
CREATE INDEX IF NOT EXISTS idx_history_pending ON signal_history(outcome_known);

CREATE TABLE IF NOT EXISTS signal_snapshots (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    generated_at INTEGER NOT NULL,
    document TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS heartbeat (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    last_check INTEGER NOT NULL,
    pid INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS portfolio_stats (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    total_trades INTEGER NOT NULL DEFAULT 0,
    wins INTEGER NOT NULL DEFAULT 0,
    losses INTEGER NOT NULL DEFAULT 0,
    total_pnl REAL NOT NULL DEFAULT 0
);
INSERT OR IGNORE INTO portfolio_stats (id) VALUES (1);
"#;

fn to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

fn to_dec(v: f64) -> Decimal {
    Decimal::from_f64(v).unwrap_or_default()
}

/// Signal row as handed to the store by the gate
#[derive(Debug, Clone)]
pub struct NewSignal {
    pub signal_type: String,
    pub confidence: u32,
    pub market_slug: String,
    pub market_question: String,
    pub outcome: String,
    pub direction: Side,
    pub price: Decimal,
    pub details: serde_json::Value,
}

/// Position row as handed to the store by the gate (or a manual open,
/// which has no originating signal)
#[derive(Debug, Clone)]
pub struct NewPosition {
    pub signal_id: Option<i64>,
    pub market_slug: String,
    pub market_question: String,
    pub outcome: String,
    pub direction: Side,
    pub entry_price: Decimal,
    pub size: Decimal,
    pub confidence: u32,
    pub notes: serde_json::Value,
}

/// A paper position as read back from the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperPosition {
    pub id: i64,
    pub signal_id: Option<i64>,
    pub market_slug: String,
    pub market_question: String,
    pub outcome: String,
    pub direction: Side,
    pub entry_price: Decimal,
    pub entry_time: i64,
    pub size: Decimal,
    pub confidence: u32,
    pub status: String,
    pub current_price: Option<Decimal>,
    pub unrealized_pnl: Option<Decimal>,
    pub unrealized_roi: Option<Decimal>,
    pub exit_price: Option<Decimal>,
    pub exit_time: Option<i64>,
    pub pnl: Option<Decimal>,
    pub roi: Option<Decimal>,
    pub close_reason: Option<String>,
    pub notes: Option<String>,
}

/// Closed position joined to its originating signal, for the analyzer
#[derive(Debug, Clone)]
pub struct ClosedTrade {
    pub signal_type: String,
    pub confidence: u32,
    pub pnl: Decimal,
    pub roi: Decimal,
}

/// Accuracy-tracking ledger entry (one per logged signal)
#[derive(Debug, Clone)]
pub struct SignalHistoryRecord {
    pub signal_id: String,
    pub signal_type: String,
    pub market_slug: String,
    pub market_name: String,
    pub market_end_date: Option<String>,
    pub detected_at: i64,
    pub confidence: f64,
    pub recommendation: String,
    pub entry_price: Decimal,
    pub reasoning: Option<String>,
    pub outcome_known: bool,
    pub market_result: Option<String>,
    pub final_price: Option<Decimal>,
    pub signal_correct: Option<bool>,
    pub edge: Option<Decimal>,
    pub position_opened: bool,
}

/// Running aggregate counters, updated on every close
#[derive(Debug, Clone, Default)]
pub struct PortfolioStats {
    pub total_trades: i64,
    pub wins: i64,
    pub losses: i64,
    pub total_pnl: Decimal,
}

#[derive(FromRow)]
struct TradeRow {
    market_slug: String,
    market_question: String,
    outcome: String,
    side: String,
    price: f64,
    size_usd: f64,
    timestamp: i64,
}

impl TradeRow {
    fn into_trade(self) -> StoredTrade {
        StoredTrade {
            side: Side::from_str(&self.side).unwrap_or(Side::Buy),
            market_slug: self.market_slug,
            market_question: self.market_question,
            outcome: self.outcome,
            price: to_dec(self.price),
            size_usd: to_dec(self.size_usd),
            timestamp: self.timestamp,
        }
    }
}

#[derive(FromRow)]
struct PositionRow {
    id: i64,
    signal_id: Option<i64>,
    market_slug: String,
    market_question: String,
    outcome: String,
    direction: String,
    entry_price: f64,
    entry_time: i64,
    size: f64,
    confidence: i64,
    status: String,
    current_price: Option<f64>,
    unrealized_pnl: Option<f64>,
    unrealized_roi: Option<f64>,
    exit_price: Option<f64>,
    exit_time: Option<i64>,
    pnl: Option<f64>,
    roi: Option<f64>,
    close_reason: Option<String>,
    notes: Option<String>,
}

impl PositionRow {
    fn into_position(self) -> PaperPosition {
        PaperPosition {
            id: self.id,
            signal_id: self.signal_id,
            direction: Side::from_str(&self.direction).unwrap_or(Side::Buy),
            market_slug: self.market_slug,
            market_question: self.market_question,
            outcome: self.outcome,
            entry_price: to_dec(self.entry_price),
            entry_time: self.entry_time,
            size: to_dec(self.size),
            confidence: self.confidence.max(0) as u32,
            status: self.status,
            current_price: self.current_price.map(to_dec),
            unrealized_pnl: self.unrealized_pnl.map(to_dec),
            unrealized_roi: self.unrealized_roi.map(to_dec),
            exit_price: self.exit_price.map(to_dec),
            exit_time: self.exit_time,
            pnl: self.pnl.map(to_dec),
            roi: self.roi.map(to_dec),
            close_reason: self.close_reason,
            notes: self.notes,
        }
    }
}

#[derive(FromRow)]
struct HistoryRow {
    signal_id: String,
    signal_type: String,
    market_slug: String,
    market_name: String,
    market_end_date: Option<String>,
    detected_at: i64,
    confidence: f64,
    recommendation: String,
    entry_price: f64,
    reasoning: Option<String>,
    outcome_known: i64,
    market_result: Option<String>,
    final_price: Option<f64>,
    signal_correct: Option<i64>,
    edge: Option<f64>,
    position_opened: i64,
}

impl HistoryRow {
    fn into_record(self) -> SignalHistoryRecord {
        SignalHistoryRecord {
            signal_id: self.signal_id,
            signal_type: self.signal_type,
            market_slug: self.market_slug,
            market_name: self.market_name,
            market_end_date: self.market_end_date,
            detected_at: self.detected_at,
            confidence: self.confidence,
            recommendation: self.recommendation,
            entry_price: to_dec(self.entry_price),
            reasoning: self.reasoning,
            outcome_known: self.outcome_known != 0,
            market_result: self.market_result,
            final_price: self.final_price.map(to_dec),
            signal_correct: self.signal_correct.map(|v| v != 0),
            edge: self.edge.map(to_dec),
            position_opened: self.position_opened != 0,
        }
    }
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if necessary) the database file and apply the schema.
    /// Connection failure here is run-fatal; everything downstream isolates
    /// errors per item.
    pub async fn connect(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
        }

        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// In-memory database for tests. Single connection so every query sees
    /// the same store.
    pub async fn connect_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        debug!("Schema ensured");
        Ok(())
    }

    // ---- trade store (read-only input) ----

    /// Whale-sized trades since `cutoff`, oldest first
    pub async fn whale_trades_since(
        &self,
        cutoff: i64,
        min_size: Decimal,
    ) -> Result<Vec<StoredTrade>> {
        let rows = sqlx::query_as::<_, TradeRow>(
            r#"SELECT market_slug, market_question, outcome, side, price, size_usd, timestamp
               FROM trades
               WHERE size_usd >= ? AND timestamp > ?
               ORDER BY timestamp ASC"#,
        )
        .bind(to_f64(min_size))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(TradeRow::into_trade).collect())
    }

    /// All trades since `cutoff`, grouped-friendly ordering
    pub async fn trades_since(&self, cutoff: i64) -> Result<Vec<StoredTrade>> {
        let rows = sqlx::query_as::<_, TradeRow>(
            r#"SELECT market_slug, market_question, outcome, side, price, size_usd, timestamp
               FROM trades
               WHERE timestamp > ?
               ORDER BY market_slug, outcome, timestamp ASC"#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(TradeRow::into_trade).collect())
    }

    /// Latest observed trade price for a market/outcome
    pub async fn latest_price(&self, market_slug: &str, outcome: &str) -> Result<Option<Decimal>> {
        let row: Option<(f64,)> = sqlx::query_as(
            r#"SELECT price FROM trades
               WHERE market_slug = ? AND outcome = ?
               ORDER BY timestamp DESC LIMIT 1"#,
        )
        .bind(market_slug)
        .bind(outcome)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(p,)| to_dec(p)))
    }

    #[cfg(test)]
    pub async fn insert_trade(&self, trade: &StoredTrade) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO trades (market_slug, market_question, outcome, side, price, size_usd, timestamp)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&trade.market_slug)
        .bind(&trade.market_question)
        .bind(&trade.outcome)
        .bind(trade.side.to_string())
        .bind(to_f64(trade.price))
        .bind(to_f64(trade.size_usd))
        .bind(trade.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- signals ----

    pub async fn insert_signal(&self, signal: &NewSignal) -> Result<i64> {
        let res = sqlx::query(
            r#"INSERT INTO signals
               (type, confidence, market_slug, market_question, outcome, direction, price, details, timestamp)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&signal.signal_type)
        .bind(signal.confidence as i64)
        .bind(&signal.market_slug)
        .bind(&signal.market_question)
        .bind(&signal.outcome)
        .bind(signal.direction.to_string())
        .bind(to_f64(signal.price))
        .bind(signal.details.to_string())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(res.last_insert_rowid())
    }

    // ---- positions ----

    pub async fn has_open_position(&self, market_slug: &str, outcome: &str) -> Result<bool> {
        let (count,): (i64,) = sqlx::query_as(
            r#"SELECT COUNT(*) FROM paper_positions
               WHERE market_slug = ? AND outcome = ? AND status = 'open'"#,
        )
        .bind(market_slug)
        .bind(outcome)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    /// Open a position inside one transaction with a re-check of the
    /// one-open-position-per-(market, outcome) invariant. Returns `None`
    /// when an open position already exists. Also marks the originating
    /// signal as traded.
    pub async fn open_position_guarded(&self, new: &NewPosition) -> Result<Option<i64>> {
        let mut tx = self.pool.begin().await?;

        let (count,): (i64,) = sqlx::query_as(
            r#"SELECT COUNT(*) FROM paper_positions
               WHERE market_slug = ? AND outcome = ? AND status = 'open'"#,
        )
        .bind(&new.market_slug)
        .bind(&new.outcome)
        .fetch_one(&mut *tx)
        .await?;

        if count > 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let res = sqlx::query(
            r#"INSERT INTO paper_positions
               (signal_id, market_slug, market_question, outcome, direction,
                entry_price, entry_time, size, confidence, status, notes)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'open', ?)"#,
        )
        .bind(new.signal_id)
        .bind(&new.market_slug)
        .bind(&new.market_question)
        .bind(&new.outcome)
        .bind(new.direction.to_string())
        .bind(to_f64(new.entry_price))
        .bind(Utc::now().timestamp_millis())
        .bind(to_f64(new.size))
        .bind(new.confidence as i64)
        .bind(new.notes.to_string())
        .execute(&mut *tx)
        .await?;

        let position_id = res.last_insert_rowid();

        if let Some(signal_id) = new.signal_id {
            sqlx::query("UPDATE signals SET position_opened = 1 WHERE id = ?")
                .bind(signal_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(Some(position_id))
    }

    pub async fn open_positions(&self) -> Result<Vec<PaperPosition>> {
        let rows = sqlx::query_as::<_, PositionRow>(
            "SELECT * FROM paper_positions WHERE status = 'open' ORDER BY entry_time ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PositionRow::into_position).collect())
    }

    pub async fn position(&self, id: i64) -> Result<Option<PaperPosition>> {
        let row = sqlx::query_as::<_, PositionRow>("SELECT * FROM paper_positions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(PositionRow::into_position))
    }

    /// Mark-to-market update: unrealized fields only, status untouched
    pub async fn update_position_mark(
        &self,
        id: i64,
        current_price: Decimal,
        unrealized_pnl: Decimal,
        unrealized_roi: Decimal,
    ) -> Result<()> {
        sqlx::query(
            r#"UPDATE paper_positions
               SET current_price = ?, unrealized_pnl = ?, unrealized_roi = ?, updated_at = ?
               WHERE id = ? AND status = 'open'"#,
        )
        .bind(to_f64(current_price))
        .bind(to_f64(unrealized_pnl))
        .bind(to_f64(unrealized_roi))
        .bind(Utc::now().timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// One-way close. Returns false when the position is missing or
    /// already closed (the `status = 'open'` guard makes a second close a
    /// no-op). Updates the running portfolio counters in the same
    /// transaction.
    pub async fn close_position(
        &self,
        id: i64,
        exit_price: Decimal,
        pnl: Decimal,
        roi: Decimal,
        reason: &str,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let res = sqlx::query(
            r#"UPDATE paper_positions
               SET status = 'closed', exit_price = ?, exit_time = ?, pnl = ?, roi = ?,
                   close_reason = ?, updated_at = ?
               WHERE id = ? AND status = 'open'"#,
        )
        .bind(to_f64(exit_price))
        .bind(Utc::now().timestamp_millis())
        .bind(to_f64(pnl))
        .bind(to_f64(roi))
        .bind(reason)
        .bind(Utc::now().timestamp())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if res.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let win = if pnl > Decimal::ZERO { 1 } else { 0 };
        sqlx::query(
            r#"UPDATE portfolio_stats
               SET total_trades = total_trades + 1,
                   wins = wins + ?,
                   losses = losses + ?,
                   total_pnl = total_pnl + ?
               WHERE id = 1"#,
        )
        .bind(win)
        .bind(1 - win)
        .bind(to_f64(pnl))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    pub async fn portfolio_stats(&self) -> Result<PortfolioStats> {
        let (total_trades, wins, losses, total_pnl): (i64, i64, i64, f64) = sqlx::query_as(
            "SELECT total_trades, wins, losses, total_pnl FROM portfolio_stats WHERE id = 1",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(PortfolioStats {
            total_trades,
            wins,
            losses,
            total_pnl: to_dec(total_pnl),
        })
    }

    /// Closed positions joined to their originating signal type, for the
    /// performance analyzer
    pub async fn closed_trades(&self) -> Result<Vec<ClosedTrade>> {
        let rows: Vec<(String, i64, f64, f64)> = sqlx::query_as(
            r#"SELECT s.type, s.confidence, p.pnl, p.roi
               FROM paper_positions p
               JOIN signals s ON p.signal_id = s.id
               WHERE p.status = 'closed' AND p.pnl IS NOT NULL"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(signal_type, confidence, pnl, roi)| ClosedTrade {
                signal_type,
                confidence: confidence.max(0) as u32,
                pnl: to_dec(pnl),
                roi: to_dec(roi),
            })
            .collect())
    }

    // ---- signal history (accuracy ledger) ----

    pub async fn insert_history(&self, rec: &SignalHistoryRecord) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO signal_history
               (signal_id, signal_type, market_slug, market_name, market_end_date,
                detected_at, confidence, recommendation, entry_price, reasoning,
                position_opened, position_id)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)"#,
        )
        .bind(&rec.signal_id)
        .bind(&rec.signal_type)
        .bind(&rec.market_slug)
        .bind(&rec.market_name)
        .bind(&rec.market_end_date)
        .bind(rec.detected_at)
        .bind(rec.confidence)
        .bind(&rec.recommendation)
        .bind(to_f64(rec.entry_price))
        .bind(&rec.reasoning)
        .bind(rec.position_opened as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn pending_history(&self) -> Result<Vec<SignalHistoryRecord>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"SELECT signal_id, signal_type, market_slug, market_name, market_end_date,
                      detected_at, confidence, recommendation, entry_price, reasoning,
                      outcome_known, market_result, final_price, signal_correct, edge,
                      position_opened
               FROM signal_history
               WHERE outcome_known = 0
               ORDER BY detected_at DESC"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(HistoryRow::into_record).collect())
    }

    pub async fn resolved_history(&self) -> Result<Vec<SignalHistoryRecord>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"SELECT signal_id, signal_type, market_slug, market_name, market_end_date,
                      detected_at, confidence, recommendation, entry_price, reasoning,
                      outcome_known, market_result, final_price, signal_correct, edge,
                      position_opened
               FROM signal_history
               WHERE outcome_known = 1"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(HistoryRow::into_record).collect())
    }

    /// Resolve a history record. Only touches rows still pending, so a
    /// record is resolved exactly once.
    pub async fn resolve_history(
        &self,
        signal_id: &str,
        market_result: &str,
        final_price: Option<Decimal>,
        signal_correct: Option<bool>,
        edge: Decimal,
    ) -> Result<()> {
        sqlx::query(
            r#"UPDATE signal_history
               SET outcome_known = 1, outcome_checked_at = ?, market_result = ?,
                   final_price = ?, signal_correct = ?, edge = ?
               WHERE signal_id = ? AND outcome_known = 0"#,
        )
        .bind(Utc::now().timestamp())
        .bind(market_result)
        .bind(final_price.map(to_f64))
        .bind(signal_correct.map(|c| c as i64))
        .bind(to_f64(edge))
        .bind(signal_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn touch_history_checked(&self, signal_id: &str) -> Result<()> {
        sqlx::query("UPDATE signal_history SET outcome_checked_at = ? WHERE signal_id = ?")
            .bind(Utc::now().timestamp())
            .bind(signal_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---- snapshot & liveness ----

    /// Overwrite the aggregated snapshot document (single row, id = 1)
    pub async fn save_snapshot(&self, snapshot: &SignalSnapshot) -> Result<()> {
        let document = serde_json::to_string(snapshot)?;
        sqlx::query(
            r#"INSERT OR REPLACE INTO signal_snapshots (id, schema_version, generated_at, document)
               VALUES (1, ?, ?, ?)"#,
        )
        .bind(snapshot.schema_version as i64)
        .bind(snapshot.generated_at)
        .bind(document)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_snapshot(&self) -> Result<Option<SignalSnapshot>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT document FROM signal_snapshots WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((document,)) => Ok(Some(serde_json::from_str(&document)?)),
            None => Ok(None),
        }
    }

    /// Liveness marker, written after every completed monitor pass
    pub async fn write_heartbeat(&self, pid: u32) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO heartbeat (id, last_check, pid) VALUES (1, ?, ?)",
        )
        .bind(Utc::now().timestamp())
        .bind(pid as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn read_heartbeat(&self) -> Result<Option<(i64, i64)>> {
        let row: Option<(i64, i64)> =
            sqlx::query_as("SELECT last_check, pid FROM heartbeat WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn trade(market: &str, outcome: &str, side: Side, price: Decimal, size: Decimal, ts: i64) -> StoredTrade {
        StoredTrade {
            market_slug: market.to_string(),
            market_question: format!("{}?", market),
            outcome: outcome.to_string(),
            side,
            price,
            size_usd: size,
            timestamp: ts,
        }
    }

    #[tokio::test]
    async fn test_whale_trades_filter_and_order() {
        let db = Database::connect_memory().await.unwrap();
        db.insert_trade(&trade("m1", "Yes", Side::Buy, dec!(0.5), dec!(5000), 200))
            .await
            .unwrap();
        db.insert_trade(&trade("m1", "Yes", Side::Buy, dec!(0.5), dec!(100), 150))
            .await
            .unwrap();
        db.insert_trade(&trade("m1", "Yes", Side::Buy, dec!(0.5), dec!(3000), 100))
            .await
            .unwrap();

        let whales = db.whale_trades_since(0, dec!(2000)).await.unwrap();
        assert_eq!(whales.len(), 2);
        // Oldest first
        assert_eq!(whales[0].timestamp, 100);
        assert_eq!(whales[1].timestamp, 200);
    }

    #[tokio::test]
    async fn test_latest_price() {
        let db = Database::connect_memory().await.unwrap();
        db.insert_trade(&trade("m1", "Yes", Side::Buy, dec!(0.40), dec!(100), 100))
            .await
            .unwrap();
        db.insert_trade(&trade("m1", "Yes", Side::Sell, dec!(0.55), dec!(100), 200))
            .await
            .unwrap();

        let price = db.latest_price("m1", "Yes").await.unwrap();
        assert_eq!(price, Some(dec!(0.55)));
        assert_eq!(db.latest_price("m1", "No").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_open_position_guarded_rejects_duplicate() {
        let db = Database::connect_memory().await.unwrap();

        let signal_id = db
            .insert_signal(&NewSignal {
                signal_type: "whale_cluster".to_string(),
                confidence: 85,
                market_slug: "m1".to_string(),
                market_question: "m1?".to_string(),
                outcome: "Yes".to_string(),
                direction: Side::Buy,
                price: dec!(0.50),
                details: serde_json::json!({}),
            })
            .await
            .unwrap();

        let new = NewPosition {
            signal_id: Some(signal_id),
            market_slug: "m1".to_string(),
            market_question: "m1?".to_string(),
            outcome: "Yes".to_string(),
            direction: Side::Buy,
            entry_price: dec!(0.50),
            size: dec!(50),
            confidence: 85,
            notes: serde_json::json!({"reasoning": "test"}),
        };

        let first = db.open_position_guarded(&new).await.unwrap();
        assert!(first.is_some());

        let second = db.open_position_guarded(&new).await.unwrap();
        assert!(second.is_none());

        // Different outcome on the same market is allowed
        let mut other = new.clone();
        other.outcome = "No".to_string();
        assert!(db.open_position_guarded(&other).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_close_is_one_way() {
        let db = Database::connect_memory().await.unwrap();
        let new = NewPosition {
            signal_id: None,
            market_slug: "m1".to_string(),
            market_question: "m1?".to_string(),
            outcome: "Yes".to_string(),
            direction: Side::Buy,
            entry_price: dec!(0.40),
            size: dec!(50),
            confidence: 75,
            notes: serde_json::json!({}),
        };
        let id = db.open_position_guarded(&new).await.unwrap().unwrap();

        let closed = db
            .close_position(id, dec!(0.55), dec!(7.5), dec!(0.15), "manual")
            .await
            .unwrap();
        assert!(closed);

        // Second close finds nothing and leaves counters untouched
        let again = db
            .close_position(id, dec!(0.60), dec!(10), dec!(0.20), "manual")
            .await
            .unwrap();
        assert!(!again);

        let stats = db.portfolio_stats().await.unwrap();
        assert_eq!(stats.total_trades, 1);
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.total_pnl, dec!(7.5));
    }

    #[tokio::test]
    async fn test_connect_creates_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("trading.db");
        let db = Database::connect(path.to_str().unwrap()).await.unwrap();
        db.write_heartbeat(1).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_heartbeat_roundtrip() {
        let db = Database::connect_memory().await.unwrap();
        db.write_heartbeat(4242).await.unwrap();
        let (_, pid) = db.read_heartbeat().await.unwrap().unwrap();
        assert_eq!(pid, 4242);
    }

    #[tokio::test]
    async fn test_history_resolved_once() {
        let db = Database::connect_memory().await.unwrap();
        let rec = SignalHistoryRecord {
            signal_id: "abc123".to_string(),
            signal_type: "whale_cluster".to_string(),
            market_slug: "m1".to_string(),
            market_name: "M1?".to_string(),
            market_end_date: None,
            detected_at: 1000,
            confidence: 85.0,
            recommendation: "BUY_YES".to_string(),
            entry_price: dec!(0.50),
            reasoning: None,
            outcome_known: false,
            market_result: None,
            final_price: None,
            signal_correct: None,
            edge: None,
            position_opened: false,
        };
        db.insert_history(&rec).await.unwrap();
        assert_eq!(db.pending_history().await.unwrap().len(), 1);

        db.resolve_history("abc123", "YES", Some(dec!(1)), Some(true), dec!(0.5))
            .await
            .unwrap();
        assert!(db.pending_history().await.unwrap().is_empty());

        // A second resolution attempt must not overwrite the first
        db.resolve_history("abc123", "NO", Some(dec!(0)), Some(false), dec!(-0.5))
            .await
            .unwrap();
        let resolved = db.resolved_history().await.unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].market_result.as_deref(), Some("YES"));
        assert_eq!(resolved[0].signal_correct, Some(true));
    }
}
