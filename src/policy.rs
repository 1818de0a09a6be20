// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::Result;
use chrono::{Duration, NaiveDateTime};
use sqlx::sqlite::SqlitePool;
use tracing::debug;

use crate::db::{self, Table};

/// History requested on the first run, in days
pub const DEFAULT_LOOKBACK_DAYS: i64 = 365;
/// Request limit on the first run. Also the most days the histoday endpoint serves.
pub const MAX_HISTORY_LIMIT: i64 = 2000;

/// True when `table` is missing, empty, or its newest date is older than `max_age`.
pub async fn should_fetch_data(
    pool: &SqlitePool,
    table: Table,
    max_age: Duration,
    now: NaiveDateTime,
) -> Result<bool> {
    if !db::table_exists(pool, table).await? {
        debug!(%table, "table missing");
        return Ok(true);
    }
    if db::row_count(pool, table).await? == 0 {
        debug!(%table, "table empty");
        return Ok(true);
    }

    match db::newest_date(pool, table).await? {
        Some(newest) => {
            let age = now - newest;
            debug!(%table, %newest, age_hours = age.num_hours(), "newest stored row");
            Ok(age > max_age)
        }
        None => Ok(true),
    }
}

/// How much daily history to request given what is already stored.
///
/// The request itself only carries `limit` and `end` (as `toTs`). `start` and
/// `lookback_days` describe the window for the run log; on a first run the
/// endpoint serves `limit` days, not the 365-day lookback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    /// Newest stored date, or `end` minus the default lookback
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// Days requested before `end`
    pub limit: i64,
}

impl FetchWindow {
    pub fn new(newest: Option<NaiveDateTime>, end: NaiveDateTime) -> Self {
        match newest {
            Some(newest) => Self {
                start: newest,
                end,
                limit: (end - newest).num_days().clamp(0, MAX_HISTORY_LIMIT),
            },
            None => Self {
                start: end - Duration::days(DEFAULT_LOOKBACK_DAYS),
                end,
                limit: MAX_HISTORY_LIMIT,
            },
        }
    }

    /// Whole days between the start of the window and its end
    pub fn lookback_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// Unix seconds of the window end, sent as `toTs`
    pub fn end_timestamp(&self) -> i64 {
        self.end.and_utc().timestamp()
    }
}
