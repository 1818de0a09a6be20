// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

//! Reshaping of fetched history: per-symbol series are outer-joined on date
//! into a wide table (one column per symbol) and melted back into long rows
//! (one row per symbol and date) for storage.

use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// Daily observations of one metric for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolSeries {
    pub symbol: String,
    pub points: Vec<(NaiveDateTime, f64)>,
}

impl SymbolSeries {
    pub fn new(symbol: impl Into<String>, points: Vec<(NaiveDateTime, f64)>) -> Self {
        Self {
            symbol: symbol.into(),
            points,
        }
    }
}

/// One cell of a melted table.
#[derive(Debug, Clone, PartialEq)]
pub struct LongRow {
    pub symbol: String,
    pub date: NaiveDateTime,
    pub value: f64,
}

/// Date-indexed table with one nullable column per symbol. Rows are kept in
/// ascending date order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WideTable {
    symbols: Vec<String>,
    rows: BTreeMap<NaiveDateTime, Vec<Option<f64>>>,
}

impl WideTable {
    /// Outer join on date. A symbol without an observation for a date gets
    /// `None` in that row. If a series repeats a date, the last value wins.
    pub fn outer_merge(series: impl IntoIterator<Item = SymbolSeries>) -> Self {
        let series: Vec<SymbolSeries> = series.into_iter().collect();
        let width = series.len();
        let mut rows: BTreeMap<NaiveDateTime, Vec<Option<f64>>> = BTreeMap::new();

        for (column, s) in series.iter().enumerate() {
            for &(date, value) in &s.points {
                rows.entry(date).or_insert_with(|| vec![None; width])[column] = Some(value);
            }
        }

        Self {
            symbols: series.into_iter().map(|s| s.symbol).collect(),
            rows,
        }
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDateTime> + '_ {
        self.rows.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn column_index(&self, symbol: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s == symbol)
    }

    /// Column for `symbol` in date order.
    pub fn column(&self, symbol: &str) -> Option<Vec<Option<f64>>> {
        let index = self.column_index(symbol)?;
        Some(self.rows.values().map(|row| row[index]).collect())
    }

    pub fn value(&self, date: NaiveDateTime, symbol: &str) -> Option<f64> {
        let index = self.column_index(symbol)?;
        self.rows.get(&date).and_then(|row| row[index])
    }

    /// Percentage change of every column, same shape as `self`.
    pub fn pct_change(&self) -> WideTable {
        let mut rows: BTreeMap<NaiveDateTime, Vec<Option<f64>>> = self
            .rows
            .keys()
            .map(|date| (*date, vec![None; self.symbols.len()]))
            .collect();

        for (index, symbol) in self.symbols.iter().enumerate() {
            let Some(values) = self.column(symbol) else {
                continue;
            };
            for (row, change) in rows.values_mut().zip(pct_change(&values)) {
                row[index] = change;
            }
        }

        WideTable {
            symbols: self.symbols.clone(),
            rows,
        }
    }

    /// Puts `rows` into cells that are still empty. Rows for symbols without
    /// a column are ignored, and existing values are never overwritten.
    pub fn fill_missing(&mut self, rows: impl IntoIterator<Item = LongRow>) {
        let width = self.symbols.len();
        for row in rows {
            let Some(index) = self.column_index(&row.symbol) else {
                continue;
            };
            let cell = &mut self.rows.entry(row.date).or_insert_with(|| vec![None; width])[index];
            if cell.is_none() {
                *cell = Some(row.value);
            }
        }
    }

    /// Wide to long: symbol-major, dates ascending. Null cells produce no row.
    pub fn melt(&self) -> Vec<LongRow> {
        let mut long = Vec::new();
        for (index, symbol) in self.symbols.iter().enumerate() {
            for (date, row) in &self.rows {
                if let Some(value) = row[index] {
                    long.push(LongRow {
                        symbol: symbol.clone(),
                        date: *date,
                        value,
                    });
                }
            }
        }
        long
    }
}

/// `(curr - prev) / prev * 100` between consecutive entries. The first entry,
/// entries next to a gap and entries following a zero are `None`.
pub fn pct_change(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut changes = Vec::with_capacity(values.len());
    let mut previous: Option<f64> = None;

    for &current in values {
        let change = match (previous, current) {
            (Some(prev), Some(curr)) if prev != 0.0 => Some((curr - prev) / prev * 100.0),
            _ => None,
        };
        changes.push(change);
        previous = current;
    }

    changes
}
