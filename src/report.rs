/// Reporting helpers behind the `storage-stats` tool.
///
/// This module contains:
/// - Growth statistics computed from the size ledger
/// - A plain-text table renderer
/// - Renderers for the current snapshot, the ledger and growth
///
/// IMPORTANT:
/// - Everything here is pure; reading the ledger or walking the tree is
///   the caller's job.
///
use std::collections::BTreeMap;

use crate::storage::{SizeRecord, SizeSnapshot};
use crate::util::format_size;

const MINUTES_PER_DAY: f64 = 60.0 * 24.0;

// ------------------------------------------------------------
// Growth statistics
// ------------------------------------------------------------

/// Growth of one category between its earliest and latest ledger record.
#[derive(Debug, Clone, PartialEq)]
pub struct GrowthStats {
    pub category: String,
    pub first_timestamp: String,
    pub last_timestamp: String,
    pub initial_bytes: u64,
    pub current_bytes: u64,

    /// `current - initial`; negative after a cleanup
    pub growth_bytes: i64,

    /// `None` when the category started empty
    pub growth_percent: Option<f64>,

    /// Elapsed time is floored at one minute
    pub avg_per_minute: f64,
    pub avg_per_day: f64,
}

/// Groups records by category and compares first vs last (by timestamp).
///
/// Categories with fewer than two records are skipped. Output is sorted
/// by category label.
pub fn growth_stats(records: &[SizeRecord]) -> Vec<GrowthStats> {
    let mut groups: BTreeMap<&str, Vec<&SizeRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.category.as_str()).or_default().push(record);
    }

    groups
        .into_iter()
        .filter(|(_, entries)| entries.len() >= 2)
        .filter_map(|(category, mut entries)| {
            // Stable sort keeps ledger order among equal timestamps.
            entries.sort_by_key(|r| r.at());
            let first = *entries.first()?;
            let last = *entries.last()?;
            Some(compare(category, first, last))
        })
        .collect()
}

fn compare(category: &str, first: &SizeRecord, last: &SizeRecord) -> GrowthStats {
    let growth_bytes = last.bytes as i64 - first.bytes as i64;

    let growth_percent = if first.bytes == 0 {
        None
    } else {
        Some(growth_bytes as f64 / first.bytes as f64 * 100.0)
    };

    let elapsed_minutes = match (first.at(), last.at()) {
        (Some(a), Some(b)) => (b - a).num_milliseconds() as f64 / 60_000.0,
        _ => 0.0,
    };
    let minutes = elapsed_minutes.max(1.0);
    let avg_per_minute = growth_bytes as f64 / minutes;

    GrowthStats {
        category: category.to_string(),
        first_timestamp: first.timestamp.clone(),
        last_timestamp: last.timestamp.clone(),
        initial_bytes: first.bytes,
        current_bytes: last.bytes,
        growth_bytes,
        growth_percent,
        avg_per_minute,
        avg_per_day: avg_per_minute * MINUTES_PER_DAY,
    }
}

// ------------------------------------------------------------
// Text tables
// ------------------------------------------------------------

/// Left-aligned text table with a header rule.
#[derive(Debug, Clone, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn render(&self) -> String {
        let columns = self
            .rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(self.headers.len()))
            .max()
            .unwrap_or(0);

        let mut widths = vec![0usize; columns];
        for row in std::iter::once(&self.headers).chain(self.rows.iter()) {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }

        let line = |cells: &[String]| -> String {
            let padded: Vec<String> = (0..columns)
                .map(|i| {
                    let cell = cells.get(i).map(String::as_str).unwrap_or("");
                    format!("{:<width$}", cell, width = widths[i])
                })
                .collect();
            format!("| {} |", padded.join(" | "))
        };
        let rule = format!(
            "+{}+",
            widths
                .iter()
                .map(|w| "-".repeat(w + 2))
                .collect::<Vec<_>>()
                .join("+")
        );

        let mut out = String::new();
        out.push_str(&rule);
        out.push('\n');
        out.push_str(&line(&self.headers));
        out.push('\n');
        out.push_str(&rule);
        out.push('\n');
        for row in &self.rows {
            out.push_str(&line(row));
            out.push('\n');
        }
        out.push_str(&rule);
        out.push('\n');
        out
    }
}

// ------------------------------------------------------------
// Report renderers
// ------------------------------------------------------------

pub fn render_current(snapshot: &SizeSnapshot) -> String {
    let total = &snapshot.total;
    let mut out = String::new();
    out.push_str("===== STORAGE SIZE INFORMATION =====\n\n");
    out.push_str("Total Storage Size:\n");
    out.push_str(&format!("Bytes: {}\n", total.bytes));
    out.push_str(&format!("Kilobytes: {:.2} KB\n", total.kilobytes));
    out.push_str(&format!("Megabytes: {:.2} MB\n", total.megabytes));
    out.push_str(&format!("Gigabytes: {:.2} GB\n", total.gigabytes));
    out.push_str(&format!("Terabytes: {:.6} TB\n", total.terabytes));
    out.push_str(&format!("Path: {}\n", total.path));
    out.push_str(&format!("Timestamp: {}\n", total.timestamp));

    out.push_str("\nStorage Size by Category:\n");
    let mut table = Table::new(["Category", "Bytes", "KB", "MB", "GB", "TB", "Path"]);
    for (name, info) in &snapshot.by_category {
        table.push_row(vec![
            name.clone(),
            info.bytes.to_string(),
            format!("{:.2}", info.kilobytes),
            format!("{:.2}", info.megabytes),
            format!("{:.4}", info.gigabytes),
            format!("{:.6}", info.terabytes),
            info.path.clone(),
        ]);
    }
    out.push_str(&table.render());
    out
}

pub fn render_history(records: &[SizeRecord], category: Option<&str>) -> String {
    let mut out = match category {
        Some(c) => format!("===== STORAGE SIZE HISTORY FOR {} =====\n\n", c.to_uppercase()),
        None => "===== STORAGE SIZE HISTORY =====\n\n".to_string(),
    };

    if records.is_empty() {
        out.push_str("No history data available.\n");
        return out;
    }

    let mut table = Table::new(["Timestamp", "Category", "Bytes", "KB", "MB", "GB", "TB"]);
    for r in records {
        table.push_row(vec![
            r.timestamp.clone(),
            r.category.clone(),
            r.bytes.to_string(),
            format!("{:.2}", r.kilobytes),
            format!("{:.2}", r.megabytes),
            format!("{:.4}", r.gigabytes),
            format!("{:.6}", r.terabytes),
        ]);
    }
    out.push_str(&table.render());
    out
}

pub fn render_growth(records: &[SizeRecord], category: Option<&str>) -> String {
    let mut out = match category {
        Some(c) => format!(
            "===== STORAGE GROWTH STATISTICS FOR {} =====\n\n",
            c.to_uppercase()
        ),
        None => "===== STORAGE GROWTH STATISTICS =====\n\n".to_string(),
    };

    let stats = growth_stats(records);
    if stats.is_empty() {
        out.push_str("Not enough history data to calculate growth statistics.\n");
        return out;
    }

    let mut table = Table::new([
        "Category",
        "First Record",
        "Last Record",
        "Initial Size",
        "Current Size",
        "Growth",
        "Growth %",
        "Avg. Minute Growth",
        "Avg. Daily Growth",
    ]);
    for s in stats {
        table.push_row(vec![
            s.category,
            s.first_timestamp,
            s.last_timestamp,
            format_size(s.initial_bytes as f64),
            format_size(s.current_bytes as f64),
            format_size(s.growth_bytes as f64),
            s.growth_percent
                .map(|p| format!("{:.2}%", p))
                .unwrap_or_else(|| "n/a".to_string()),
            format_size(s.avg_per_minute),
            format_size(s.avg_per_day),
        ]);
    }
    out.push_str(&table.render());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use std::path::Path;

    fn record(category: &str, bytes: u64, minutes: i64) -> SizeRecord {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes);
        SizeRecord::new(category, bytes, Path::new("/data"), at)
    }

    #[test]
    fn growth_over_two_records_is_the_byte_difference() {
        let records = vec![record("trades/BTC", 1000, 0), record("trades/BTC", 3000, 10)];
        let stats = growth_stats(&records);

        assert_eq!(stats.len(), 1);
        let s = &stats[0];
        assert_eq!(s.category, "trades/BTC");
        assert_eq!(s.initial_bytes, 1000);
        assert_eq!(s.current_bytes, 3000);
        assert_eq!(s.growth_bytes, 2000);
        assert_eq!(s.growth_percent, Some(200.0));
        assert_eq!(s.avg_per_minute, 200.0);
        assert_eq!(s.avg_per_day, 200.0 * 1440.0);
    }

    #[test]
    fn records_are_ordered_by_timestamp_not_ledger_position() {
        let records = vec![
            record("allMids", 500, 5),
            record("allMids", 100, 0),
            record("allMids", 300, 2),
        ];
        let s = &growth_stats(&records)[0];
        assert_eq!(s.initial_bytes, 100);
        assert_eq!(s.current_bytes, 500);
    }

    #[test]
    fn elapsed_time_is_floored_at_one_minute() {
        let records = vec![record("candle/BTC/1m", 0, 0), record("candle/BTC/1m", 600, 0)];
        let s = &growth_stats(&records)[0];
        assert_eq!(s.avg_per_minute, 600.0);
        assert_eq!(s.growth_percent, None);
    }

    #[test]
    fn single_record_categories_are_skipped() {
        let records = vec![
            record("notification", 10, 0),
            record("l2Book/ETH", 10, 0),
            record("l2Book/ETH", 5, 1),
        ];
        let stats = growth_stats(&records);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].category, "l2Book/ETH");
        assert_eq!(stats[0].growth_bytes, -5);
    }

    #[test]
    fn table_pads_columns_to_widest_cell() {
        let mut table = Table::new(["A", "Long header"]);
        table.push_row(vec!["wide cell".into(), "x".into()]);
        let rendered = table.render();

        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "+-----------+-------------+");
        assert_eq!(lines[1], "| A         | Long header |");
        assert_eq!(lines[3], "| wide cell | x           |");
        assert!(lines.iter().all(|l| l.len() == lines[0].len()));
    }

    #[test]
    fn empty_reports_explain_themselves() {
        assert!(render_history(&[], None).contains("No history data available."));
        assert!(render_growth(&[record("a", 1, 0)], Some("a"))
            .contains("Not enough history data"));
        assert!(render_growth(&[], Some("trades")).starts_with("===== STORAGE GROWTH STATISTICS FOR TRADES"));
    }
}
