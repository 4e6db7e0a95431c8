//! Consolidation: collapse duplicate per-month stat rows into one canonical row
//!
//! Duplicates arise from the legacy path where the unique key was not yet
//! enforced, and from day-level rows mixed in with month-level rows. Every
//! scrape reports the cumulative monthly total at scrape time, so the
//! aggregation policy is MAXIMUM per field - summing duplicate scrapes of
//! the same month would double-count.
//!
//! Invariants: idempotent (consolidating twice equals consolidating once),
//! and afterwards exactly one row exists per (program, month, channel).

use super::models::{month_anchor, StatRecord};
use std::collections::HashMap;

/// Collapse one program's duplicate month rows in place
///
/// Only records belonging to `program_id` are touched; other programs' rows
/// pass through untouched and in their original order. Returns the number
/// of duplicate rows removed.
pub fn consolidate_program_stats(stats: &mut Vec<StatRecord>, program_id: u64) -> usize {
    let before = stats.len();

    let mut kept: Vec<StatRecord> = Vec::with_capacity(before);
    let mut merged: HashMap<(chrono::NaiveDate, Option<String>), StatRecord> = HashMap::new();
    // Remember first-seen order so consolidation is deterministic
    let mut order: Vec<(chrono::NaiveDate, Option<String>)> = Vec::new();

    for record in stats.drain(..) {
        if record.program_id != program_id {
            kept.push(record);
            continue;
        }

        let mut record = record;
        record.date = month_anchor(record.date);
        let key = record.key();

        match merged.get_mut(&key) {
            Some(existing) => existing.merge_max(&record),
            None => {
                order.push(key.clone());
                merged.insert(key, record);
            }
        }
    }

    for key in order {
        if let Some(record) = merged.remove(&key) {
            kept.push(record);
        }
    }

    *stats = kept;
    let removed = before - stats.len();
    if removed > 0 {
        log::info!(
            "Consolidated program {}: removed {} duplicate month rows",
            program_id,
            removed
        );
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn rec(program_id: u64, y: i32, m: u32, d: u32, clicks: u64) -> StatRecord {
        let mut r = StatRecord::new(program_id, NaiveDate::from_ymd_opt(y, m, d).unwrap());
        // Bypass the constructor's anchoring to simulate legacy day-level rows
        r.date = NaiveDate::from_ymd_opt(y, m, d).unwrap();
        r.clicks = clicks;
        r
    }

    #[test]
    fn test_max_not_sum() {
        // Two scrapes of the same month: 100 then 80 clicks -> 100, not 180
        let mut stats = vec![rec(1, 2024, 3, 1, 100), rec(1, 2024, 3, 1, 80)];
        let removed = consolidate_program_stats(&mut stats, 1);
        assert_eq!(removed, 1);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].clicks, 100);
    }

    #[test]
    fn test_day_level_rows_fold_into_month() {
        let mut stats = vec![
            rec(1, 2024, 3, 5, 40),
            rec(1, 2024, 3, 20, 90),
            rec(1, 2024, 4, 2, 10),
        ];
        consolidate_program_stats(&mut stats, 1);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(stats[0].clicks, 90);
        assert_eq!(stats[1].date, NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());
    }

    #[test]
    fn test_channels_consolidate_separately() {
        let mut total = rec(1, 2024, 3, 1, 50);
        total.channel = None;
        let mut casino_a = rec(1, 2024, 3, 1, 30);
        casino_a.channel = Some("casino-a".to_string());
        let mut casino_a_dup = rec(1, 2024, 3, 15, 35);
        casino_a_dup.channel = Some("casino-a".to_string());

        let mut stats = vec![total, casino_a, casino_a_dup];
        consolidate_program_stats(&mut stats, 1);

        assert_eq!(stats.len(), 2);
        let by_channel: Vec<_> = stats.iter().map(|r| (r.channel.clone(), r.clicks)).collect();
        assert!(by_channel.contains(&(None, 50)));
        assert!(by_channel.contains(&(Some("casino-a".to_string()), 35)));
    }

    #[test]
    fn test_idempotent() {
        let mut stats = vec![rec(1, 2024, 3, 1, 100), rec(1, 2024, 3, 12, 80), rec(1, 2024, 3, 29, 95)];
        consolidate_program_stats(&mut stats, 1);
        let once = stats.clone();
        let removed_again = consolidate_program_stats(&mut stats, 1);
        assert_eq!(removed_again, 0);
        assert_eq!(stats, once);
    }

    #[test]
    fn test_other_programs_untouched() {
        let mut stats = vec![rec(1, 2024, 3, 1, 100), rec(2, 2024, 3, 1, 7), rec(2, 2024, 3, 9, 8)];
        consolidate_program_stats(&mut stats, 1);
        // Program 2's duplicates survive until its own consolidation runs
        assert_eq!(stats.iter().filter(|r| r.program_id == 2).count(), 2);
    }
}
