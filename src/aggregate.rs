//! Dense hourly aggregation of contact events.
//!
//! The grid covers every hour between the first and last event (inclusive) for
//! every program and every state seen anywhere in the input. Its size is
//! `hours * programs * states`; callers feeding high-cardinality columns should
//! check [`grid_size`] before aggregating.

use std::collections::{HashMap, HashSet};

use chrono::{Duration, NaiveDateTime, Timelike};

use crate::error::AggregationError;
use crate::models::{AggregatedGrid, EventRecord, HourlyCell, HourlyTotal};

pub fn floor_to_hour(timestamp: NaiveDateTime) -> NaiveDateTime {
    timestamp
        .date()
        .and_hms_opt(timestamp.hour(), 0, 0)
        .unwrap_or(timestamp)
}

/// Every hour from `start` to `end`, both inclusive.
pub fn hourly_range(start: NaiveDateTime, end: NaiveDateTime) -> Vec<NaiveDateTime> {
    let hours = (end - start).num_hours().max(0);
    (0..=hours).map(|offset| start + Duration::hours(offset)).collect()
}

pub fn grid_size(hours: usize, programs: usize, states: usize) -> usize {
    hours.saturating_mul(programs).saturating_mul(states)
}

/// Values in order of first appearance.
fn distinct_in_order<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .filter(|value| seen.insert(*value))
        .map(str::to_string)
        .collect()
}

pub fn aggregate(records: &[EventRecord]) -> Result<AggregatedGrid, AggregationError> {
    let (Some(first), Some(last)) = (
        records.iter().map(|record| record.timestamp).min(),
        records.iter().map(|record| record.timestamp).max(),
    ) else {
        return Err(AggregationError::EmptyInput);
    };

    let start = floor_to_hour(first);
    let hours = hourly_range(start, floor_to_hour(last));
    let programs = distinct_in_order(records.iter().map(|record| record.program.as_str()));
    let states = distinct_in_order(records.iter().map(|record| record.state.as_str()));

    let program_index: HashMap<&str, usize> = programs
        .iter()
        .enumerate()
        .map(|(idx, value)| (value.as_str(), idx))
        .collect();
    let state_index: HashMap<&str, usize> = states
        .iter()
        .enumerate()
        .map(|(idx, value)| (value.as_str(), idx))
        .collect();

    // Distinct identifiers per (hour, program, state) bucket; blank ids are not counted.
    let mut buckets: HashMap<(usize, usize, usize), HashSet<&str>> = HashMap::new();
    for record in records {
        let hour = (floor_to_hour(record.timestamp) - start).num_hours() as usize;
        let key = (
            hour,
            program_index[record.program.as_str()],
            state_index[record.state.as_str()],
        );
        let ids = buckets.entry(key).or_default();
        if !record.unique_id.is_empty() {
            ids.insert(record.unique_id.as_str());
        }
    }

    let mut cells = Vec::with_capacity(grid_size(hours.len(), programs.len(), states.len()));
    let mut totals = Vec::with_capacity(hours.len());

    for (hour_idx, hour) in hours.iter().enumerate() {
        let mut total = 0u64;
        for (program_idx, program) in programs.iter().enumerate() {
            for (state_idx, state) in states.iter().enumerate() {
                let contact_count = buckets
                    .get(&(hour_idx, program_idx, state_idx))
                    .map_or(0, |ids| ids.len() as u64);
                total += contact_count;
                cells.push(HourlyCell {
                    timestamp: *hour,
                    program: program.clone(),
                    state: state.clone(),
                    contact_count,
                });
            }
        }
        totals.push(HourlyTotal {
            timestamp: *hour,
            total_contacts: total,
        });
    }

    Ok(AggregatedGrid {
        cells,
        totals,
        programs,
        states,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(raw: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn record(timestamp: &str, program: &str, state: &str, id: &str) -> EventRecord {
        EventRecord {
            timestamp: at(timestamp),
            program: program.to_string(),
            state: state.to_string(),
            unique_id: id.to_string(),
        }
    }

    fn cell<'a>(grid: &'a AggregatedGrid, hour: &str, program: &str, state: &str) -> &'a HourlyCell {
        grid.cells
            .iter()
            .find(|cell| cell.timestamp == at(hour) && cell.program == program && cell.state == state)
            .unwrap()
    }

    #[test]
    fn floors_to_the_hour() {
        assert_eq!(floor_to_hour(at("2024-01-01 13:59:59")), at("2024-01-01 13:00:00"));
        assert_eq!(floor_to_hour(at("2024-01-01 13:00:00")), at("2024-01-01 13:00:00"));
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(aggregate(&[]), Err(AggregationError::EmptyInput)));
    }

    #[test]
    fn grid_is_complete_cross_product() {
        let records = vec![
            record("2024-01-01 00:15:00", "Acme", "open", "a"),
            record("2024-01-01 02:45:00", "Beta", "closed", "b"),
            record("2024-01-01 04:05:00", "Acme", "pending", "c"),
        ];
        let grid = aggregate(&records).unwrap();

        assert_eq!(grid.totals.len(), 5);
        assert_eq!(grid.programs, vec!["Acme", "Beta"]);
        assert_eq!(grid.states, vec!["open", "closed", "pending"]);
        assert_eq!(grid.cells.len(), 5 * 2 * 3);

        let keys: HashSet<_> = grid
            .cells
            .iter()
            .map(|cell| (cell.timestamp, cell.program.clone(), cell.state.clone()))
            .collect();
        assert_eq!(keys.len(), grid.cells.len());

        assert_eq!(cell(&grid, "2024-01-01 02:00:00", "Beta", "closed").contact_count, 1);
        assert_eq!(cell(&grid, "2024-01-01 02:00:00", "Acme", "closed").contact_count, 0);
        assert_eq!(cell(&grid, "2024-01-01 03:00:00", "Beta", "pending").contact_count, 0);
    }

    #[test]
    fn hours_are_contiguous() {
        let records = vec![
            record("2024-01-01 22:30:00", "Acme", "open", "a"),
            record("2024-01-02 03:10:00", "Acme", "open", "b"),
        ];
        let grid = aggregate(&records).unwrap();

        assert_eq!(grid.totals.first().unwrap().timestamp, at("2024-01-01 22:00:00"));
        assert_eq!(grid.totals.last().unwrap().timestamp, at("2024-01-02 03:00:00"));
        for pair in grid.totals.windows(2) {
            assert_eq!(pair[1].timestamp - pair[0].timestamp, Duration::hours(1));
        }
    }

    #[test]
    fn counts_distinct_ids_per_cell() {
        let records = vec![
            record("2024-01-01 10:00:00", "Acme", "open", "a"),
            record("2024-01-01 10:20:00", "Acme", "open", "a"),
            record("2024-01-01 10:40:00", "Acme", "open", "b"),
            record("2024-01-01 10:50:00", "Acme", "closed", "a"),
            record("2024-01-01 11:05:00", "Acme", "open", "a"),
        ];
        let grid = aggregate(&records).unwrap();

        assert_eq!(cell(&grid, "2024-01-01 10:00:00", "Acme", "open").contact_count, 2);
        assert_eq!(cell(&grid, "2024-01-01 10:00:00", "Acme", "closed").contact_count, 1);
        assert_eq!(cell(&grid, "2024-01-01 11:00:00", "Acme", "open").contact_count, 1);
    }

    #[test]
    fn totals_sum_cells_per_hour() {
        let records = vec![
            record("2024-01-01 00:00:00", "Acme", "open", "a"),
            record("2024-01-01 00:30:00", "Beta", "open", "b"),
            record("2024-01-01 00:40:00", "Beta", "closed", "c"),
            record("2024-01-01 03:00:00", "Acme", "closed", "d"),
        ];
        let grid = aggregate(&records).unwrap();

        for total in &grid.totals {
            let sum: u64 = grid
                .cells
                .iter()
                .filter(|cell| cell.timestamp == total.timestamp)
                .map(|cell| cell.contact_count)
                .sum();
            assert_eq!(total.total_contacts, sum);
        }
        let counts: Vec<u64> = grid.totals.iter().map(|total| total.total_contacts).collect();
        assert_eq!(counts, vec![3, 0, 0, 1]);
    }

    #[test]
    fn single_timestamp_yields_single_hour() {
        let records = vec![record("2024-01-01 08:42:00", "Acme", "open", "a")];
        let grid = aggregate(&records).unwrap();

        assert_eq!(grid.totals.len(), 1);
        assert_eq!(grid.cells.len(), 1);
        assert_eq!(grid.totals[0].total_contacts, 1);
    }

    #[test]
    fn aggregation_is_deterministic() {
        let records = vec![
            record("2024-01-01 00:00:00", "Acme", "open", "a"),
            record("2024-01-01 05:30:00", "Beta", "closed", "b"),
            record("2024-01-01 05:31:00", "Gamma", "open", "c"),
        ];
        let first = aggregate(&records).unwrap();
        let second = aggregate(&records).unwrap();

        assert_eq!(first.cells, second.cells);
        assert_eq!(first.totals, second.totals);
    }
}
