//! Property-based test generators using proptest.
//!
//! Strategies keep the invariants batches must hold: equal column
//! lengths, valid pipe keys, cells that match their declared dtype.

use chrono::NaiveDate;
use pipesync_batch::{Batch, Cell, Column};
use pipesync_core::PipeKeys;
use pipesync_types::LogicalType;
use proptest::prelude::*;

/// Strategy for a single key segment (connector, metric, location).
pub fn key_segment_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("invalid regex")
}

/// Strategy for valid pipe keys, with and without a location.
pub fn pipe_keys_strategy() -> impl Strategy<Value = PipeKeys> {
    (
        key_segment_strategy(),
        key_segment_strategy(),
        prop::option::of(key_segment_strategy()),
    )
        .prop_map(|(connector, metric, location)| {
            let keys = PipeKeys::new(connector, metric);
            match location {
                Some(location) => keys.with_location(location),
                None => keys,
            }
        })
}

/// Strategy for a cell of the given dtype, sometimes NULL.
pub fn cell_strategy(dtype: LogicalType) -> BoxedStrategy<Cell> {
    let non_null: BoxedStrategy<Cell> = match dtype {
        LogicalType::Int => (-1_000_000i64..1_000_000).prop_map(Cell::Int).boxed(),
        LogicalType::Float => (-1.0e6f64..1.0e6).prop_map(Cell::Float).boxed(),
        LogicalType::Bool => any::<bool>().prop_map(Cell::Bool).boxed(),
        LogicalType::Datetime | LogicalType::DatetimeTz => (0u32..3650)
            .prop_map(|days| {
                let base = NaiveDate::from_ymd_opt(2020, 1, 1)
                    .expect("valid date")
                    .and_hms_opt(0, 0, 0)
                    .expect("valid time");
                Cell::Datetime(base + chrono::Duration::days(i64::from(days)))
            })
            .boxed(),
        _ => prop::string::string_regex("[a-zA-Z0-9 ]{0,20}")
            .expect("invalid regex")
            .prop_map(Cell::Text)
            .boxed(),
    };
    prop_oneof![
        9 => non_null,
        1 => Just(Cell::Null),
    ]
    .boxed()
}

/// Strategy for a batch with the given column layout and up to
/// `max_rows` rows.
pub fn batch_strategy(
    columns: Vec<(String, LogicalType)>,
    max_rows: usize,
) -> impl Strategy<Value = Batch> {
    let row_strategy: Vec<BoxedStrategy<Cell>> = columns
        .iter()
        .map(|(_, dtype)| cell_strategy(*dtype))
        .collect();
    prop::collection::vec(row_strategy, 0..=max_rows).prop_map(move |rows| {
        let cols: Vec<Column> = columns
            .iter()
            .enumerate()
            .map(|(index, (name, dtype))| {
                Column::typed(
                    name.clone(),
                    *dtype,
                    rows.iter().map(|row| row[index].clone()).collect(),
                )
            })
            .collect();
        Batch::new(cols).expect("generated columns are equal-length")
    })
}

/// Strategy for the standard dt/id/val layout used across scenarios.
pub fn timeseries_batch_strategy(max_rows: usize) -> impl Strategy<Value = Batch> {
    batch_strategy(
        vec![
            ("dt".to_string(), LogicalType::Datetime),
            ("id".to_string(), LogicalType::Int),
            ("val".to_string(), LogicalType::Float),
        ],
        max_rows,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_keys_validate(keys in pipe_keys_strategy()) {
            prop_assert!(keys.validate().is_ok());
        }

        #[test]
        fn generated_batches_are_rectangular(batch in timeseries_batch_strategy(20)) {
            for col in batch.columns() {
                prop_assert_eq!(col.cells.len(), batch.num_rows());
            }
        }
    }
}
