//! Canned pipes and batches for tests.

use chrono::{NaiveDate, NaiveDateTime};
use pipesync_batch::{Batch, Cell};
use pipesync_core::{ColumnRoles, Pipe, PipeKeys};
use pipesync_types::LogicalType;

/// A timestamp on the given day of January 2022.
pub fn january(day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2022, 1, day)
        .expect("valid day")
        .and_hms_opt(0, 0, 0)
        .expect("valid time")
}

/// The standard test pipe: datetime `dt`, id `id`, value `val`.
pub fn weather_pipe() -> Pipe {
    let mut pipe = Pipe::new(
        PipeKeys::new("plugin_weather", "temperature"),
        "mem_main",
    );
    pipe.parameters.columns = ColumnRoles {
        datetime: Some("dt".into()),
        id: Some("id".into()),
        value: Some("val".into()),
        ..Default::default()
    };
    pipe
}

/// A pipe keyed on a single primary column.
pub fn keyed_pipe() -> Pipe {
    let mut pipe = Pipe::new(PipeKeys::new("sql_main", "orders"), "mem_main");
    pipe.parameters.columns = ColumnRoles {
        primary: Some("order_id".into()),
        value: Some("total".into()),
        ..Default::default()
    };
    pipe.parameters
        .dtypes
        .insert("order_id".into(), LogicalType::Int);
    pipe.parameters
        .dtypes
        .insert("total".into(), LogicalType::NUMERIC);
    pipe
}

/// A dt/id/val batch from (day, id, val) tuples.
pub fn plain_batch(rows: &[(u32, i64, f64)]) -> Batch {
    Batch::from_rows(
        &["dt", "id", "val"],
        rows.iter()
            .map(|(day, id, val)| {
                vec![
                    Cell::Datetime(january(*day)),
                    Cell::Int(*id),
                    Cell::Float(*val),
                ]
            })
            .collect(),
    )
    .expect("fixture rows are rectangular")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixtures_validate() {
        assert!(weather_pipe().validate().is_ok());
        assert!(keyed_pipe().validate().is_ok());
        assert_eq!(plain_batch(&[(1, 1, 1.0), (2, 2, 2.0)]).num_rows(), 2);
    }
}
