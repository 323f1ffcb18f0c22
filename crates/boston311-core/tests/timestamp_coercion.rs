use chrono::NaiveDate;
use polars::prelude::*;

use boston311_core::pipeline::coerce_timestamp;
use boston311_core::schema::timestamp_dtype;

fn micros(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32, milli: u32) -> i64 {
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|date| date.and_hms_milli_opt(h, min, s, milli))
        .expect("valid timestamp")
        .and_utc()
        .timestamp_micros()
}

fn coerce(series: Series) -> PolarsResult<Vec<Option<i64>>> {
    let name = series.name().to_string();
    let dtype = series.dtype().clone();
    let df = DataFrame::new(vec![series.into()])?;
    let out = df
        .lazy()
        .with_columns([coerce_timestamp(&name, &dtype)])
        .collect()?;
    let column = out.column(&name)?;
    assert_eq!(column.dtype(), &timestamp_dtype());
    Ok(column.datetime()?.into_iter().collect())
}

#[test]
fn text_timestamps_accept_common_layouts() -> PolarsResult<()> {
    let values = Series::new(
        "closed_dt".into(),
        [
            Some("2023-01-10 00:00:00"),
            Some("2023-01-10T06:30:00"),
            Some("2023-01-10 06:30:00.250"),
            Some("2023-01-10 06:30"),
            Some("2023-01-10"),
            Some("2023-01-10T00:00:00Z"),
            Some("2023-01-10 00:00:00+00:00"),
            Some("2023-01-10T05:00:00+05:00"),
            Some("2023-01-09T19:00:00.500-0500"),
            Some(" 2023-01-10 00:00:00 "),
            Some("not a date"),
            Some(""),
            None,
        ],
    );

    let got = coerce(values)?;
    assert_eq!(
        got,
        vec![
            Some(micros(2023, 1, 10, 0, 0, 0, 0)),
            Some(micros(2023, 1, 10, 6, 30, 0, 0)),
            Some(micros(2023, 1, 10, 6, 30, 0, 250)),
            Some(micros(2023, 1, 10, 6, 30, 0, 0)),
            Some(micros(2023, 1, 10, 0, 0, 0, 0)),
            Some(micros(2023, 1, 10, 0, 0, 0, 0)),
            Some(micros(2023, 1, 10, 0, 0, 0, 0)),
            Some(micros(2023, 1, 10, 0, 0, 0, 0)),
            Some(micros(2023, 1, 10, 0, 0, 0, 500)),
            Some(micros(2023, 1, 10, 0, 0, 0, 0)),
            None,
            None,
            None,
        ]
    );
    Ok(())
}

#[test]
fn dates_become_midnight() -> PolarsResult<()> {
    let days_since_epoch = (NaiveDate::from_ymd_opt(2023, 1, 5).unwrap()
        - NaiveDate::from_ymd_opt(1970, 1, 1).unwrap())
    .num_days() as i32;
    let values = Series::new("target_dt".into(), [Some(days_since_epoch), None])
        .cast(&DataType::Date)?;

    let got = coerce(values)?;
    assert_eq!(got, vec![Some(micros(2023, 1, 5, 0, 0, 0, 0)), None]);
    Ok(())
}

#[test]
fn numbers_are_epoch_seconds() -> PolarsResult<()> {
    let seconds = micros(2023, 1, 10, 0, 0, 0, 0) / 1_000_000;
    let values = Series::new("open_dt".into(), [Some(seconds), None]);

    let got = coerce(values)?;
    assert_eq!(got, vec![Some(micros(2023, 1, 10, 0, 0, 0, 0)), None]);
    Ok(())
}

#[test]
fn millisecond_datetimes_are_normalized() -> PolarsResult<()> {
    let millis = micros(2023, 1, 10, 12, 0, 0, 0) / 1_000;
    let values = Series::new("closed_dt".into(), [millis])
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;

    let got = coerce(values)?;
    assert_eq!(got, vec![Some(micros(2023, 1, 10, 12, 0, 0, 0))]);
    Ok(())
}

#[test]
fn unsupported_types_become_null() -> PolarsResult<()> {
    let values = Series::new("closed_dt".into(), [true, false]);
    let got = coerce(values)?;
    assert_eq!(got, vec![None, None]);
    Ok(())
}
