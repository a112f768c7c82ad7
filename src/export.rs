//! Offline CSV rendering of the booking ledger.
//!
//! Columns: `ID,Event_Type,Arrival_Time,Start_Time,End_Time,Metadata`, one row
//! per committed booking, sorted by arrival. Times are wall-clock timestamps
//! counted from the simulation epoch (2018-01-01 00:00, a Monday).

use std::io;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use csv::Writer;

use crate::model::*;

pub const HEADER: [&str; 6] = [
    "ID",
    "Event_Type",
    "Arrival_Time",
    "Start_Time",
    "End_Time",
    "Metadata",
];

fn epoch() -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(2018, 1, 1)?.and_hms_opt(0, 0, 0)
}

/// `2018-01-01 08:30:00` style; out-of-range values fall back to raw minutes.
pub fn format_minutes(t: Minutes) -> String {
    TimeDelta::try_minutes(t)
        .and_then(|d| epoch()?.checked_add_signed(d))
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| t.to_string())
}

fn metadata_column(metadata: &Metadata) -> String {
    let mut obj = serde_json::Map::new();
    obj.insert(
        "patient_type".into(),
        serde_json::Value::String(metadata.patient_type.clone()),
    );
    for (k, v) in &metadata.extra {
        obj.insert(k.clone(), serde_json::Value::String(v.clone()));
    }
    serde_json::Value::Object(obj).to_string()
}

/// Committed bookings from ledger records, stably sorted by arrival.
pub fn bookings_by_arrival(records: &[LedgerRecord]) -> Vec<&Booking> {
    let mut bookings: Vec<&Booking> = records
        .iter()
        .map(|r| match r {
            LedgerRecord::BookingCommitted { booking, .. } => booking,
        })
        .collect();
    bookings.sort_by_key(|b| b.arrival);
    bookings
}

/// Write the CSV for `records` to `out`. Returns the number of data rows.
pub fn write_csv<W: io::Write>(records: &[LedgerRecord], out: W) -> Result<usize, csv::Error> {
    let mut writer = Writer::from_writer(out);
    writer.write_record(HEADER)?;
    let bookings = bookings_by_arrival(records);
    for b in &bookings {
        writer.write_record([
            b.entity.to_string(),
            b.stage.clone(),
            format_minutes(b.arrival),
            format_minutes(b.start),
            format_minutes(b.end),
            metadata_column(&b.metadata),
        ])?;
    }
    writer.flush()?;
    Ok(bookings.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(entity: EntityId, stage: &str, arrival: Minutes, start: Minutes) -> LedgerRecord {
        LedgerRecord::BookingCommitted {
            booking: Booking::new(entity, stage.into(), arrival, start, 45, Metadata::new("B2")),
            new_entity: false,
        }
    }

    #[test]
    fn timestamps_from_epoch() {
        assert_eq!(format_minutes(0), "2018-01-01 00:00:00");
        assert_eq!(format_minutes(8 * MINUTES_PER_HOUR + 30), "2018-01-01 08:30:00");
        assert_eq!(format_minutes(31 * MINUTES_PER_DAY), "2018-02-01 00:00:00");
        assert_eq!(format_minutes(i64::MAX), i64::MAX.to_string());
    }

    #[test]
    fn rows_sorted_by_arrival() {
        let records = vec![
            record(2, "Intake", 600, 610),
            record(1, "Admission", 480, 480),
            record(3, "Admission", 600, 600),
        ];
        let mut out = Vec::new();
        assert_eq!(write_csv(&records, &mut out).unwrap(), 3);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ID,Event_Type,Arrival_Time,Start_Time,End_Time,Metadata");
        assert!(lines[1].starts_with("1,Admission,2018-01-01 08:00:00,"));
        // Equal arrivals keep commit order.
        assert!(lines[2].starts_with("2,Intake,2018-01-01 10:00:00,2018-01-01 10:10:00,2018-01-01 10:55:00,"));
        assert!(lines[3].starts_with("3,Admission,"));
        assert!(lines[1].contains(r#""{""patient_type"":""B2""}""#));
    }
}
