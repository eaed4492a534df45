use chrono::{NaiveDate, NaiveDateTime, Timelike};

pub const MINUTES_PER_DAY: u32 = 24 * 60;

const DATE_FORMAT: &str = "%Y%m%d";

/// This is the standard way of converting a date to a file stem in daytrack.
pub fn date_to_record_name(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn record_name_to_date(name: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(name, DATE_FORMAT).ok()
}

/// Minute of the (local) day, 0..1440.
pub fn minute_of_day(time: NaiveDateTime) -> u32 {
    time.hour() * 60 + time.minute()
}

/// `605` -> `"10:05"`
pub fn format_minute(minute: u32) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

/// `65` -> `"1:05"`, `5` -> `"5m"`
pub fn format_minutes_duration(minutes: u32) -> String {
    if minutes >= 60 {
        format!("{}:{:02}", minutes / 60, minutes % 60)
    } else {
        format!("{minutes}m")
    }
}
