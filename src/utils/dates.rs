// src/utils/dates.rs
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};

const OFFSET_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
];

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parses an ISO-8601 creation date. Offsets are converted to UTC, naive
/// datetimes and plain dates are taken as UTC. Returns `None` for empty or
/// unparsable input; never fails.
pub fn parse_created_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

pub fn render_created_date(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Year used for cross-rule bucketing: years at or below `min_year` are
/// floored to `min_year`, missing dates yield `None`.
pub fn bucket_year(raw: &str, min_year: i32) -> Option<i32> {
    parse_created_date(raw).map(|dt| dt.year().max(min_year))
}

/// `YYYY_MM_DD` token used in output file names.
pub fn date_token(today: NaiveDate) -> String {
    today.format("%Y_%m_%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_common_iso_shapes() {
        let expected = Utc.with_ymd_and_hms(2021, 6, 15, 8, 30, 0).unwrap();
        assert_eq!(parse_created_date("2021-06-15T08:30:00Z"), Some(expected));
        assert_eq!(parse_created_date("2021-06-15T08:30:00+00:00"), Some(expected));
        assert_eq!(parse_created_date("2021-06-15T08:30:00.000+0000"), Some(expected));
        assert_eq!(parse_created_date("2021-06-15T10:30:00+02:00"), Some(expected));
        assert_eq!(parse_created_date("2021-06-15 08:30:00"), Some(expected));
        assert_eq!(
            parse_created_date(" 2021-06-15 "),
            Some(Utc.with_ymd_and_hms(2021, 6, 15, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_empty_and_garbage_are_missing() {
        assert_eq!(parse_created_date(""), None);
        assert_eq!(parse_created_date("   "), None);
        assert_eq!(parse_created_date("NaT"), None);
        assert_eq!(parse_created_date("2021-13-45"), None);
    }

    #[test]
    fn test_rendered_date_parses_back() {
        let dt = Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap();
        let rendered = render_created_date(&dt);
        assert_eq!(rendered, "2019-01-01T00:00:00+00:00");
        assert_eq!(parse_created_date(&rendered), Some(dt));
    }

    #[test]
    fn test_bucket_year_floors_to_baseline() {
        assert_eq!(bucket_year("2019-01-01", 2021), Some(2021));
        assert_eq!(bucket_year("2021-12-31T23:00:00Z", 2021), Some(2021));
        assert_eq!(bucket_year("2022-01-01", 2021), Some(2022));
        assert_eq!(bucket_year("", 2021), None);
        assert_eq!(bucket_year("garbage", 2021), None);
    }

    #[test]
    fn test_date_token_format() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(date_token(day), "2024_03_07");
    }
}
