//! Per-record rules. Both functions are total: they never fail, whatever the record holds.

use crate::domain::model::{Record, ValidationOutcome, INVALID_EMAIL};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::LazyLock;

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$")
        .expect("email pattern is a valid regex")
});

// 帶時區的時間取當地日期
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
];

// 月份在前的美式格式優先於日在前的格式
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%b-%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%d-%b-%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %b %Y",
    "%d %B %Y",
    "%Y%m%d",
];

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_REGEX.is_match(value)
}

/// Checks `column` against the `local-part@domain.tld` pattern.
///
/// A record without the column is rejected the same way as a malformed address.
pub fn validate_email(record: Record, column: &str) -> ValidationOutcome {
    match record.get(column) {
        Some(value) if is_valid_email(value) => ValidationOutcome::Accepted(record),
        _ => ValidationOutcome::rejected(record, INVALID_EMAIL),
    }
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local().date());
    }
    if let Some(dt) = OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(value, fmt).ok())
    {
        return Some(dt.naive_local().date());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|dt| dt.date())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        })
}

/// Keeps only the date part of each named column.
///
/// Values that do not parse become `unparseable`; absent columns are left alone.
pub fn truncate_date_columns(mut record: Record, columns: &[String], unparseable: &str) -> Record {
    for column in columns {
        let Some(value) = record.get(column) else {
            continue;
        };
        let truncated = match parse_date(value) {
            Some(date) => date.format("%Y-%m-%d").to_string(),
            None => unparseable.to_string(),
        };
        record.set(column, truncated);
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail(value: &str) -> Record {
        Record::from_pairs([("login_id", "u1"), ("mail_address", value)])
    }

    #[test]
    fn test_validate_email_accepts_plus_and_dots() {
        let outcome = validate_email(mail("a.b+c@example.co"), "mail_address");
        assert!(outcome.is_accepted());
    }

    #[test]
    fn test_validate_email_rejections() {
        for bad in [
            "not-an-email",
            "",
            "user@domain",
            "user@domain.c",
            "user@domain.c0m",
            " user@example.com",
            "user@example.com\n",
            "ユーザー@example.com",
            "user@@example.com",
        ] {
            let outcome = validate_email(mail(bad), "mail_address");
            assert_eq!(outcome.reason(), Some(INVALID_EMAIL), "expected rejection for {:?}", bad);
        }
    }

    #[test]
    fn test_validate_email_missing_column_is_rejected() {
        let record = Record::from_pairs([("login_id", "u1")]);
        let outcome = validate_email(record, "mail_address");
        assert_eq!(outcome.reason(), Some(INVALID_EMAIL));
    }

    #[test]
    fn test_validate_email_is_idempotent() {
        for value in ["ok@example.org", "broken@"] {
            let first = validate_email(mail(value), "mail_address");
            let record = match first.clone() {
                ValidationOutcome::Accepted(r) => r,
                ValidationOutcome::Rejected(r) => r.record,
            };
            assert_eq!(validate_email(record, "mail_address"), first);
        }
    }

    #[test]
    fn test_truncate_date_columns() {
        let record = Record::from_pairs([("created_at", "2023-05-01 14:32:00")]);
        let record = truncate_date_columns(record, &["created_at".to_string()], "");
        assert_eq!(record.get("created_at"), Some("2023-05-01"));
    }

    #[test]
    fn test_truncate_date_columns_formats() {
        let cases = [
            ("2023-05-01T14:32:00", "2023-05-01"),
            ("2023-05-01T14:32:00.123+09:00", "2023-05-01"),
            ("2023-05-01 14:32:00+09:00", "2023-05-01"),
            ("2023-05-01 23:32:00.5-0700", "2023-05-01"),
            ("2023-05-01 00:10:00 +0900", "2023-05-01"),
            ("2023/05/01 08:00", "2023-05-01"),
            ("05/01/2023 23:59:59", "2023-05-01"),
            ("2023-05-01", "2023-05-01"),
            ("01-May-2023", "2023-05-01"),
        ];
        for (input, expected) in cases {
            let record = Record::from_pairs([("created_at", input)]);
            let record = truncate_date_columns(record, &["created_at".to_string()], "");
            assert_eq!(record.get("created_at"), Some(expected), "input {:?}", input);
        }
    }

    #[test]
    fn test_truncate_date_columns_unparseable_and_absent() {
        let record = Record::from_pairs([("created_at", "yesterday"), ("id", "7")]);
        let columns = vec!["created_at".to_string(), "birthday_on".to_string()];
        let record = truncate_date_columns(record, &columns, "#INVALID");

        assert_eq!(record.get("created_at"), Some("#INVALID"));
        assert_eq!(record.get("id"), Some("7"));
        assert_eq!(record.get("birthday_on"), None);
    }
}
