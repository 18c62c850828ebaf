use crate::domain::model::{Record, Rejection, DUPLICATE_KEY};
use crate::utils::error::{CleanError, Result};
use std::collections::HashSet;

/// Splits `records` into first-seen uniques and later duplicates.
///
/// Identity is the tuple of values at `key_columns`, in the given order. Only
/// the later occurrences are reported as duplicates, tagged `duplicate_key`.
pub fn partition_duplicates(
    records: Vec<Record>,
    key_columns: &[String],
) -> Result<(Vec<Record>, Vec<Rejection>)> {
    let (unique, duplicates) = split_by_key(records, key_columns, |record| record)?;
    let duplicates = duplicates
        .into_iter()
        .map(|record| Rejection::new(record, DUPLICATE_KEY))
        .collect();
    Ok((unique, duplicates))
}

/// Same partition over any item that carries a record.
pub(crate) fn split_by_key<T>(
    items: Vec<T>,
    key_columns: &[String],
    record_of: impl Fn(&T) -> &Record,
) -> Result<(Vec<T>, Vec<T>)> {
    if key_columns.is_empty() {
        return Err(CleanError::ConfigError {
            message: "duplicate detection needs at least one key column".to_string(),
        });
    }

    let mut seen: HashSet<Vec<String>> = HashSet::with_capacity(items.len());
    let mut unique = Vec::with_capacity(items.len());
    let mut duplicates = Vec::new();

    for item in items {
        let key = key_of(record_of(&item), key_columns)?;
        if seen.insert(key) {
            unique.push(item);
        } else {
            duplicates.push(item);
        }
    }

    Ok((unique, duplicates))
}

fn key_of(record: &Record, key_columns: &[String]) -> Result<Vec<String>> {
    key_columns
        .iter()
        .map(|column| {
            record
                .get(column)
                .map(str::to_string)
                .ok_or_else(|| CleanError::Schema {
                    column: column.clone(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<Record> {
        values
            .iter()
            .map(|v| Record::from_pairs([("id", *v)]))
            .collect()
    }

    #[test]
    fn test_keeps_first_occurrence() {
        let (unique, duplicates) =
            partition_duplicates(ids(&["1", "2", "1"]), &["id".to_string()]).unwrap();

        let unique_ids: Vec<&str> = unique.iter().filter_map(|r| r.get("id")).collect();
        assert_eq!(unique_ids, vec!["1", "2"]);
        assert_eq!(duplicates.len(), 1);
        assert_eq!(duplicates[0].record.get("id"), Some("1"));
        assert_eq!(duplicates[0].reason, DUPLICATE_KEY);
    }

    #[test]
    fn test_composite_key_is_order_sensitive() {
        let records = vec![
            Record::from_pairs([("login_id", "a"), ("mail_address", "x@example.com")]),
            Record::from_pairs([("login_id", "a"), ("mail_address", "y@example.com")]),
            Record::from_pairs([("login_id", "a"), ("mail_address", "x@example.com")]),
        ];
        let keys = vec!["login_id".to_string(), "mail_address".to_string()];
        let (unique, duplicates) = partition_duplicates(records, &keys).unwrap();

        assert_eq!(unique.len(), 2);
        assert_eq!(duplicates.len(), 1);
        assert_eq!(duplicates[0].record.get("mail_address"), Some("x@example.com"));
    }

    #[test]
    fn test_missing_key_column_is_schema_error() {
        let err = partition_duplicates(ids(&["1"]), &["login_id".to_string()]).unwrap_err();
        match err {
            CleanError::Schema { column } => assert_eq!(column, "login_id"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_input() {
        let (unique, duplicates) = partition_duplicates(Vec::new(), &["id".to_string()]).unwrap();
        assert!(unique.is_empty());
        assert!(duplicates.is_empty());
    }
}
