//! Header + positional rows input.
//!
//! Besides a stream of [`Record`]s, writers accept a stream whose first item
//! is a header (a list of column names) followed by positional rows. This
//! module turns such a stream into records.

use crate::error::{CoreError, Result};
use crate::record::Record;
use crate::value::Value;

/// One item of a row stream.
#[derive(Debug, Clone, PartialEq)]
pub enum InputRow {
    /// A mapping-shaped record.
    Record(Record),
    /// A positional row; the first one in a stream is the header.
    Values(Vec<Value>),
}

impl From<Record> for InputRow {
    fn from(record: Record) -> Self {
        InputRow::Record(record)
    }
}

impl From<Vec<Value>> for InputRow {
    fn from(values: Vec<Value>) -> Self {
        InputRow::Values(values)
    }
}

/// Adapts a stream of [`InputRow`]s into records.
///
/// If the first item is [`InputRow::Values`] it is taken as the header and
/// every later item must be positional too; rows shorter than the header
/// are padded with nulls. If the first item is a record, every later item
/// must be a record.
///
/// # Examples
///
/// ```
/// use dyntable_core::{InputRow, RowNormalizer, Value};
///
/// let rows = vec![
///     InputRow::Values(vec!["id".into(), "name".into()]),
///     InputRow::Values(vec![1.into(), "Cleo".into()]),
///     InputRow::Values(vec![2.into()]),
/// ];
/// let records: Vec<_> = RowNormalizer::new(rows).collect::<Result<_, _>>().unwrap();
/// assert_eq!(records[1].get("name"), Some(&Value::Null));
/// ```
pub struct RowNormalizer<I> {
    rows: I,
    header: Option<Vec<String>>,
    position: usize,
    failed: bool,
}

impl<I> RowNormalizer<I>
where
    I: Iterator<Item = InputRow>,
{
    pub fn new<T>(rows: T) -> Self
    where
        T: IntoIterator<IntoIter = I>,
    {
        Self {
            rows: rows.into_iter(),
            header: None,
            position: 0,
            failed: false,
        }
    }

    fn read_header(values: Vec<Value>) -> Result<Vec<String>> {
        values
            .into_iter()
            .enumerate()
            .map(|(i, v)| match v {
                Value::Text(name) => Ok(name),
                other => Err(CoreError::NonStringColumnName(other.to_string(), i)),
            })
            .collect()
    }

    fn next_row(&mut self, row: InputRow) -> Result<Option<Record>> {
        let position = self.position;
        self.position += 1;
        match row {
            InputRow::Values(values) if position == 0 => {
                self.header = Some(Self::read_header(values)?);
                Ok(None)
            }
            InputRow::Values(values) => {
                let Some(header) = self.header.as_ref() else {
                    return Err(CoreError::MixedRowFormats(position));
                };
                if values.len() > header.len() {
                    return Err(CoreError::TooManyValues {
                        row: position,
                        expected: header.len(),
                        found: values.len(),
                    });
                }
                let mut record = Record::with_capacity(header.len());
                let mut values = values.into_iter();
                for name in header {
                    record.insert(name.clone(), values.next().unwrap_or(Value::Null));
                }
                Ok(Some(record))
            }
            InputRow::Record(_) if self.header.is_some() => Err(CoreError::MixedRowFormats(position)),
            InputRow::Record(record) => Ok(Some(record)),
        }
    }
}

impl<I> Iterator for RowNormalizer<I>
where
    I: Iterator<Item = InputRow>,
{
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            let row = self.rows.next()?;
            match self.next_row(row) {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => continue,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    fn normalize(rows: Vec<InputRow>) -> Result<Vec<Record>> {
        RowNormalizer::new(rows).collect()
    }

    #[test]
    fn test_header_rows_become_records() {
        let records = normalize(vec![
            InputRow::Values(vec!["a".into(), "b".into()]),
            InputRow::Values(vec![1.into(), 2.into()]),
        ])
        .unwrap();
        assert_eq!(records, vec![record! { "a" => 1, "b" => 2 }]);
    }

    #[test]
    fn test_records_pass_through() {
        let records = normalize(vec![record! { "a" => 1 }.into(), record! { "b" => 2 }.into()]).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_non_string_header_fails() {
        let err = normalize(vec![InputRow::Values(vec!["a".into(), 5.into()])]).unwrap_err();
        assert_eq!(err, CoreError::NonStringColumnName("5".into(), 1));
    }

    #[test]
    fn test_mixing_formats_fails() {
        let err = normalize(vec![
            InputRow::Values(vec!["a".into()]),
            InputRow::Record(record! { "a" => 1 }),
        ])
        .unwrap_err();
        assert_eq!(err, CoreError::MixedRowFormats(1));

        let err = normalize(vec![
            InputRow::Record(record! { "a" => 1 }),
            InputRow::Values(vec![1.into()]),
        ])
        .unwrap_err();
        assert_eq!(err, CoreError::MixedRowFormats(1));
    }

    #[test]
    fn test_too_many_values_fails() {
        let err = normalize(vec![
            InputRow::Values(vec!["a".into()]),
            InputRow::Values(vec![1.into(), 2.into()]),
        ])
        .unwrap_err();
        assert!(matches!(err, CoreError::TooManyValues { row: 1, expected: 1, found: 2 }));
    }

    #[test]
    fn test_iteration_stops_after_error() {
        let mut it = RowNormalizer::new(vec![
            InputRow::Values(vec![1.into()]),
            InputRow::Values(vec!["x".into()]),
        ]);
        assert!(matches!(it.next(), Some(Err(_))));
        assert!(it.next().is_none());
    }
}
