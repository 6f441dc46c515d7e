//! Base implementation of records for logging.
//!
//! A [`Record`] keeps its entries in insertion order, so that the columns of
//! a log table follow the order in which the keys were registered.
use crate::error::RlError;
use std::{fmt, iter::IntoIterator, slice::Iter, vec::IntoIter};

/// Represents possible types of values that can be stored in a [`Record`].
///
/// Formatting of a value depends on its representation: see the
/// [`Display`](fmt::Display) implementation, used for log files, and
/// [`RecordValue::to_cell`], used for console tables.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    /// A single precision value, typically used for metrics like losses.
    Scalar(f32),

    /// A double precision value.
    Double(f64),

    /// An integer, used for counters.
    Int(i64),

    /// A flag.
    Bool(bool),

    /// A registered key whose value has not been published yet.
    Null,
}

impl RecordValue {
    /// Formats the value as a right-aligned console cell of the given width.
    ///
    /// Floating point values are printed with 6 fixed decimals and
    /// [`RecordValue::Null`] is printed as `-`.
    pub fn to_cell(&self, width: usize) -> String {
        let s = match self {
            Self::Scalar(v) => format!("{:.6}", v),
            Self::Double(v) => format!("{:.6}", v),
            Self::Int(v) => format!("{}", v),
            Self::Bool(v) => format!("{}", *v as u8),
            Self::Null => "-".to_string(),
        };
        format!("{:>width$}", s, width = width)
    }
}

impl fmt::Display for RecordValue {
    /// Floating point values are written with the shortest decimal that
    /// round-trips, flags as `1`/`0` and [`RecordValue::Null`] as an empty
    /// string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Bool(v) => write!(f, "{}", *v as u8),
            Self::Null => Ok(()),
        }
    }
}

/// An insertion-ordered container of key-value pairs.
///
/// Inserting an existing key replaces its value in place, so the position
/// of a key is fixed by its first insertion.
///
/// # Examples
///
/// ```rust
/// use kestrel_core::record::{Record, RecordValue};
///
/// let mut record = Record::from_scalar("loss", 0.5);
/// record.insert("num_updates", RecordValue::Int(10));
/// record.insert("loss", RecordValue::Scalar(0.25));
///
/// assert_eq!(record.keys().collect::<Vec<_>>(), vec!["loss", "num_updates"]);
/// assert_eq!(record.get_scalar("loss").unwrap(), 0.25);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record(Vec<(String, RecordValue)>);

impl Record {
    /// Creates an empty record.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Creates a record containing a single scalar value.
    pub fn from_scalar(name: impl Into<String>, value: f32) -> Self {
        Self(vec![(name.into(), RecordValue::Scalar(value))])
    }

    /// Creates a record from a slice of key-value pairs.
    ///
    /// Later duplicates of a key overwrite earlier ones.
    pub fn from_slice<K: Into<String> + Clone>(s: &[(K, RecordValue)]) -> Self {
        let mut record = Self::empty();
        for (k, v) in s.iter() {
            record.insert(k.clone(), v.clone());
        }
        record
    }

    /// Returns an iterator over the keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    /// Inserts a key-value pair.
    ///
    /// If the key exists, its value is replaced without changing its position.
    pub fn insert(&mut self, k: impl Into<String>, v: RecordValue) {
        let k = k.into();
        match self.0.iter_mut().find(|(key, _)| *key == k) {
            Some((_, value)) => *value = v,
            None => self.0.push((k, v)),
        }
    }

    /// Registers a key with [`RecordValue::Null`] if it does not exist yet.
    pub fn register(&mut self, k: impl Into<String>) {
        let k = k.into();
        if !self.contains_key(&k) {
            self.0.push((k, RecordValue::Null));
        }
    }

    /// Returns `true` if the record contains the key.
    pub fn contains_key(&self, k: &str) -> bool {
        self.0.iter().any(|(key, _)| key == k)
    }

    /// Returns an iterator over the key-value pairs in insertion order.
    pub fn iter(&self) -> Iter<'_, (String, RecordValue)> {
        self.0.iter()
    }

    /// Gets a reference to the value associated with the given key.
    pub fn get(&self, k: &str) -> Option<&RecordValue> {
        self.0.iter().find(|(key, _)| key == k).map(|(_, v)| v)
    }

    /// Merges two records, consuming both.
    ///
    /// Values of `record` overwrite values of `self` with the same key.
    pub fn merge(mut self, record: Record) -> Self {
        self.merge_inplace(record);
        self
    }

    /// Merges another record into this one in place.
    pub fn merge_inplace(&mut self, record: Record) {
        for (k, v) in record.0.into_iter() {
            self.insert(k, v);
        }
    }

    /// Gets a floating point value as `f32`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key does not exist or the value is not
    /// [`RecordValue::Scalar`] or [`RecordValue::Double`].
    pub fn get_scalar(&self, k: &str) -> Result<f32, RlError> {
        match self.get(k) {
            Some(RecordValue::Scalar(v)) => Ok(*v),
            Some(RecordValue::Double(v)) => Ok(*v as f32),
            Some(_) => Err(RlError::RecordValueTypeError("Scalar".to_string())),
            None => Err(RlError::RecordKeyError(k.to_string())),
        }
    }

    /// Gets an integer value.
    pub fn get_int(&self, k: &str) -> Result<i64, RlError> {
        match self.get(k) {
            Some(RecordValue::Int(v)) => Ok(*v),
            Some(_) => Err(RlError::RecordValueTypeError("Int".to_string())),
            None => Err(RlError::RecordKeyError(k.to_string())),
        }
    }

    /// Checks if the record is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl IntoIterator for Record {
    type Item = (String, RecordValue);
    type IntoIter = IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order() {
        let mut record = Record::empty();
        record.register("num_updates");
        record.register("ent_coef");
        record.register("actor_loss");
        record.insert("actor_loss", RecordValue::Scalar(1.5));
        record.insert("num_updates", RecordValue::Int(3));
        record.register("ent_coef");

        let keys = record.keys().collect::<Vec<_>>();
        assert_eq!(keys, vec!["num_updates", "ent_coef", "actor_loss"]);
        assert_eq!(record.get("ent_coef"), Some(&RecordValue::Null));
        assert_eq!(record.get_int("num_updates").unwrap(), 3);
    }

    #[test]
    fn test_merge_overwrites() {
        let a = Record::from_slice(&[("a", RecordValue::Int(1)), ("b", RecordValue::Int(2))]);
        let b = Record::from_slice(&[("b", RecordValue::Int(5)), ("c", RecordValue::Int(6))]);
        let c = a.merge(b);
        assert_eq!(c.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(c.get_int("b").unwrap(), 5);
    }

    #[test]
    fn test_get_errors() {
        let record = Record::from_scalar("loss", 0.5);
        assert!(matches!(
            record.get_scalar("q_value"),
            Err(RlError::RecordKeyError(_))
        ));
        assert!(matches!(
            record.get_int("loss"),
            Err(RlError::RecordValueTypeError(_))
        ));
    }

    #[test]
    fn test_formatting() {
        assert_eq!(RecordValue::Scalar(0.1).to_string(), "0.1");
        assert_eq!(RecordValue::Double(0.30000000000000004).to_string(), "0.30000000000000004");
        assert_eq!(RecordValue::Int(-7).to_string(), "-7");
        assert_eq!(RecordValue::Bool(true).to_string(), "1");
        assert_eq!(RecordValue::Null.to_string(), "");

        assert_eq!(RecordValue::Scalar(0.5).to_cell(12), "    0.500000");
        assert_eq!(RecordValue::Int(42).to_cell(12), "          42");
        assert_eq!(RecordValue::Null.to_cell(4), "   -");
    }
}
