use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Collection descriptor shared by every record of one type.
///
/// `foreign_key` is the field name other record types use to point at rows of this
/// table. Identity is the table name alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    name: Cow<'static, str>,
    foreign_key: Cow<'static, str>,
}

impl Table {
    pub const fn new(name: &'static str, foreign_key: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            foreign_key: Cow::Borrowed(foreign_key),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn foreign_key(&self) -> &str {
        &self.foreign_key
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Table {}

impl Hash for Table {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A single field value as seen by the query evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Render the value as a record identifier, if it can act as one.
    pub fn as_identifier(&self) -> Option<String> {
        match self {
            Value::Text(text) if !text.is_empty() => Some(text.clone()),
            Value::Int(number) => Some(number.to_string()),
            _ => None,
        }
    }

    /// Ordering between values of comparable kinds. Integers and floats compare
    /// numerically; any other kind mismatch yields `None`.
    pub fn partial_compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.partial_compare(y)? {
                        Ordering::Equal => continue,
                        ordering => return Some(ordering),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => None,
        }
    }

    /// Total ordering used for sorting. Incomparable kinds fall back to a fixed kind
    /// rank, which puts nulls first. NaN sorts after every other number.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Float(b)) => numeric_sort_cmp(*a as f64, *b),
            (Value::Float(a), Value::Int(b)) => numeric_sort_cmp(*a, *b as f64),
            (Value::Float(a), Value::Float(b)) => numeric_sort_cmp(*a, *b),
            (Value::List(a), Value::List(b)) => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| x.sort_cmp(y))
                .find(|ordering| ordering.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            _ => self
                .partial_compare(other)
                .unwrap_or_else(|| self.rank().cmp(&other.rank())),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Text(_) => 3,
            Value::Bytes(_) => 4,
            Value::Timestamp(_) => 5,
            Value::List(_) => 6,
        }
    }
}

fn numeric_sort_cmp(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.partial_compare(other) == Some(Ordering::Equal)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("nil"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::Text(value) => write!(f, "{value:?}"),
            Value::Bytes(value) => write!(f, "<{} bytes>", value.len()),
            Value::Timestamp(value) => write!(f, "{}", value.to_rfc3339()),
            Value::List(values) => {
                f.write_str("[")?;
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Value::Text(value.clone())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Timestamp(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::List(values)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Read capability shared by every record type.
///
/// `field` is the structured accessor the evaluator uses instead of reflection; it must
/// return [`Value::Null`] for names the type does not know. Two records are the same
/// record when their identifiers match, whatever their other fields hold.
pub trait Viewable: Clone + Send + Sync + 'static {
    const TABLE: Table;
    const ID_KEY: &'static str = "id";

    fn id(&self) -> &str;

    fn field(&self, key: &str) -> Value;

    /// Field lookup with the identifier key resolved from [`Viewable::id`].
    fn value(&self, key: &str) -> Value {
        if key == Self::ID_KEY {
            Value::Text(self.id().to_string())
        } else {
            self.field(key)
        }
    }

    fn same_record(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

/// Read-write capability. Only `Storable` types can be passed to mutating adapter calls.
pub trait Storable: Viewable {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_identity_is_name_only() {
        let a = Table::new("pets", "pet_id");
        let b = Table::new("pets", "animal_id");
        let c = Table::new("owners", "pet_id");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn numeric_kinds_compare_across_int_and_float() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_eq!(
            Value::Int(1).partial_compare(&Value::Float(1.5)),
            Some(Ordering::Less)
        );
        assert_eq!(Value::Text("1".into()).partial_compare(&Value::Int(1)), None);
    }

    #[test]
    fn nan_sorts_after_every_number() {
        let mut values: Vec<Value> = (0..30)
            .map(|i| {
                if i % 3 == 0 {
                    Value::Float(f64::NAN)
                } else if i % 2 == 0 {
                    Value::Int(30 - i)
                } else {
                    Value::Float((30 - i) as f64 + 0.5)
                }
            })
            .collect();
        values.sort_by(|a, b| a.sort_cmp(b));

        let numbers: Vec<f64> = values
            .iter()
            .map(|value| match value {
                Value::Int(n) => *n as f64,
                Value::Float(f) => *f,
                other => panic!("unexpected {other}"),
            })
            .collect();
        let (ordered, nans): (Vec<f64>, Vec<f64>) =
            numbers.iter().copied().partition(|f| !f.is_nan());
        assert_eq!(nans.len(), 10);
        assert!(ordered.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(numbers[..ordered.len()].iter().all(|f| !f.is_nan()));
    }

    #[test]
    fn sort_order_puts_null_first() {
        let mut values = vec![Value::from("b"), Value::Null, Value::from("a")];
        values.sort_by(|a, b| a.sort_cmp(b));
        assert!(values[0].is_null());
        assert_eq!(values[1], Value::from("a"));
    }

    #[test]
    fn identifiers_from_text_and_int() {
        assert_eq!(Value::from("o1").as_identifier().as_deref(), Some("o1"));
        assert_eq!(Value::Int(7).as_identifier().as_deref(), Some("7"));
        assert_eq!(Value::from("").as_identifier(), None);
        assert_eq!(Value::Null.as_identifier(), None);
    }

    #[test]
    fn display_quotes_text() {
        let list = Value::List(vec![Value::from("a"), Value::Int(3), Value::Null]);
        assert_eq!(list.to_string(), "[\"a\", 3, nil]");
    }
}
