//! Structured query representation.
//!
//! Expressions are leaf predicates over one field; a [`Query`] combines them. Both
//! render a canonical string (`Display`) and a canonical nested map (`to_map`), the
//! latter being the serde JSON form used by remote backends.

use crate::model::{Table, Value};
use crate::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operator of a generalized [`Expression::Comparison`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    BeginsWith,
    EndsWith,
    Contains,
    Like,
}

impl ComparisonOperator {
    fn symbol(self) -> &'static str {
        match self {
            ComparisonOperator::Equal => "==",
            ComparisonOperator::NotEqual => "!=",
            ComparisonOperator::LessThan => "<",
            ComparisonOperator::LessThanOrEqual => "<=",
            ComparisonOperator::GreaterThan => ">",
            ComparisonOperator::GreaterThanOrEqual => ">=",
            ComparisonOperator::BeginsWith => "BEGINSWITH",
            ComparisonOperator::EndsWith => "ENDSWITH",
            ComparisonOperator::Contains => "CONTAINS",
            ComparisonOperator::Like => "LIKE",
        }
    }
}

/// String comparison modifiers for [`Expression::Comparison`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonOptions {
    #[serde(default)]
    pub case_insensitive: bool,
    #[serde(default)]
    pub diacritic_insensitive: bool,
    #[serde(default)]
    pub normalized: bool,
}

impl ComparisonOptions {
    pub fn case_insensitive() -> Self {
        Self {
            case_insensitive: true,
            ..Self::default()
        }
    }

    pub fn diacritic_insensitive() -> Self {
        Self {
            diacritic_insensitive: true,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.case_insensitive || self.diacritic_insensitive || self.normalized)
    }
}

impl fmt::Display for ComparisonOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        f.write_str("[")?;
        if self.case_insensitive {
            f.write_str("c")?;
        }
        if self.diacritic_insensitive {
            f.write_str("d")?;
        }
        if self.normalized {
            f.write_str("n")?;
        }
        f.write_str("]")
    }
}

/// A leaf predicate over one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expression {
    Equal {
        key: String,
        value: Value,
    },
    NotEqual {
        key: String,
        value: Value,
    },
    Contains {
        key: String,
        value: Value,
    },
    Like {
        key: String,
        pattern: String,
    },
    Inside {
        key: String,
        values: Vec<Value>,
    },
    IsNil {
        key: String,
    },
    IsNotNil {
        key: String,
    },
    Comparison {
        key: String,
        operator: ComparisonOperator,
        value: Value,
        #[serde(default)]
        options: ComparisonOptions,
    },
    All,
    Search {
        keys: Vec<String>,
        text: String,
    },
    IsEmpty {
        key: String,
    },
}

impl Expression {
    pub fn equal(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Expression::Equal {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn not_equal(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Expression::NotEqual {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn contains(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Expression::Contains {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn like(key: impl Into<String>, pattern: impl Into<String>) -> Self {
        Expression::Like {
            key: key.into(),
            pattern: pattern.into(),
        }
    }

    pub fn inside<I, V>(key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Expression::Inside {
            key: key.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_nil(key: impl Into<String>) -> Self {
        Expression::IsNil { key: key.into() }
    }

    pub fn is_not_nil(key: impl Into<String>) -> Self {
        Expression::IsNotNil { key: key.into() }
    }

    pub fn comparison(
        key: impl Into<String>,
        operator: ComparisonOperator,
        value: impl Into<Value>,
        options: ComparisonOptions,
    ) -> Self {
        Expression::Comparison {
            key: key.into(),
            operator,
            value: value.into(),
            options,
        }
    }

    pub fn search<I, S>(keys: I, text: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Expression::Search {
            keys: keys.into_iter().map(Into::into).collect(),
            text: text.into(),
        }
    }

    pub fn is_empty(key: impl Into<String>) -> Self {
        Expression::IsEmpty { key: key.into() }
    }

    /// Whether a remote backend may receive this expression.
    ///
    /// `inside` and normalization or diacritic-insensitive comparisons are not part of
    /// the wire convention.
    pub fn is_remote_safe(&self) -> bool {
        match self {
            Expression::Inside { .. } => false,
            Expression::Comparison { options, .. } => {
                !(options.diacritic_insensitive || options.normalized)
            }
            _ => true,
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Equal { key, value } => write!(f, "{key} == {value}"),
            Expression::NotEqual { key, value } => write!(f, "{key} != {value}"),
            Expression::Contains { key, value } => write!(f, "{key} CONTAINS {value}"),
            Expression::Like { key, pattern } => write!(f, "{key} LIKE {pattern:?}"),
            Expression::Inside { key, values } => {
                write!(f, "{key} IN {}", Value::List(values.clone()))
            }
            Expression::IsNil { key } => write!(f, "{key} == nil"),
            Expression::IsNotNil { key } => write!(f, "{key} != nil"),
            Expression::Comparison {
                key,
                operator,
                value,
                options,
            } => write!(f, "{key} {}{options} {value}", operator.symbol()),
            Expression::All => f.write_str("ALL"),
            Expression::Search { keys, text } => {
                write!(f, "SEARCH({}) {text:?}", keys.join(", "))
            }
            Expression::IsEmpty { key } => write!(f, "{key} IS EMPTY"),
        }
    }
}

/// Boolean structure of a [`Query`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Expression(Expression),
    And(Vec<Expression>),
    Or(Vec<Expression>),
    CompoundAnd(Vec<Query>),
    CompoundOr(Vec<Query>),
}

/// An immutable filter over one table.
///
/// `joins` and `includes` name related tables a backend may attach eagerly; the
/// in-memory evaluator ignores them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub predicate: Predicate,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub joins: Vec<Table>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<Table>,
}

impl Query {
    fn from_predicate(predicate: Predicate) -> Self {
        Self {
            predicate,
            joins: Vec::new(),
            includes: Vec::new(),
        }
    }

    pub fn expression(expression: Expression) -> Self {
        Self::from_predicate(Predicate::Expression(expression))
    }

    pub fn and(expressions: impl IntoIterator<Item = Expression>) -> Self {
        Self::from_predicate(Predicate::And(expressions.into_iter().collect()))
    }

    pub fn or(expressions: impl IntoIterator<Item = Expression>) -> Self {
        Self::from_predicate(Predicate::Or(expressions.into_iter().collect()))
    }

    pub fn compound_and(queries: impl IntoIterator<Item = Query>) -> Self {
        Self::from_predicate(Predicate::CompoundAnd(queries.into_iter().collect()))
    }

    pub fn compound_or(queries: impl IntoIterator<Item = Query>) -> Self {
        Self::from_predicate(Predicate::CompoundOr(queries.into_iter().collect()))
    }

    pub fn joining(mut self, table: Table) -> Self {
        if !self.joins.contains(&table) {
            self.joins.push(table);
        }
        self
    }

    pub fn including(mut self, table: Table) -> Self {
        if !self.includes.contains(&table) {
            self.includes.push(table);
        }
        self
    }

    /// AND this query with another, keeping the joins and includes of both.
    pub fn and_query(self, other: Query) -> Query {
        let mut joins = self.joins.clone();
        let mut includes = self.includes.clone();
        for table in &other.joins {
            if !joins.contains(table) {
                joins.push(table.clone());
            }
        }
        for table in &other.includes {
            if !includes.contains(table) {
                includes.push(table.clone());
            }
        }
        Query {
            predicate: Predicate::CompoundAnd(vec![self, other]),
            joins,
            includes,
        }
    }

    /// Whether every expression in the tree may be sent to a remote backend.
    pub fn is_remote_safe(&self) -> bool {
        match &self.predicate {
            Predicate::Expression(expression) => expression.is_remote_safe(),
            Predicate::And(expressions) | Predicate::Or(expressions) => {
                expressions.iter().all(Expression::is_remote_safe)
            }
            Predicate::CompoundAnd(queries) | Predicate::CompoundOr(queries) => {
                queries.iter().all(Query::is_remote_safe)
            }
        }
    }

    /// Canonical nested-map form.
    pub fn to_map(&self) -> StorageResult<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| StorageError::EncodeFailed(e.to_string()))
    }

    /// Rebuild a query from its nested-map form.
    pub fn from_map(map: &serde_json::Value) -> StorageResult<Query> {
        Query::deserialize(map).map_err(|e| StorageError::DecodeFailed(e.to_string()))
    }
}

impl From<Expression> for Query {
    fn from(expression: Expression) -> Self {
        Query::expression(expression)
    }
}

fn write_joined<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    items: &[T],
    separator: &str,
    empty: &str,
) -> fmt::Result {
    if items.is_empty() {
        return f.write_str(empty);
    }
    f.write_str("(")?;
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{item}")?;
    }
    f.write_str(")")
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.predicate {
            Predicate::Expression(expression) => write!(f, "{expression}")?,
            Predicate::And(expressions) => write_joined(f, expressions, " AND ", "ALL")?,
            Predicate::Or(expressions) => write_joined(f, expressions, " OR ", "NONE")?,
            Predicate::CompoundAnd(queries) => write_joined(f, queries, " AND ", "ALL")?,
            Predicate::CompoundOr(queries) => write_joined(f, queries, " OR ", "NONE")?,
        }
        if !self.joins.is_empty() {
            let names: Vec<&str> = self.joins.iter().map(Table::name).collect();
            write!(f, " JOIN [{}]", names.join(", "))?;
        }
        if !self.includes.is_empty() {
            let names: Vec<&str> = self.includes.iter().map(Table::name).collect();
            write!(f, " INCLUDE [{}]", names.join(", "))?;
        }
        Ok(())
    }
}

/// Direction of a [`Sort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// One key of a multi-key sort. Sorts apply left to right.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub key: String,
    pub order: SortOrder,
}

impl Sort {
    pub fn ascending(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            order: SortOrder::Ascending,
        }
    }

    pub fn descending(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            order: SortOrder::Descending,
        }
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.order {
            SortOrder::Ascending => write!(f, "{} ASC", self.key),
            SortOrder::Descending => write!(f, "{} DESC", self.key),
        }
    }
}

/// Backend-specific passthrough, opaque to the evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOption {
    pub key: String,
    pub value: Value,
}

impl QueryOption {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}
