//! Reference evaluation of expressions, queries and sorts.
//!
//! Every backend that filters locally goes through these functions, so their results
//! define the observable semantics of the query language.

use crate::model::{Value, Viewable};
use crate::query::{
    ComparisonOperator, ComparisonOptions, Expression, Predicate, Query, Sort, SortOrder,
};
use crate::traits::QueryWindow;
use std::cmp::Ordering;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

impl Expression {
    /// Evaluate against a record through its field accessor.
    pub fn evaluate<R: Viewable>(&self, record: &R) -> bool {
        self.matches_with(&|key: &str| record.value(key))
    }

    /// Evaluate against an arbitrary field lookup.
    pub fn matches_with<F>(&self, lookup: &F) -> bool
    where
        F: Fn(&str) -> Value,
    {
        match self {
            Expression::Equal { key, value } => lookup(key) == *value,
            Expression::NotEqual { key, value } => lookup(key) != *value,
            Expression::Contains { key, value } => contains(&lookup(key), value),
            Expression::Like { key, pattern } => match lookup(key) {
                Value::Text(text) => like_match(&text, pattern),
                _ => false,
            },
            Expression::Inside { key, values } => {
                let field = lookup(key);
                values.iter().any(|candidate| *candidate == field)
            }
            Expression::IsNil { key } => lookup(key).is_null(),
            Expression::IsNotNil { key } => !lookup(key).is_null(),
            Expression::Comparison {
                key,
                operator,
                value,
                options,
            } => compare(*operator, &lookup(key), value, *options),
            Expression::All => true,
            Expression::Search { keys, text } => {
                let needle = text.to_lowercase();
                keys.iter().any(|key| match lookup(key) {
                    Value::Text(field) => field.to_lowercase().contains(&needle),
                    _ => false,
                })
            }
            Expression::IsEmpty { key } => match lookup(key) {
                Value::Null => true,
                Value::Text(text) => text.is_empty(),
                Value::Bytes(bytes) => bytes.is_empty(),
                Value::List(values) => values.is_empty(),
                _ => false,
            },
        }
    }
}

impl Query {
    /// Evaluate against a record through its field accessor.
    pub fn evaluate<R: Viewable>(&self, record: &R) -> bool {
        self.matches_with(&|key: &str| record.value(key))
    }

    pub fn matches_with<F>(&self, lookup: &F) -> bool
    where
        F: Fn(&str) -> Value,
    {
        match &self.predicate {
            Predicate::Expression(expression) => expression.matches_with(lookup),
            Predicate::And(expressions) => expressions.iter().all(|e| e.matches_with(lookup)),
            Predicate::Or(expressions) => expressions.iter().any(|e| e.matches_with(lookup)),
            Predicate::CompoundAnd(queries) => queries.iter().all(|q| q.matches_with(lookup)),
            Predicate::CompoundOr(queries) => queries.iter().any(|q| q.matches_with(lookup)),
        }
    }
}

fn contains(field: &Value, needle: &Value) -> bool {
    match (field, needle) {
        (Value::Text(haystack), Value::Text(needle)) => haystack.contains(needle.as_str()),
        (Value::List(values), needle) => values.iter().any(|value| value == needle),
        _ => false,
    }
}

/// Wildcard match: `*` is any run of characters, `?` exactly one.
pub fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}

/// Apply comparison options to a string.
pub fn fold(text: &str, options: ComparisonOptions) -> String {
    let mut folded: String = if options.diacritic_insensitive {
        text.nfd().filter(|c| !is_combining_mark(*c)).collect()
    } else if options.normalized {
        text.nfc().collect()
    } else {
        text.to_string()
    };
    if options.case_insensitive {
        folded = folded.to_lowercase();
    }
    folded
}

fn compare(
    operator: ComparisonOperator,
    field: &Value,
    value: &Value,
    options: ComparisonOptions,
) -> bool {
    if let (Value::Text(lhs), Value::Text(rhs)) = (field, value) {
        let lhs = fold(lhs, options);
        let rhs = fold(rhs, options);
        return match operator {
            ComparisonOperator::Equal => lhs == rhs,
            ComparisonOperator::NotEqual => lhs != rhs,
            ComparisonOperator::LessThan => lhs < rhs,
            ComparisonOperator::LessThanOrEqual => lhs <= rhs,
            ComparisonOperator::GreaterThan => lhs > rhs,
            ComparisonOperator::GreaterThanOrEqual => lhs >= rhs,
            ComparisonOperator::BeginsWith => lhs.starts_with(&rhs),
            ComparisonOperator::EndsWith => lhs.ends_with(&rhs),
            ComparisonOperator::Contains => lhs.contains(&rhs),
            ComparisonOperator::Like => like_match(&lhs, &rhs),
        };
    }

    let ordering = field.partial_compare(value);
    match operator {
        ComparisonOperator::Equal => ordering == Some(Ordering::Equal),
        ComparisonOperator::NotEqual => ordering != Some(Ordering::Equal),
        ComparisonOperator::LessThan => ordering == Some(Ordering::Less),
        ComparisonOperator::LessThanOrEqual => {
            matches!(ordering, Some(Ordering::Less | Ordering::Equal))
        }
        ComparisonOperator::GreaterThan => ordering == Some(Ordering::Greater),
        ComparisonOperator::GreaterThanOrEqual => {
            matches!(ordering, Some(Ordering::Greater | Ordering::Equal))
        }
        ComparisonOperator::Contains => contains(field, value),
        ComparisonOperator::BeginsWith | ComparisonOperator::EndsWith | ComparisonOperator::Like => {
            false
        }
    }
}

/// Stable multi-key sort; ties keep their input order.
pub fn sort_records<R: Viewable>(records: &mut [R], sorts: &[Sort]) {
    if sorts.is_empty() {
        return;
    }
    records.sort_by(|a, b| {
        for sort in sorts {
            let ordering = a.value(&sort.key).sort_cmp(&b.value(&sort.key));
            let ordering = match sort.order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

/// Drop `offset` items, then keep at most `limit` (`0` keeps everything).
pub fn apply_window<T>(items: Vec<T>, window: QueryWindow) -> Vec<T> {
    let iter = items.into_iter().skip(window.offset);
    if window.limit == 0 {
        iter.collect()
    } else {
        iter.take(window.limit).collect()
    }
}

/// filter → sort → offset → limit over a collection of records.
pub fn run_query<'a, R, I>(
    records: I,
    query: Option<&Query>,
    sorts: &[Sort],
    window: QueryWindow,
) -> Vec<R>
where
    R: Viewable,
    I: IntoIterator<Item = &'a R>,
{
    let mut selected: Vec<R> = records
        .into_iter()
        .filter(|record| query.map_or(true, |q| q.evaluate(*record)))
        .cloned()
        .collect();
    sort_records(&mut selected, sorts);
    apply_window(selected, window)
}
