//! Predicate and sort builder
//!
//! Predicates are built against a [`SchemaTable`] so every comparison names a
//! declared column. They are plain data: a sink may translate them into its
//! own query language or evaluate them in process with [`Predicate::matches`].

use crate::error::QueryError;
use crate::feature::SchemaTable;
use crate::types::Row;
use crate::value::Value;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// SQL LIKE: `%` matches any run of characters, `_` exactly one
    Like,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Like => "LIKE",
        })
    }
}

#[derive(Clone, Debug)]
pub struct Comparison {
    pub column: String,
    pub op: CompareOp,
    pub value: Value,
    like: Option<Regex>,
}

impl Comparison {
    fn matches(&self, row: &Row) -> bool {
        let actual = row.get(&self.column);
        match self.op {
            CompareOp::Like => match (&self.like, actual.as_text()) {
                (Some(re), Some(text)) => re.is_match(text),
                _ => false,
            },
            op => match actual.compare(&self.value) {
                Some(ord) => match op {
                    CompareOp::Eq => ord == Ordering::Equal,
                    CompareOp::Ne => ord != Ordering::Equal,
                    CompareOp::Gt => ord == Ordering::Greater,
                    CompareOp::Gte => ord != Ordering::Less,
                    CompareOp::Lt => ord == Ordering::Less,
                    CompareOp::Lte => ord != Ordering::Greater,
                    CompareOp::Like => false,
                },
                // Null or mismatched kinds
                None => false,
            },
        }
    }
}

#[derive(Clone, Debug)]
pub enum Predicate {
    Compare(Comparison),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    fn compare(table: &SchemaTable, column: &str, op: CompareOp, value: Value) -> Result<Self, QueryError> {
        if table.column(column).is_none() {
            return Err(QueryError::UnknownColumn {
                table: table.name.clone(),
                column: column.to_string(),
            });
        }

        let like = match op {
            CompareOp::Like => {
                let pattern = value.as_text().ok_or(QueryError::LikeNotText)?;
                Some(like_regex(pattern)?)
            }
            _ => None,
        };

        Ok(Predicate::Compare(Comparison {
            column: column.to_string(),
            op,
            value,
            like,
        }))
    }

    pub fn where_equals(table: &SchemaTable, column: &str, literal: impl Into<Value>) -> Result<Self, QueryError> {
        Self::compare(table, column, CompareOp::Eq, literal.into())
    }

    pub fn where_not_equals(table: &SchemaTable, column: &str, literal: impl Into<Value>) -> Result<Self, QueryError> {
        Self::compare(table, column, CompareOp::Ne, literal.into())
    }

    pub fn where_greater_than(
        table: &SchemaTable,
        column: &str,
        literal: impl Into<Value>,
    ) -> Result<Self, QueryError> {
        Self::compare(table, column, CompareOp::Gt, literal.into())
    }

    pub fn where_greater_than_equals(
        table: &SchemaTable,
        column: &str,
        literal: impl Into<Value>,
    ) -> Result<Self, QueryError> {
        Self::compare(table, column, CompareOp::Gte, literal.into())
    }

    pub fn where_less_than(table: &SchemaTable, column: &str, literal: impl Into<Value>) -> Result<Self, QueryError> {
        Self::compare(table, column, CompareOp::Lt, literal.into())
    }

    pub fn where_less_than_equals(
        table: &SchemaTable,
        column: &str,
        literal: impl Into<Value>,
    ) -> Result<Self, QueryError> {
        Self::compare(table, column, CompareOp::Lte, literal.into())
    }

    pub fn where_like(table: &SchemaTable, column: &str, literal: impl Into<Value>) -> Result<Self, QueryError> {
        Self::compare(table, column, CompareOp::Like, literal.into())
    }

    pub fn and(self, other: Predicate) -> Predicate {
        match self {
            Predicate::And(mut all) => {
                match other {
                    Predicate::And(more) => all.extend(more),
                    other => all.push(other),
                }
                Predicate::And(all)
            }
            this => match other {
                Predicate::And(mut more) => {
                    more.insert(0, this);
                    Predicate::And(more)
                }
                other => Predicate::And(vec![this, other]),
            },
        }
    }

    pub fn or(self, other: Predicate) -> Predicate {
        match self {
            Predicate::Or(mut any) => {
                match other {
                    Predicate::Or(more) => any.extend(more),
                    other => any.push(other),
                }
                Predicate::Or(any)
            }
            this => match other {
                Predicate::Or(mut more) => {
                    more.insert(0, this);
                    Predicate::Or(more)
                }
                other => Predicate::Or(vec![this, other]),
            },
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Predicate::Compare(cmp) => cmp.matches(row),
            Predicate::And(all) => all.iter().all(|p| p.matches(row)),
            Predicate::Or(any) => any.iter().any(|p| p.matches(row)),
        }
    }

    /// Every column this predicate reads
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Predicate::Compare(cmp) => out.push(&cmp.column),
            Predicate::And(list) | Predicate::Or(list) => list.iter().for_each(|p| p.collect_columns(out)),
        }
    }
}

fn like_regex(pattern: &str) -> Result<Regex, QueryError> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push_str("(?s)^");
    let mut literal = [0u8; 4];
    for c in pattern.chars() {
        match c {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            c => re.push_str(&regex::escape(c.encode_utf8(&mut literal))),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|_| QueryError::LikePattern(pattern.to_string()))
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Ordered sort keys; earlier keys take precedence
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Sort {
    keys: Vec<(String, Direction)>,
}

impl Sort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ascending(mut self, column: impl Into<String>) -> Self {
        self.keys.push((column.into(), Direction::Ascending));
        self
    }

    pub fn descending(mut self, column: impl Into<String>) -> Self {
        self.keys.push((column.into(), Direction::Descending));
        self
    }

    pub fn keys(&self) -> &[(String, Direction)] {
        &self.keys
    }

    /// Check every key against the declared columns of `table`.
    pub fn validate(&self, table: &SchemaTable) -> Result<(), QueryError> {
        match self.keys.iter().find(|(column, _)| table.column(column).is_none()) {
            Some((column, _)) => Err(QueryError::UnknownColumn {
                table: table.name.clone(),
                column: column.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Nulls sort first ascending, last descending. Incomparable values tie.
    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        for (column, direction) in &self.keys {
            let (x, y) = (a.get(column), b.get(column));
            let ord = match (x.is_null(), y.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => sort_order(x, y),
            };
            let ord = match direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    pub fn apply(&self, rows: &mut [Row]) {
        rows.sort_by(|a, b| self.compare(a, b));
    }
}

/// Floats use the IEEE total order so a stray NaN cannot break the sort.
fn sort_order(x: &Value, y: &Value) -> Ordering {
    match (x, y) {
        (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)),
        _ => x.compare(y).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::Column;
    use crate::value::FieldType;

    fn runway_table() -> SchemaTable {
        SchemaTable::new("Runway")
            .with_column(Column::new("id", FieldType::Text).primary())
            .with_column(Column::new("designator", FieldType::Text))
            .with_column(Column::new("length", FieldType::Int32))
    }

    fn runway(id: &str, designator: &str, length: Option<i64>) -> Row {
        let mut row = Row::new("Runway").with_key(id);
        row.set("id", id);
        row.set("designator", designator);
        row.set("length", length);
        row
    }

    #[test]
    fn test_comparisons() {
        let table = runway_table();
        let row = runway("RWY_1", "09L/27R", Some(3200));

        assert!(Predicate::where_equals(&table, "length", 3200).unwrap().matches(&row));
        assert!(Predicate::where_not_equals(&table, "length", 100).unwrap().matches(&row));
        assert!(Predicate::where_greater_than(&table, "length", 3199.5).unwrap().matches(&row));
        assert!(Predicate::where_greater_than_equals(&table, "length", 3200).unwrap().matches(&row));
        assert!(!Predicate::where_less_than(&table, "length", 3200).unwrap().matches(&row));
        assert!(Predicate::where_less_than_equals(&table, "length", 3200).unwrap().matches(&row));
        assert!(Predicate::where_equals(&table, "designator", "09L/27R").unwrap().matches(&row));
    }

    #[test]
    fn test_null_never_matches() {
        let table = runway_table();
        let row = runway("RWY_1", "09", None);
        assert!(!Predicate::where_equals(&table, "length", 0).unwrap().matches(&row));
        assert!(!Predicate::where_not_equals(&table, "length", 0).unwrap().matches(&row));
    }

    #[test]
    fn test_like() {
        let table = runway_table();
        let row = runway("RWY_1", "09L/27R", None);
        assert!(Predicate::where_like(&table, "designator", "09%").unwrap().matches(&row));
        assert!(Predicate::where_like(&table, "designator", "09_/27_").unwrap().matches(&row));
        assert!(!Predicate::where_like(&table, "designator", "27%").unwrap().matches(&row));
        assert!(!Predicate::where_like(&table, "designator", "09L.27R").unwrap().matches(&row));
        assert_eq!(
            Predicate::where_like(&table, "length", 10).unwrap_err(),
            QueryError::LikeNotText
        );
    }

    #[test]
    fn test_unknown_column_rejected() {
        let err = Predicate::where_equals(&runway_table(), "width", 45).unwrap_err();
        assert_eq!(
            err,
            QueryError::UnknownColumn {
                table: "Runway".into(),
                column: "width".into()
            }
        );
    }

    #[test]
    fn test_and_or_flatten() {
        let table = runway_table();
        let long = Predicate::where_greater_than(&table, "length", 3000).unwrap();
        let named = Predicate::where_like(&table, "designator", "09%").unwrap();
        let other = Predicate::where_equals(&table, "id", "RWY_2").unwrap();

        let both = long.clone().and(named.clone()).and(other.clone());
        match &both {
            Predicate::And(all) => assert_eq!(all.len(), 3),
            _ => panic!("expected a flattened AND"),
        }
        assert_eq!(both.columns(), vec!["length", "designator", "id"]);

        let row = runway("RWY_1", "09", Some(3500));
        assert!(!both.matches(&row));
        assert!(long.and(named).or(other).matches(&row));
    }

    #[test]
    fn test_sort_nulls_first_and_stable() {
        let mut rows = vec![
            runway("RWY_1", "B", Some(2000)),
            runway("RWY_2", "A", None),
            runway("RWY_3", "C", Some(2000)),
            runway("RWY_4", "D", Some(1000)),
        ];

        Sort::new().ascending("length").apply(&mut rows);
        let ids: Vec<_> = rows.iter().map(|r| r.key.clone().unwrap()).collect();
        assert_eq!(ids, ["RWY_2", "RWY_4", "RWY_1", "RWY_3"]);

        Sort::new().descending("length").ascending("designator").apply(&mut rows);
        let ids: Vec<_> = rows.iter().map(|r| r.key.clone().unwrap()).collect();
        assert_eq!(ids, ["RWY_1", "RWY_3", "RWY_4", "RWY_2"]);
    }

    #[test]
    fn test_sort_floats_with_nan_is_ordered() {
        let mut rows: Vec<Row> = (0..200)
            .map(|i| {
                let mut row = Row::new("Navaid").with_key(format!("NAV_{}", i));
                let frequency = if i % 7 == 0 { f64::NAN } else { ((i * 37) % 101) as f64 + 0.5 };
                row.set("frequency", frequency);
                row
            })
            .collect();

        Sort::new().ascending("frequency").apply(&mut rows);
        let finite: Vec<f64> = rows
            .iter()
            .filter_map(|r| match r.get("frequency") {
                Value::Float(x) if x.is_finite() => Some(*x),
                _ => None,
            })
            .collect();
        assert_eq!(finite.len(), 200 - 29);
        assert!(finite.windows(2).all(|w| w[0] <= w[1]));
        // Positive NaN sorts after every number
        assert!(rows[200 - 29..].iter().all(|r| matches!(r.get("frequency"), Value::Float(x) if x.is_nan())));
    }

    #[test]
    fn test_sort_validate() {
        let table = runway_table();
        assert!(Sort::new().ascending("length").validate(&table).is_ok());
        assert!(Sort::new().ascending("width").validate(&table).is_err());
    }
}
