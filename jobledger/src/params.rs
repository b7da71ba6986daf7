//! Normalization of the caller's repetition input into a parameter table.
//!
//! A launch call varies one or more named arguments across its jobs. Callers
//! hand those variations over in whatever shape is convenient; [`Reps`]
//! classifies the input and [`Reps::expand`] produces the uniform ordered
//! table the executors consume, one row per job.

use serde_json::{Map, Value};

use crate::LaunchError;

/// The argument set of a single call: named JSON values.
pub type Args = Map<String, Value>;

/// A caller's repetition specification.
#[derive(Debug, Clone, PartialEq)]
pub enum Reps {
    /// A single varying value: one job.
    Value(Value),
    /// An unnamed sequence: one job per element, all under one argument name.
    Values(Vec<Value>),
    /// Named equal-length columns: one job per position.
    Columns(Map<String, Value>),
    /// Explicit table rows: one job per row, all rows sharing one name set.
    Rows(Vec<Args>),
}

impl From<Value> for Reps {
    /// Classify a JSON value. An array of objects is a row table, any other
    /// array is an unnamed sequence, an object whose values are all arrays is
    /// a column table, any other object is a single row, and a scalar is a
    /// single value.
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => {
                let rows = items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::Object(row) => Some(row),
                        _ => None,
                    })
                    .collect();
                Reps::Rows(rows)
            }
            Value::Array(items) => Reps::Values(items),
            Value::Object(map) if !map.is_empty() && map.values().all(Value::is_array) => {
                Reps::Columns(map)
            }
            Value::Object(row) => Reps::Rows(vec![row]),
            scalar => Reps::Value(scalar),
        }
    }
}

impl From<Vec<Value>> for Reps {
    fn from(values: Vec<Value>) -> Self {
        Reps::Values(values)
    }
}

impl Reps {
    /// Expand into the ordered parameter table. Unnamed input is assigned
    /// `argname` as its sole column name.
    pub(crate) fn expand(self, argname: &str) -> Result<ParamTable, LaunchError> {
        let invalid = |message: String| LaunchError::InvalidParameters(message);
        match self {
            Reps::Value(value) => Ok(ParamTable::single_column(argname, vec![value])),
            Reps::Values(values) => {
                if values.is_empty() {
                    return Err(invalid("the repetition sequence is empty".to_owned()));
                }
                Ok(ParamTable::single_column(argname, values))
            }
            Reps::Columns(map) => {
                let mut columns = Vec::with_capacity(map.len());
                for (name, value) in map {
                    match value {
                        Value::Array(items) => columns.push((name, items)),
                        _ => {
                            return Err(invalid(format!("column `{name}` is not a sequence")));
                        }
                    }
                }
                let Some(length) = columns.first().map(|(_, items)| items.len()) else {
                    return Err(invalid("the column table has no columns".to_owned()));
                };
                if length == 0 {
                    return Err(invalid("the column table has no rows".to_owned()));
                }
                for (name, items) in &columns {
                    if items.len() != length {
                        return Err(invalid(format!(
                            "column `{name}` has length {}, expected {length}",
                            items.len()
                        )));
                    }
                }
                let names = columns.iter().map(|(name, _)| name.clone()).collect();
                let rows = (0..length)
                    .map(|position| {
                        columns
                            .iter()
                            .map(|(name, items)| (name.clone(), items[position].clone()))
                            .collect()
                    })
                    .collect();
                Ok(ParamTable { names, rows })
            }
            Reps::Rows(rows) => {
                let Some(first) = rows.first() else {
                    return Err(invalid("the row table has no rows".to_owned()));
                };
                let names: Vec<String> = first.keys().cloned().collect();
                for (position, row) in rows.iter().enumerate() {
                    if row.len() != names.len() || !names.iter().all(|name| row.contains_key(name))
                    {
                        return Err(invalid(format!(
                            "row {position} does not share the names of the first row"
                        )));
                    }
                }
                Ok(ParamTable { names, rows })
            }
        }
    }
}

/// The expanded, ordered table of per-job arguments. Position `k` holds the
/// varying argument set of the launch call's `k`-th job.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamTable {
    names: Vec<String>,
    rows: Vec<Args>,
}

impl ParamTable {
    fn single_column(name: &str, values: Vec<Value>) -> Self {
        let rows = values
            .into_iter()
            .map(|value| {
                let mut row = Args::new();
                row.insert(name.to_owned(), value);
                row
            })
            .collect();
        Self {
            names: vec![name.to_owned()],
            rows,
        }
    }

    /// The number of jobs this launch call will produce.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn rows(&self) -> &[Args] {
        &self.rows
    }

    /// The fixed arguments are merged into every row, so a name collision
    /// with a varying column is uniform across the call and rejected before
    /// any row is written.
    pub(crate) fn ensure_disjoint(&self, fixed: &Args) -> Result<(), LaunchError> {
        for name in fixed.keys() {
            if self.names.iter().any(|column| column == name) {
                return Err(LaunchError::InvalidParameters(format!(
                    "fixed argument `{name}` collides with a varying column"
                )));
            }
        }
        Ok(())
    }

    /// Row `position` unioned with the fixed arguments. Callers must have
    /// checked [`ParamTable::ensure_disjoint`] first.
    pub(crate) fn merged(&self, position: usize, fixed: &Args) -> Args {
        let mut args = self.rows[position].clone();
        for (name, value) in fixed {
            args.insert(name.clone(), value.clone());
        }
        args
    }
}
