// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Row payload types.

use std::fmt;

/// Identifier of a row within its table. Row ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowId(pub u64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single column value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Varchar(String),
}

impl Value {
    /// Returns true for SQL NULL.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Varchar(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Varchar(v)
    }
}

/// One tuple, stored row-wise.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Row(pub Vec<Value>);

impl Row {
    /// Creates a row from its column values.
    #[inline]
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Returns the column values.
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// Returns the value of one column.
    #[inline]
    pub fn get(&self, column: usize) -> Option<&Value> {
        self.0.get(column)
    }

    /// Returns the number of columns.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the row has no columns.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

/// Columnar batch of tuples, the unit handed to indexes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowBatch {
    columns: Vec<Vec<Value>>,
    len: usize,
}

impl RowBatch {
    /// Transposes row-wise tuples into columns.
    ///
    /// Rows shorter than `column_count` are padded with NULL.
    pub fn from_rows<'a>(column_count: usize, rows: impl IntoIterator<Item = &'a Row>) -> Self {
        let mut columns: Vec<Vec<Value>> = vec![Vec::new(); column_count];
        let mut len = 0;
        for row in rows {
            for (i, column) in columns.iter_mut().enumerate() {
                column.push(row.get(i).cloned().unwrap_or(Value::Null));
            }
            len += 1;
        }
        Self { columns, len }
    }

    /// Returns the number of tuples.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the batch holds no tuples.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of columns.
    #[inline]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Returns one column.
    #[inline]
    pub fn column(&self, index: usize) -> Option<&[Value]> {
        self.columns.get(index).map(Vec::as_slice)
    }
}
