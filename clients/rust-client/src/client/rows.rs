use std::sync::Arc;

use crate::protocol::{QueryResponse, Value};

/// One result row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Value of the first column called `name`.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c == name)?;
        self.values.get(idx)
    }
}

/// Forward-only cursor over a fully buffered result set.
///
/// Never goes back to the server. Once exhausted, every further call to
/// [`ProxyRows::next_row`] returns `None`.
#[derive(Debug)]
pub struct ProxyRows {
    columns: Arc<[String]>,
    rows: std::vec::IntoIter<Vec<Value>>,
}

impl ProxyRows {
    pub(crate) fn new(resp: QueryResponse) -> Self {
        Self {
            columns: Arc::from(resp.columns),
            rows: resp.rows.into_iter(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows not yet returned.
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }

    pub fn next_row(&mut self) -> Option<Row> {
        self.rows.next().map(|values| Row {
            columns: Arc::clone(&self.columns),
            values,
        })
    }

    /// Drop the buffered rows. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.rows = Vec::new().into_iter();
    }
}

impl Iterator for ProxyRows {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.next_row()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}
