//! Downscaled load projections indexed by `(site_id, period)`.

use std::collections::{BTreeSet, HashMap};

use serde_json::{Map, Value};

use crate::table::Attributes;
use crate::types::{AttrValue, Period, SiteId};

/// Load state of one site at the close of one period.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionRow {
    pub site_id: SiteId,
    pub period: Period,
    /// Input attributes of the site, carried through unchanged.
    pub attributes: Attributes,
    /// Cumulative load: baseline plus every allocation up to this period.
    pub total_load: f64,
    /// Per-period delta column. Always 0 on emitted rows: the allocation is
    /// folded into `total_load` before the row is written.
    pub new_load: f64,
}

/// Output table of a downscaling run.
#[derive(Debug, Clone)]
pub struct ProjectionTable {
    value_column: String,
    period_column: String,
    rows: Vec<ProjectionRow>,
    index: HashMap<(SiteId, Period), usize>,
}

impl ProjectionTable {
    pub fn new(value_column: impl Into<String>, period_column: impl Into<String>) -> Self {
        Self {
            value_column: value_column.into(),
            period_column: period_column.into(),
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Name of the cumulative load column, `total_<value>`.
    pub fn total_column(&self) -> String {
        format!("total_{}", self.value_column)
    }

    /// Name of the per-period delta column, `new_<value>`.
    pub fn new_column(&self) -> String {
        format!("new_{}", self.value_column)
    }

    pub fn value_column(&self) -> &str {
        &self.value_column
    }

    pub fn period_column(&self) -> &str {
        &self.period_column
    }

    pub fn push(&mut self, row: ProjectionRow) {
        self.index
            .insert((row.site_id.clone(), row.period), self.rows.len());
        self.rows.push(row);
    }

    /// Append every row of `other`.
    pub fn append(&mut self, other: ProjectionTable) {
        for row in other.rows {
            self.push(row);
        }
    }

    pub fn rows(&self) -> &[ProjectionRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, site_id: &SiteId, period: Period) -> Option<&ProjectionRow> {
        self.index
            .get(&(site_id.clone(), period))
            .map(|&i| &self.rows[i])
    }

    /// Distinct periods present in the table, ascending.
    pub fn periods(&self) -> Vec<Period> {
        self.rows
            .iter()
            .map(|r| r.period)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Rows of a single site, in period order.
    pub fn site_history(&self, site_id: &SiteId) -> Vec<&ProjectionRow> {
        let mut history: Vec<&ProjectionRow> =
            self.rows.iter().filter(|r| &r.site_id == site_id).collect();
        history.sort_by_key(|r| r.period);
        history
    }

    /// Sum of `total_load` over all sites in a period.
    pub fn period_total(&self, period: Period) -> f64 {
        self.rows
            .iter()
            .filter(|r| r.period == period)
            .map(|r| r.total_load)
            .sum()
    }

    /// Flatten to JSON objects: id, period, site attributes, then the load columns.
    /// The period field is named after the table's period column.
    pub fn to_json_records(&self, id_field: &str) -> Vec<Map<String, Value>> {
        let total_column = self.total_column();
        let new_column = self.new_column();
        self.rows
            .iter()
            .map(|row| {
                let mut object = Map::new();
                object.insert(id_field.to_string(), Value::String(row.site_id.to_string()));
                object.insert(self.period_column.clone(), Value::from(row.period.value()));
                for (key, value) in &row.attributes {
                    let json = match value {
                        AttrValue::Number(n) => number(*n),
                        AttrValue::Text(s) => Value::String(s.clone()),
                    };
                    object.insert(key.clone(), json);
                }
                object.insert(total_column.clone(), number(row.total_load));
                object.insert(new_column.clone(), number(row.new_load));
                object
            })
            .collect()
    }
}

fn number(n: f64) -> Value {
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
