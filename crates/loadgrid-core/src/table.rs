//! Site tables and load projection tables.
//!
//! Both tables are lists of flat records with named attributes. The engine
//! addresses attributes by column name, so these types only guarantee that a
//! requested column exists and has the right kind of value in every row.

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};

use crate::error::{CoreError, CoreResult};
use crate::types::{AttrValue, Period, SiteId};

/// Named attribute values of a single record.
pub type Attributes = BTreeMap<String, AttrValue>;

/// One site (grid cell) with its attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteRecord {
    pub site_id: SiteId,
    pub attributes: Attributes,
}

impl SiteRecord {
    pub fn new(site_id: impl Into<SiteId>) -> Self {
        Self {
            site_id: site_id.into(),
            attributes: Attributes::new(),
        }
    }

    /// Builder method: set an attribute.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(column.into(), value.into());
        self
    }
}

/// One row of a load projection series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadRecord {
    pub attributes: Attributes,
}

impl LoadRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set an attribute.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(column.into(), value.into());
        self
    }
}

trait Record {
    fn attr(&self, column: &str) -> Option<&AttrValue>;
    fn label(&self, position: usize) -> String;
}

impl Record for SiteRecord {
    fn attr(&self, column: &str) -> Option<&AttrValue> {
        self.attributes.get(column)
    }

    fn label(&self, _position: usize) -> String {
        format!("site {}", self.site_id)
    }
}

impl Record for LoadRecord {
    fn attr(&self, column: &str) -> Option<&AttrValue> {
        self.attributes.get(column)
    }

    fn label(&self, position: usize) -> String {
        format!("row {position}")
    }
}

fn numeric_column<R: Record>(table: &'static str, records: &[R], column: &str) -> CoreResult<Vec<f64>> {
    ensure_column(table, records, column)?;
    records
        .iter()
        .enumerate()
        .map(|(i, r)| match r.attr(column) {
            Some(AttrValue::Number(n)) => Ok(*n),
            Some(AttrValue::Text(s)) => Err(CoreError::NonNumeric {
                column: column.to_string(),
                row: r.label(i),
                found: s.clone(),
            }),
            None => Err(CoreError::MissingValue {
                column: column.to_string(),
                row: r.label(i),
            }),
        })
        .collect()
}

fn text_column<R: Record>(table: &'static str, records: &[R], column: &str) -> CoreResult<Vec<Option<String>>> {
    ensure_column(table, records, column)?;
    Ok(records
        .iter()
        .map(|r| match r.attr(column) {
            Some(AttrValue::Text(s)) => Some(s.clone()),
            Some(AttrValue::Number(n)) => Some(format_label(*n)),
            None => None,
        })
        .collect())
}

fn ensure_column<R: Record>(table: &'static str, records: &[R], column: &str) -> CoreResult<()> {
    if records.is_empty() || records.iter().any(|r| r.attr(column).is_some()) {
        Ok(())
    } else {
        Err(CoreError::MissingColumn {
            table,
            column: column.to_string(),
        })
    }
}

/// Integral numbers used as labels (e.g. region `3`) print without a fraction.
fn format_label(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn attributes_from_json(
    object: Map<String, Value>,
    skip: Option<&str>,
    label: &dyn Fn() -> String,
) -> CoreResult<Attributes> {
    let mut attributes = Attributes::new();
    for (key, value) in object {
        if Some(key.as_str()) == skip {
            continue;
        }
        let attr = match value {
            Value::Null => continue,
            Value::Number(n) => AttrValue::Number(n.as_f64().ok_or_else(|| {
                CoreError::InvalidRecord(format!("{}: {key} is not representable as f64", label()))
            })?),
            Value::String(s) => AttrValue::Text(s),
            other => {
                return Err(CoreError::InvalidRecord(format!(
                    "{}: unsupported value for {key}: {other}",
                    label()
                )));
            }
        };
        attributes.insert(key, attr);
    }
    Ok(attributes)
}

fn attributes_to_json(attributes: &Attributes, object: &mut Map<String, Value>) {
    for (key, value) in attributes {
        let json = match value {
            AttrValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            AttrValue::Text(s) => Value::String(s.clone()),
        };
        object.insert(key.clone(), json);
    }
}

// =============================================================================
// Site table
// =============================================================================

/// A table of sites keyed by unique `site_id`.
#[derive(Debug, Clone, Default)]
pub struct SiteTable {
    records: Vec<SiteRecord>,
    index: HashMap<SiteId, usize>,
}

impl SiteTable {
    /// Build a table, rejecting duplicate site ids.
    pub fn new(records: Vec<SiteRecord>) -> CoreResult<Self> {
        let mut index = HashMap::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            if index.insert(record.site_id.clone(), i).is_some() {
                return Err(CoreError::DuplicateSite(record.site_id.to_string()));
            }
        }
        Ok(Self { records, index })
    }

    /// Parse flat JSON objects, taking the site id from `id_field`.
    ///
    /// Numeric ids are accepted and converted to their text form.
    pub fn from_json_records(objects: Vec<Map<String, Value>>, id_field: &str) -> CoreResult<Self> {
        let records = objects
            .into_iter()
            .enumerate()
            .map(|(i, object)| {
                let site_id = match object.get(id_field) {
                    Some(Value::String(s)) => SiteId::new(s.clone()),
                    Some(Value::Number(n)) => SiteId::new(n.to_string()),
                    _ => {
                        return Err(CoreError::InvalidRecord(format!(
                            "record {i} has no usable {id_field} field"
                        )));
                    }
                };
                let label = || format!("site {site_id}");
                let attributes = attributes_from_json(object, Some(id_field), &label)?;
                Ok(SiteRecord { site_id, attributes })
            })
            .collect::<CoreResult<Vec<_>>>()?;
        Self::new(records)
    }

    /// Serialize back to flat JSON objects with the id stored under `id_field`.
    pub fn to_json_records(&self, id_field: &str) -> Vec<Map<String, Value>> {
        self.records
            .iter()
            .map(|r| {
                let mut object = Map::new();
                object.insert(id_field.to_string(), Value::String(r.site_id.to_string()));
                attributes_to_json(&r.attributes, &mut object);
                object
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[SiteRecord] {
        &self.records
    }

    pub fn get(&self, site_id: &SiteId) -> Option<&SiteRecord> {
        self.index.get(site_id).map(|&i| &self.records[i])
    }

    pub fn site_ids(&self) -> impl Iterator<Item = &SiteId> {
        self.records.iter().map(|r| &r.site_id)
    }

    /// Values of a numeric column, in row order.
    pub fn numeric_column(&self, column: &str) -> CoreResult<Vec<f64>> {
        numeric_column("site", &self.records, column)
    }

    /// Values of a label column, in row order. Rows without a value yield `None`.
    pub fn text_column(&self, column: &str) -> CoreResult<Vec<Option<String>>> {
        text_column("site", &self.records, column)
    }

    /// A new table holding the rows at `positions`, in that order.
    pub fn select(&self, positions: &[usize]) -> SiteTable {
        let records: Vec<SiteRecord> = positions.iter().map(|&i| self.records[i].clone()).collect();
        let index = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.site_id.clone(), i))
            .collect();
        SiteTable { records, index }
    }
}

// =============================================================================
// Load table
// =============================================================================

/// Load projections: one record per period (and region, when resolved regionally).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadTable {
    records: Vec<LoadRecord>,
}

impl LoadTable {
    pub fn new(records: Vec<LoadRecord>) -> Self {
        Self { records }
    }

    pub fn from_json_records(objects: Vec<Map<String, Value>>) -> CoreResult<Self> {
        let records = objects
            .into_iter()
            .enumerate()
            .map(|(i, object)| {
                let label = || format!("row {i}");
                Ok(LoadRecord {
                    attributes: attributes_from_json(object, None, &label)?,
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(Self { records })
    }

    pub fn to_json_records(&self) -> Vec<Map<String, Value>> {
        self.records
            .iter()
            .map(|r| {
                let mut object = Map::new();
                attributes_to_json(&r.attributes, &mut object);
                object
            })
            .collect()
    }

    pub fn push(&mut self, record: LoadRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[LoadRecord] {
        &self.records
    }

    pub fn numeric_column(&self, column: &str) -> CoreResult<Vec<f64>> {
        numeric_column("load_projections", &self.records, column)
    }

    pub fn text_column(&self, column: &str) -> CoreResult<Vec<Option<String>>> {
        text_column("load_projections", &self.records, column)
    }

    /// Values of a period column. Periods must be non-negative integers.
    pub fn period_column(&self, column: &str) -> CoreResult<Vec<Period>> {
        self.numeric_column(column)?
            .into_iter()
            .map(|v| {
                if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= f64::from(u32::MAX) {
                    Ok(Period(v as u32))
                } else {
                    Err(CoreError::InvalidPeriod {
                        column: column.to_string(),
                        value: v,
                    })
                }
            })
            .collect()
    }
}
