use std::collections::HashMap;

use serde_json::Value;

use crate::error::{PipelineError, PipelineResult};

/// One value of a loosely typed input table.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Missing,
    Bool(bool),
    Num(f64),
    Text(String),
}

impl Cell {
    pub fn num(value: f64) -> Self {
        if value.is_nan() {
            Cell::Missing
        } else {
            Cell::Num(value)
        }
    }

    pub fn text(value: &str) -> Self {
        Cell::Text(value.to_string())
    }

    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Cell::Missing,
            Value::Bool(b) => Cell::Bool(*b),
            Value::Number(n) => n.as_f64().map(Cell::num).unwrap_or_default(),
            Value::String(s) => Cell::Text(s.clone()),
            // Nested payloads (fixture `stats` arrays etc.) carry nothing the pipeline reads.
            Value::Array(_) | Value::Object(_) => Cell::Missing,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Missing => None,
            Cell::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Cell::Num(v) if v.is_nan() => None,
            Cell::Num(v) => Some(*v),
            Cell::Text(s) => s.trim().parse::<f64>().ok().filter(|v| !v.is_nan()),
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        let v = self.as_f64()?;
        if v < 0.0 || v.fract() != 0.0 || v > u32::MAX as f64 {
            return None;
        }
        Some(v as u32)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Cell::Bool(b) => Some(*b),
            Cell::Num(v) if !v.is_nan() => Some(*v != 0.0),
            Cell::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    table: String,
    names: Vec<String>,
    index: HashMap<String, usize>,
    columns: Vec<Vec<Cell>>,
    rows: usize,
}

impl Frame {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            ..Default::default()
        }
    }

    pub fn from_records(table: &str, records: &[Value]) -> Self {
        let mut frame = Self::new(table);
        for record in records {
            let Some(obj) = record.as_object() else {
                continue;
            };
            frame.push_row(obj.iter().map(|(k, v)| (k.as_str(), Cell::from_json(v))));
        }
        frame
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn columns(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn column(&self, name: &str) -> PipelineResult<&[Cell]> {
        self.index
            .get(name)
            .map(|&idx| self.columns[idx].as_slice())
            .ok_or_else(|| PipelineError::schema(&self.table, name))
    }

    pub fn require(&self, names: &[&str]) -> PipelineResult<()> {
        for name in names {
            if !self.has_column(name) {
                return Err(PipelineError::schema(&self.table, name));
            }
        }
        Ok(())
    }

    pub fn cell(&self, row: usize, name: &str) -> Option<&Cell> {
        self.index
            .get(name)
            .and_then(|&idx| self.columns[idx].get(row))
    }

    pub fn numeric(&self, name: &str) -> PipelineResult<Vec<Option<f64>>> {
        Ok(self.column(name)?.iter().map(Cell::as_f64).collect())
    }

    pub fn numeric_or(&self, name: &str, default: f64) -> PipelineResult<Vec<f64>> {
        Ok(self
            .column(name)?
            .iter()
            .map(|c| c.as_f64().unwrap_or(default))
            .collect())
    }

    pub fn set_column(&mut self, name: &str, cells: Vec<Cell>) -> PipelineResult<()> {
        if self.names.is_empty() && self.rows == 0 {
            self.rows = cells.len();
        }
        if cells.len() != self.rows {
            return Err(PipelineError::RowCountMismatch {
                expected: self.rows,
                found: cells.len(),
            });
        }
        match self.index.get(name) {
            Some(&idx) => self.columns[idx] = cells,
            None => {
                self.index.insert(name.to_string(), self.names.len());
                self.names.push(name.to_string());
                self.columns.push(cells);
            }
        }
        Ok(())
    }

    pub fn set_numeric(&mut self, name: &str, values: Vec<f64>) -> PipelineResult<()> {
        self.set_column(name, values.into_iter().map(Cell::num).collect())
    }

    pub fn push_row<'a, I>(&mut self, row: I)
    where
        I: IntoIterator<Item = (&'a str, Cell)>,
    {
        let row_idx = self.rows;
        for (name, cell) in row {
            let idx = match self.index.get(name) {
                Some(&idx) => idx,
                None => {
                    let idx = self.names.len();
                    self.index.insert(name.to_string(), idx);
                    self.names.push(name.to_string());
                    self.columns.push(vec![Cell::Missing; row_idx]);
                    idx
                }
            };
            let column = &mut self.columns[idx];
            if column.len() == row_idx {
                column.push(cell);
            } else {
                // Duplicate key in one row: last write wins.
                column[row_idx] = cell;
            }
        }
        self.rows += 1;
        for column in &mut self.columns {
            if column.len() < self.rows {
                column.push(Cell::Missing);
            }
        }
    }

    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> PipelineResult<Frame> {
        let mut out = Frame::new(&self.table);
        out.rows = self.rows;
        for name in names {
            let name = name.as_ref();
            let cells = self.column(name)?.to_vec();
            out.set_column(name, cells)?;
        }
        Ok(out)
    }

    pub fn without(&self, names: &[&str]) -> Frame {
        let mut out = Frame::new(&self.table);
        out.rows = self.rows;
        for (name, cells) in self.names.iter().zip(&self.columns) {
            if names.contains(&name.as_str()) {
                continue;
            }
            out.index.insert(name.clone(), out.names.len());
            out.names.push(name.clone());
            out.columns.push(cells.clone());
        }
        out
    }

    pub fn concat(table: &str, frames: &[Frame]) -> Frame {
        let mut out = Frame::new(table);
        for frame in frames {
            for row in 0..frame.rows {
                out.push_row(
                    frame
                        .names
                        .iter()
                        .zip(&frame.columns)
                        .map(|(name, col)| (name.as_str(), col[row].clone())),
                );
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn from_frame(frame: &Frame) -> Self {
        Self::new(frame.columns().to_vec())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn matrix(&self, frame: &Frame) -> PipelineResult<Vec<Vec<f64>>> {
        if frame.columns() != self.names.as_slice() {
            return Err(PipelineError::FeatureMismatch {
                expected: self.names.clone(),
                found: frame.columns().to_vec(),
            });
        }
        let mut rows = vec![Vec::with_capacity(self.names.len()); frame.len()];
        for name in &self.names {
            let column = frame.column(name)?;
            for (row, cell) in rows.iter_mut().zip(column) {
                row.push(cell.as_f64().unwrap_or(f64::NAN));
            }
        }
        Ok(rows)
    }
}
