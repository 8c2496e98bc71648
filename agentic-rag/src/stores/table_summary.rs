//! Structure summary of a CSV table, shown to code agents before they write
//! code against the file.

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::error::StoreError;

const EXAMPLE_COUNT: usize = 5;
const NULL_MARKERS: [&str; 7] = ["", "NA", "N/A", "NaN", "nan", "null", "None"];

#[derive(Debug, Serialize)]
struct TableSummary {
    total_rows: usize,
    columns: Vec<ColumnSummary>,
}

#[derive(Debug, Serialize)]
struct ColumnSummary {
    column_name: String,
    data_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unique_values: Option<usize>,
    example_values: Vec<Value>,
    null_values: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Kind {
    Int,
    Float,
    Bool,
    Text,
}

impl Kind {
    fn dtype(self) -> &'static str {
        match self {
            Kind::Int => "int64",
            Kind::Float => "float64",
            Kind::Bool => "bool",
            Kind::Text => "object",
        }
    }
}

fn is_null(cell: &str) -> bool {
    NULL_MARKERS.contains(&cell.trim())
}

fn infer_kind(values: &[&str]) -> Kind {
    if values.is_empty() {
        return Kind::Float;
    }
    if values.iter().all(|v| v.trim().parse::<i64>().is_ok()) {
        Kind::Int
    } else if values.iter().all(|v| v.trim().parse::<f64>().is_ok()) {
        Kind::Float
    } else if values
        .iter()
        .all(|v| matches!(v.trim(), "True" | "False" | "true" | "false"))
    {
        Kind::Bool
    } else {
        Kind::Text
    }
}

fn example_value(kind: Kind, cell: &str) -> Value {
    let cell = cell.trim();
    match kind {
        Kind::Int => cell.parse::<i64>().map(Value::from).unwrap_or(Value::Null),
        Kind::Float => cell
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Kind::Bool => Value::Bool(cell.eq_ignore_ascii_case("true")),
        Kind::Text => Value::String(cell.to_string()),
    }
}

fn numeric_range(kind: Kind, values: &[&str]) -> Option<String> {
    match kind {
        Kind::Int => {
            let parsed: Vec<i64> = values.iter().filter_map(|v| v.trim().parse().ok()).collect();
            Some(format!("{} to {}", parsed.iter().min()?, parsed.iter().max()?))
        }
        Kind::Float => {
            let parsed: Vec<f64> = values.iter().filter_map(|v| v.trim().parse().ok()).collect();
            let min = parsed.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = parsed.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            if parsed.is_empty() {
                Some("nan to nan".to_string())
            } else {
                Some(format!("{} to {}", min, max))
            }
        }
        _ => None,
    }
}

/// Summarize the CSV at `path` as pretty JSON: total row count plus, per
/// column, its inferred type, range (numeric) or distinct count, up to five
/// example values and the null count.
pub fn summarize_csv(path: &Path) -> Result<String, StoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| StoreError::Invalid(format!("{}: {}", path.display(), e)))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| StoreError::Invalid(e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    let mut total_rows = 0;
    for record in reader.records() {
        let record = record.map_err(|e| StoreError::Invalid(e.to_string()))?;
        total_rows += 1;
        for (i, column) in cells.iter_mut().enumerate() {
            column.push(record.get(i).unwrap_or("").to_string());
        }
    }

    let columns = headers
        .into_iter()
        .zip(cells)
        .map(|(name, column)| summarize_column(name, &column))
        .collect();

    let summary = TableSummary {
        total_rows,
        columns,
    };

    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    summary
        .serialize(&mut serializer)
        .map_err(|e| StoreError::Invalid(e.to_string()))?;
    String::from_utf8(out).map_err(|e| StoreError::Invalid(e.to_string()))
}

fn summarize_column(column_name: String, column: &[String]) -> ColumnSummary {
    let present: Vec<&str> = column
        .iter()
        .map(String::as_str)
        .filter(|c| !is_null(c))
        .collect();
    let nulls = column.len() - present.len();
    let kind = infer_kind(&present);

    let mut example_values: Vec<Value> = present
        .iter()
        .take(EXAMPLE_COUNT)
        .map(|c| example_value(kind, c))
        .collect();
    if example_values.is_empty() {
        example_values.push(Value::String("None".to_string()));
    }

    let numeric = matches!(kind, Kind::Int | Kind::Float);
    ColumnSummary {
        column_name,
        data_type: kind.dtype(),
        range: numeric_range(kind, &present),
        unique_values: (!numeric).then(|| present.iter().collect::<HashSet<_>>().len()),
        example_values,
        null_values: nulls.to_string(),
    }
}
