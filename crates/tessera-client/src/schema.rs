//! Wire model for server-paginated asset pages.
//!
//! The set of columns is declared by the server on every response and may
//! change between responses. Rows are maps from column id to a cell.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tessera_core::AssetId;

/// Column holding the stable numeric row identifier.
pub const ROW_ID_COLUMN: &str = "asset/id";

/// A server-declared column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// Stable key, e.g. `asset/external_id`.
    pub id: String,
    /// Header text.
    pub title: String,
    /// Server type code (1/2 numeric, 3 date, anything else text).
    #[serde(default)]
    pub value_type: i64,
    /// Fixed width in pixels; `None` means flexible.
    #[serde(default)]
    pub width: Option<u32>,
    /// Whether the server can sort by this column.
    #[serde(default)]
    pub sortable: bool,
    /// Whether the server can filter on this column.
    #[serde(default)]
    pub filterable: bool,
    /// Whether free-text search covers this column.
    #[serde(default)]
    pub searchable: bool,
    /// Hidden by default.
    #[serde(default)]
    pub hidden: bool,
}

/// A single cell value.
///
/// Aggregated metadata collapses several underlying values into one
/// `{value, count}` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    /// A collapsed value with its occurrence count.
    Aggregated {
        /// Representative value.
        value: Value,
        /// Number of underlying values.
        count: u64,
    },
    /// A plain scalar (or any JSON value the server chose to send).
    Scalar(Value),
}

impl Cell {
    /// The value regardless of envelope.
    #[must_use]
    pub fn value(&self) -> &Value {
        match self {
            Self::Aggregated { value, .. } | Self::Scalar(value) => value,
        }
    }

    /// The occurrence count for aggregated cells.
    #[must_use]
    pub fn count(&self) -> Option<u64> {
        match self {
            Self::Aggregated { count, .. } => Some(*count),
            Self::Scalar(_) => None,
        }
    }

    /// The value as an integer, accepting numeric strings.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self.value() {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// One asset row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(BTreeMap<String, Cell>);

impl Row {
    /// Builds a row from `(column id, cell)` pairs.
    pub fn from_cells<I, K>(cells: I) -> Self
    where
        I: IntoIterator<Item = (K, Cell)>,
        K: Into<String>,
    {
        Self(cells.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Looks up a cell by column id.
    #[must_use]
    pub fn get(&self, column_id: &str) -> Option<&Cell> {
        self.0.get(column_id)
    }

    /// The stable row identifier.
    #[must_use]
    pub fn id(&self) -> Option<AssetId> {
        self.get(ROW_ID_COLUMN)
            .and_then(Cell::as_i64)
            .map(AssetId::new)
    }

    /// Column ids present in this row.
    pub fn column_ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Restricts the row to `columns` (plus the row id), filling gaps with null.
    pub fn conform_to(&mut self, columns: &BTreeSet<&str>) {
        self.0
            .retain(|k, _| k == ROW_ID_COLUMN || columns.contains(k.as_str()));
        for column in columns {
            self.0
                .entry((*column).to_string())
                .or_insert(Cell::Scalar(Value::Null));
        }
    }
}

/// Counters reported alongside a page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchStats {
    /// Rows in this page.
    pub returned: u64,
    /// Total matching rows, or `None` when the server could not count cheaply.
    #[serde(default)]
    pub total: Option<u64>,
    /// Server-side query time.
    #[serde(default)]
    pub duration_ms: Option<f64>,
}

/// The window the server actually served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Offset of the first row.
    pub offset: u64,
    /// Requested page size.
    pub limit: u64,
}

/// One page of assets with the schema it was rendered against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    /// Rows in server order.
    pub items: Vec<Row>,
    /// Columns for this response.
    pub schema: Vec<ColumnDefinition>,
    /// Counters.
    pub stats: FetchStats,
    /// Served window.
    pub pagination: Pagination,
}

impl FetchResult {
    /// Makes every row carry exactly the schema's column ids.
    pub fn normalize(&mut self) {
        let columns: BTreeSet<&str> = self.schema.iter().map(|c| c.id.as_str()).collect();
        for row in &mut self.items {
            row.conform_to(&columns);
        }
    }
}
