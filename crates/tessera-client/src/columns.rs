//! Column model derived from a response schema.
//!
//! The server's type codes are resolved once per response into a
//! [`ColumnKind`]; column-specific renderers are looked up by column id.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::format::format_bytes;
use crate::registry::{EntityKind, RegistryData};
use crate::schema::{Cell, ColumnDefinition};

/// Rendering type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    /// Right-aligned numeric values.
    Number,
    /// Timestamps.
    Date,
    /// Everything else.
    Text,
}

impl ColumnKind {
    /// Maps a server type code.
    #[must_use]
    pub const fn from_value_type(code: i64) -> Self {
        match code {
            1 | 2 => Self::Number,
            3 => Self::Date,
            _ => Self::Text,
        }
    }
}

/// Column width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnWidth {
    /// Fixed pixel width.
    Fixed(u32),
    /// Share remaining space.
    Flex,
}

/// How a column's cells are turned into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellRenderer {
    /// Value as-is.
    Plain,
    /// Byte counts with binary units.
    Bytes,
    /// RFC 3339 timestamps as `YYYY-MM-DD HH:MM:SS`.
    Date,
    /// Numeric id resolved to a label and linked to its entity page.
    ForeignKey(EntityKind),
}

/// Column-id → renderer registrations.
#[derive(Debug, Clone, Default)]
pub struct ColumnRenderers {
    by_id: HashMap<String, CellRenderer>,
}

impl ColumnRenderers {
    /// No registrations; every column falls back to its kind.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Renderers for the catalog's well-known columns.
    #[must_use]
    pub fn catalog_defaults() -> Self {
        Self::new()
            .with("asset/provider_id", CellRenderer::ForeignKey(EntityKind::Provider))
            .with("asset/actor_id", CellRenderer::ForeignKey(EntityKind::Actor))
            .with("asset/size", CellRenderer::Bytes)
            .with("asset/file_size", CellRenderer::Bytes)
    }

    /// Registers a renderer for a column id.
    #[must_use]
    pub fn with(mut self, column_id: impl Into<String>, renderer: CellRenderer) -> Self {
        self.register(column_id, renderer);
        self
    }

    /// Registers a renderer for a column id, replacing any previous one.
    pub fn register(&mut self, column_id: impl Into<String>, renderer: CellRenderer) {
        self.by_id.insert(column_id.into(), renderer);
    }

    /// The renderer for a column, falling back to its kind.
    #[must_use]
    pub fn resolve(&self, column_id: &str, kind: ColumnKind) -> CellRenderer {
        self.by_id
            .get(column_id)
            .copied()
            .unwrap_or(match kind {
                ColumnKind::Date => CellRenderer::Date,
                ColumnKind::Number | ColumnKind::Text => CellRenderer::Plain,
            })
    }
}

/// A column header ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column id.
    pub id: String,
    /// Header text.
    pub title: String,
    /// Rendering type.
    pub kind: ColumnKind,
    /// Width.
    pub width: ColumnWidth,
    /// Sortable server-side.
    pub sortable: bool,
    /// Filterable server-side.
    pub filterable: bool,
    /// Covered by search.
    pub searchable: bool,
    /// Shown by default.
    pub visible: bool,
    /// Cell renderer.
    pub renderer: CellRenderer,
}

/// A rendered cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedCell {
    /// Display text.
    pub text: String,
    /// Target for linked cells.
    pub link: Option<String>,
    /// Occurrence count for aggregated cells.
    pub count: Option<u64>,
}

impl fmt::Display for RenderedCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.count {
            Some(count) if count > 1 => write!(f, "{} (×{count})", self.text),
            _ => f.write_str(&self.text),
        }
    }
}

impl Column {
    /// Renders one cell of this column.
    ///
    /// Foreign keys need `registry` for labels; without it they render as `#id`.
    #[must_use]
    pub fn render(&self, cell: Option<&Cell>, registry: Option<&RegistryData>) -> RenderedCell {
        let Some(cell) = cell else {
            return RenderedCell::default();
        };
        let count = cell.count();
        let value = cell.value();

        let (text, link) = match self.renderer {
            CellRenderer::Plain => (plain_text(value), None),
            CellRenderer::Bytes => match value.as_u64() {
                Some(bytes) => (format_bytes(bytes), None),
                None => (plain_text(value), None),
            },
            CellRenderer::Date => (date_text(value), None),
            CellRenderer::ForeignKey(kind) => match cell.as_i64() {
                Some(id) => {
                    let label = registry
                        .and_then(|r| r.label(kind, id))
                        .map_or_else(|| format!("#{id}"), str::to_string);
                    (label, Some(format!("/{}/{id}", kind.path_segment())))
                }
                None => (plain_text(value), None),
            },
        };

        RenderedCell { text, link, count }
    }
}

/// Rebuilds column headers from a response schema.
#[must_use]
pub fn derive_columns(schema: &[ColumnDefinition], renderers: &ColumnRenderers) -> Vec<Column> {
    schema
        .iter()
        .map(|def| {
            let kind = ColumnKind::from_value_type(def.value_type);
            Column {
                id: def.id.clone(),
                title: def.title.clone(),
                kind,
                width: def.width.map_or(ColumnWidth::Flex, ColumnWidth::Fixed),
                sortable: def.sortable,
                filterable: def.filterable,
                searchable: def.searchable,
                visible: !def.hidden,
                renderer: renderers.resolve(&def.id, kind),
            }
        })
        .collect()
}

fn plain_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(plain_text).collect::<Vec<_>>().join(", "),
        Value::Object(_) => value.to_string(),
    }
}

fn date_text(value: &Value) -> String {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map_or_else(
            || plain_text(value),
            |dt| dt.with_timezone(&Utc).format("%Y-%m-%d %H:%M:%S").to_string(),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Provider;
    use serde_json::json;
    use tessera_core::ProviderId;

    fn def(id: &str, value_type: i64, width: Option<u32>) -> ColumnDefinition {
        ColumnDefinition {
            id: id.to_string(),
            title: id.to_uppercase(),
            value_type,
            width,
            sortable: true,
            filterable: false,
            searchable: false,
            hidden: false,
        }
    }

    #[test]
    fn value_types_map_to_kinds() {
        assert_eq!(ColumnKind::from_value_type(1), ColumnKind::Number);
        assert_eq!(ColumnKind::from_value_type(2), ColumnKind::Number);
        assert_eq!(ColumnKind::from_value_type(3), ColumnKind::Date);
        assert_eq!(ColumnKind::from_value_type(0), ColumnKind::Text);
        assert_eq!(ColumnKind::from_value_type(17), ColumnKind::Text);
    }

    #[test]
    fn derive_applies_width_and_renderers() {
        let schema = vec![
            def("asset/size", 1, Some(90)),
            def("asset/created", 3, None),
            def("asset/provider_id", 1, None),
            def("meta/title", 0, None),
        ];
        let columns = derive_columns(&schema, &ColumnRenderers::catalog_defaults());

        assert_eq!(columns[0].width, ColumnWidth::Fixed(90));
        assert_eq!(columns[0].renderer, CellRenderer::Bytes);
        assert_eq!(columns[1].width, ColumnWidth::Flex);
        assert_eq!(columns[1].renderer, CellRenderer::Date);
        assert_eq!(
            columns[2].renderer,
            CellRenderer::ForeignKey(EntityKind::Provider)
        );
        assert_eq!(columns[3].renderer, CellRenderer::Plain);
        assert_eq!(columns[3].kind, ColumnKind::Text);
    }

    #[test]
    fn foreign_keys_resolve_through_registry() {
        let registry = RegistryData::from_lists(
            vec![Provider {
                id: ProviderId::new(4),
                name: "Photo archive".to_string(),
                kind: None,
            }],
            Vec::new(),
        );
        let column = &derive_columns(
            &[def("asset/provider_id", 1, None)],
            &ColumnRenderers::catalog_defaults(),
        )[0];

        let known = column.render(Some(&Cell::Scalar(json!(4))), Some(&registry));
        assert_eq!(known.text, "Photo archive");
        assert_eq!(known.link.as_deref(), Some("/providers/4"));

        let unknown = column.render(Some(&Cell::Scalar(json!(5))), Some(&registry));
        assert_eq!(unknown.text, "#5");

        let unloaded = column.render(Some(&Cell::Scalar(json!(4))), None);
        assert_eq!(unloaded.text, "#4");
    }

    #[test]
    fn aggregated_cells_keep_their_count() {
        let column = &derive_columns(&[def("meta/tag", 0, None)], &ColumnRenderers::new())[0];
        let rendered = column.render(
            Some(&Cell::Aggregated {
                value: json!("cat"),
                count: 3,
            }),
            None,
        );
        assert_eq!(rendered.count, Some(3));
        assert_eq!(rendered.to_string(), "cat (×3)");
    }

    #[test]
    fn bytes_and_dates_format() {
        let columns = derive_columns(
            &[def("asset/size", 1, None), def("asset/created", 3, None)],
            &ColumnRenderers::catalog_defaults(),
        );
        let size = columns[0].render(Some(&Cell::Scalar(json!(1536))), None);
        assert_eq!(size.text, "1.5 KB");

        let created = columns[1].render(
            Some(&Cell::Scalar(json!("2024-03-01T10:20:30+02:00"))),
            None,
        );
        assert_eq!(created.text, "2024-03-01 08:20:30");
    }

    #[test]
    fn missing_cells_render_empty() {
        let column = &derive_columns(&[def("a", 0, None)], &ColumnRenderers::new())[0];
        assert_eq!(column.render(None, None), RenderedCell::default());
        assert_eq!(
            column
                .render(Some(&Cell::Scalar(json!(["x", 2]))), None)
                .text,
            "x, 2"
        );
    }
}
