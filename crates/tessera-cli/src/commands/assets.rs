//! Assets command - show one page of a view or collection.

use std::sync::Arc;

use anyhow::{Result, bail};
use clap::Args;
use serde_json::{Map, Value, json};
use tessera_client::{
    CellRenderer, Column, FetchState, FilterCondition, FilterModel, RegistryCache, RegistryData,
    SortKey, TableController, TableOptions, TableScope, TableView,
};
use tessera_core::{CollectionId, ProviderId, ViewId};

use super::api_client;
use crate::{Config, OutputFormat};

/// Arguments for the assets command.
#[derive(Debug, Args)]
pub struct AssetsArgs {
    /// View that defines the columns.
    #[arg()]
    pub view_id: ViewId,

    /// List a collection's assets instead of the whole view.
    #[arg(long, conflicts_with = "provider_id")]
    pub collection_id: Option<CollectionId>,

    /// Restrict the view to one provider.
    #[arg(long)]
    pub provider_id: Option<ProviderId>,

    /// First row to show.
    #[arg(long, default_value = "0")]
    pub offset: u64,

    /// Rows per page (defaults to the configured page size).
    #[arg(long)]
    pub limit: Option<u64>,

    /// Sort key as `column[:asc|desc]`, highest priority first. Repeatable.
    #[arg(long = "sort", value_name = "COLUMN[:DIR]")]
    pub sort: Vec<SortKey>,

    /// Filter as `"column op value"`, e.g. `"asset/size gt 1024"`. Repeatable.
    #[arg(long = "filter", value_name = "FILTER")]
    pub filters: Vec<FilterCondition>,

    /// Free-text search.
    #[arg(long, short = 's')]
    pub search: Option<String>,

    /// Include columns hidden by default.
    #[arg(long)]
    pub all_columns: bool,
}

impl AssetsArgs {
    fn scope(&self) -> TableScope {
        match self.collection_id {
            Some(collection_id) => TableScope::Collection {
                collection_id,
                view_id: self.view_id,
            },
            None => TableScope::View {
                view_id: self.view_id,
                provider_id: self.provider_id,
            },
        }
    }

    fn fetch_state(&self, limit: u64) -> FetchState {
        let mut filters = FilterModel::new();
        for (i, condition) in self.filters.iter().enumerate() {
            filters.set(format!("arg-{i}"), condition.clone());
        }
        FetchState {
            offset: self.offset,
            limit,
            sort: self.sort.clone(),
            filters,
            search: self.search.clone().unwrap_or_default(),
        }
    }
}

/// Execute the assets command.
///
/// # Errors
///
/// Returns an error if the page size is zero or the page cannot be loaded.
pub async fn execute(args: AssetsArgs, config: &Config) -> Result<()> {
    let client = api_client(config)?;

    let mut options = TableOptions::from_config(&config.client);
    let limit = args.limit.unwrap_or(options.limit);
    if limit == 0 {
        bail!("--limit must be greater than zero");
    }
    options.limit = limit;

    let controller = TableController::new(Arc::clone(&client) as Arc<dyn tessera_client::AssetFetcher>, args.scope(), options);
    controller.replace_state(args.fetch_state(limit));
    let outcome = controller.load().await;
    tracing::debug!(?outcome, "asset page loaded");

    let view = controller.view();
    if let Some(error) = &view.error {
        bail!("Failed to load assets: {error}");
    }

    let needs_registry = view
        .columns
        .iter()
        .any(|c| matches!(c.renderer, CellRenderer::ForeignKey(_)));
    let registry = if needs_registry {
        Some(RegistryCache::new(client).get().await?)
    } else {
        None
    };

    let columns: Vec<&Column> = view
        .columns
        .iter()
        .filter(|c| args.all_columns || c.visible)
        .collect();
    let rows = render_rows(&view, &columns, registry.as_deref());
    let page = view.page_info();

    match config.format {
        OutputFormat::Json => {
            let items: Vec<Value> = rows
                .iter()
                .map(|cells| {
                    let object: Map<String, Value> = columns
                        .iter()
                        .zip(cells)
                        .map(|(c, text)| (c.id.clone(), Value::String(text.clone())))
                        .collect();
                    Value::Object(object)
                })
                .collect();
            let output = json!({
                "columns": columns.iter().map(|c| &c.id).collect::<Vec<_>>(),
                "items": items,
                "offset": view.offset,
                "limit": view.limit,
                "returned": view.returned,
                "total": view.total,
                "durationMs": view.duration_ms,
                "hasNext": page.has_next,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(());
        }
        OutputFormat::Table => {
            if rows.is_empty() {
                println!("No assets found");
            } else {
                let mut builder = tabled::builder::Builder::default();
                builder.push_record(columns.iter().map(|c| c.title.clone()));
                for cells in rows {
                    builder.push_record(cells);
                }
                println!("{}", builder.build());
            }
        }
        OutputFormat::Text => {
            if rows.is_empty() {
                println!("No assets found");
            }
            for cells in &rows {
                for (column, text) in columns.iter().zip(cells) {
                    if !text.is_empty() {
                        println!("  {}: {text}", column.title);
                    }
                }
                println!();
            }
        }
    }

    println!("{}", page.label());
    if page.has_next {
        println!("Next page: --offset {}", page.offset + page.limit);
    }

    Ok(())
}

fn render_rows(
    view: &TableView,
    columns: &[&Column],
    registry: Option<&RegistryData>,
) -> Vec<Vec<String>> {
    view.items
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| c.render(row.get(&c.id), registry).to_string())
                .collect()
        })
        .collect()
}
