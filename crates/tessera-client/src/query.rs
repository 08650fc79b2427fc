//! Fetch state, sort/filter serialization and request identity.
//!
//! A filter is sent as one predicate string, `"<columnId> <operator> <value>"`.
//! Multi-valued operators join their values with commas. Conditions whose
//! values cannot be resolved are dropped before the request is built, never
//! sent empty.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tessera_core::{CollectionId, Error, ProviderId, Result, ViewId, to_canonical_string};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

impl SortDirection {
    /// Wire spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// One entry of an ordered multi-column sort.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    /// Column to sort by.
    pub column_id: String,
    /// Direction.
    pub direction: SortDirection,
}

impl SortKey {
    /// Ascending sort on `column_id`.
    #[must_use]
    pub fn asc(column_id: impl Into<String>) -> Self {
        Self {
            column_id: column_id.into(),
            direction: SortDirection::Asc,
        }
    }

    /// Descending sort on `column_id`.
    #[must_use]
    pub fn desc(column_id: impl Into<String>) -> Self {
        Self {
            column_id: column_id.into(),
            direction: SortDirection::Desc,
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.column_id, self.direction.as_str())
    }
}

impl FromStr for SortKey {
    type Err = Error;

    /// Parses `column`, `column:asc` or `column:desc`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (column, direction) = match s.rsplit_once(':') {
            Some((column, "asc")) => (column, SortDirection::Asc),
            Some((column, "desc")) => (column, SortDirection::Desc),
            _ => (s, SortDirection::Asc),
        };
        if column.is_empty() {
            return Err(Error::InvalidInput(format!("invalid sort key '{s}'")));
        }
        Ok(Self {
            column_id: column.to_string(),
            direction,
        })
    }
}

/// Comma-joined sort parameter, in priority order.
#[must_use]
pub fn serialize_sort(sort: &[SortKey]) -> Option<String> {
    if sort.is_empty() {
        return None;
    }
    Some(
        sort.iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// Filter operators understood by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Substring match.
    Contains,
    /// Membership.
    In,
    /// Negated membership.
    NotIn,
    /// Inclusive range.
    Between,
    /// Outside an inclusive range.
    NotBetween,
    /// Missing or blank value.
    Empty,
    /// Present value.
    NotEmpty,
}

enum Arity {
    None,
    One,
    AtLeastOne,
    Pair,
}

impl FilterOperator {
    /// Wire spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Contains => "contains",
            Self::In => "in",
            Self::NotIn => "notIn",
            Self::Between => "between",
            Self::NotBetween => "notBetween",
            Self::Empty => "empty",
            Self::NotEmpty => "notEmpty",
        }
    }

    const fn arity(self) -> Arity {
        match self {
            Self::Empty | Self::NotEmpty => Arity::None,
            Self::In | Self::NotIn => Arity::AtLeastOne,
            Self::Between | Self::NotBetween => Arity::Pair,
            Self::Eq | Self::Ne | Self::Lt | Self::Lte | Self::Gt | Self::Gte | Self::Contains => {
                Arity::One
            }
        }
    }
}

impl FromStr for FilterOperator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "eq" => Self::Eq,
            "ne" => Self::Ne,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "contains" => Self::Contains,
            "in" => Self::In,
            "notIn" => Self::NotIn,
            "between" => Self::Between,
            "notBetween" => Self::NotBetween,
            "empty" => Self::Empty,
            "notEmpty" => Self::NotEmpty,
            other => {
                return Err(Error::InvalidInput(format!(
                    "unknown filter operator '{other}'"
                )));
            }
        })
    }
}

/// A raw filter operand as entered in a filter control.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// Free text.
    Text(String),
    /// Number.
    Number(f64),
    /// Boolean.
    Bool(bool),
    /// Timestamp.
    Date(DateTime<Utc>),
    /// Arbitrary JSON (objects and arrays are sent as compact JSON).
    Json(Value),
}

impl FilterValue {
    /// The normalized wire text, or `None` when there is nothing to send.
    #[must_use]
    pub fn resolve(&self) -> Option<String> {
        match self {
            Self::Text(text) => {
                let trimmed = text.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Self::Number(n) => format_number(*n),
            Self::Bool(b) => Some(b.to_string()),
            Self::Date(dt) => Some(dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Self::Json(value) => match value {
                Value::Null => None,
                Value::String(s) => Self::Text(s.clone()).resolve(),
                Value::Bool(b) => Some(b.to_string()),
                Value::Number(n) => n.as_f64().and_then(format_number),
                Value::Array(_) | Value::Object(_) => Some(value.to_string()),
            },
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for FilterValue {
    #[allow(clippy::cast_precision_loss)]
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<DateTime<Utc>> for FilterValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Date(value)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn format_number(n: f64) -> Option<String> {
    if !n.is_finite() {
        return None;
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        return Some(format!("{}", n as i64));
    }
    Some(n.to_string())
}

/// One active filter.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCondition {
    /// Column the predicate applies to.
    pub column_id: String,
    /// Operator.
    pub operator: FilterOperator,
    /// Operands (ignored for emptiness checks).
    pub values: Vec<FilterValue>,
}

impl FilterCondition {
    /// A condition with explicit operands.
    #[must_use]
    pub fn new(
        column_id: impl Into<String>,
        operator: FilterOperator,
        values: Vec<FilterValue>,
    ) -> Self {
        Self {
            column_id: column_id.into(),
            operator,
            values,
        }
    }

    /// A single-operand condition.
    #[must_use]
    pub fn single(
        column_id: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<FilterValue>,
    ) -> Self {
        Self::new(column_id, operator, vec![value.into()])
    }

    /// The predicate string, or `None` if the condition has no resolvable value.
    #[must_use]
    pub fn serialize(&self) -> Option<String> {
        let column = self.column_id.trim();
        if column.is_empty() {
            return None;
        }
        let op = self.operator.as_str();
        let resolved: Vec<String> = self.values.iter().filter_map(FilterValue::resolve).collect();

        let operand = match self.operator.arity() {
            Arity::None => return Some(format!("{column} {op}")),
            Arity::One => resolved.into_iter().next()?,
            Arity::AtLeastOne if !resolved.is_empty() => resolved.join(","),
            Arity::Pair if resolved.len() == 2 => resolved.join(","),
            Arity::AtLeastOne | Arity::Pair => return None,
        };
        Some(format!("{column} {op} {operand}"))
    }
}

impl FromStr for FilterCondition {
    type Err = Error;

    /// Parses the wire form back into a condition with text operands.
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().splitn(3, ' ');
        let column = parts.next().unwrap_or_default();
        let operator: FilterOperator = parts
            .next()
            .ok_or_else(|| Error::InvalidInput(format!("filter '{s}' has no operator")))?
            .parse()?;
        let rest = parts.next().unwrap_or_default();

        let values = match operator.arity() {
            Arity::None => Vec::new(),
            Arity::One => vec![FilterValue::Text(rest.to_string())],
            Arity::AtLeastOne | Arity::Pair => rest
                .split(',')
                .map(|v| FilterValue::Text(v.to_string()))
                .collect(),
        };
        Ok(Self::new(column, operator, values))
    }
}

/// Active filters keyed by filter id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterModel {
    conditions: BTreeMap<String, FilterCondition>,
}

impl FilterModel {
    /// No filters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a filter.
    pub fn set(&mut self, filter_id: impl Into<String>, condition: FilterCondition) {
        self.conditions.insert(filter_id.into(), condition);
    }

    /// Builder form of [`FilterModel::set`].
    #[must_use]
    pub fn with(mut self, filter_id: impl Into<String>, condition: FilterCondition) -> Self {
        self.set(filter_id, condition);
        self
    }

    /// Removes a filter, returning it.
    pub fn remove(&mut self, filter_id: &str) -> Option<FilterCondition> {
        self.conditions.remove(filter_id)
    }

    /// Number of configured filters (resolvable or not).
    #[must_use]
    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// True when no filters are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// The canonical predicate set: unresolvable filters dropped, sorted, deduplicated.
    #[must_use]
    pub fn serialize(&self) -> Vec<String> {
        self.conditions
            .values()
            .filter_map(FilterCondition::serialize)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// What a table shows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum TableScope {
    /// Assets of a view, optionally limited to one provider.
    View {
        /// View id.
        view_id: ViewId,
        /// Provider restriction.
        provider_id: Option<ProviderId>,
    },
    /// Assets of a collection rendered through a view.
    Collection {
        /// Collection id.
        collection_id: CollectionId,
        /// View id.
        view_id: ViewId,
    },
}

impl TableScope {
    /// Request path of this scope's asset listing.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::View { view_id, .. } => format!("/views/{view_id}/assets"),
            Self::Collection { collection_id, .. } => {
                format!("/collections/{collection_id}/assets")
            }
        }
    }

    /// Span label and id.
    #[must_use]
    pub fn describe(&self) -> (&'static str, String) {
        match self {
            Self::View { view_id, .. } => ("view", view_id.to_string()),
            Self::Collection { collection_id, .. } => ("collection", collection_id.to_string()),
        }
    }
}

/// Whether sort and filter are executed by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSide {
    /// Send the sort parameter.
    pub sort: bool,
    /// Send the filter parameters.
    pub filter: bool,
}

impl Default for ServerSide {
    fn default() -> Self {
        Self {
            sort: true,
            filter: true,
        }
    }
}

/// Pagination, sort, filter and search state of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchState {
    /// First row.
    pub offset: u64,
    /// Page size.
    pub limit: u64,
    /// Ordered sort; empty means server default order.
    pub sort: Vec<SortKey>,
    /// Active filters.
    pub filters: FilterModel,
    /// Committed free-text search.
    pub search: String,
}

impl FetchState {
    /// First page with nothing applied.
    #[must_use]
    pub fn new(limit: u64) -> Self {
        Self {
            offset: 0,
            limit,
            sort: Vec::new(),
            filters: FilterModel::new(),
            search: String::new(),
        }
    }

    /// Builds the normalized request for this state.
    #[must_use]
    pub fn to_request(&self, scope: &TableScope, server_side: ServerSide) -> FetchRequest {
        let search = self.search.trim();
        FetchRequest {
            scope: scope.clone(),
            offset: self.offset,
            limit: self.limit,
            sort: if server_side.sort {
                self.sort.clone()
            } else {
                Vec::new()
            },
            filters: if server_side.filter {
                self.filters.serialize()
            } else {
                Vec::new()
            },
            search: (!search.is_empty()).then(|| search.to_string()),
        }
    }
}

/// Identity of a request: equal keys mean equal queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey(String);

impl RequestKey {
    /// The canonical text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A normalized page request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchRequest {
    /// What is being listed.
    pub scope: TableScope,
    /// First row.
    pub offset: u64,
    /// Page size.
    pub limit: u64,
    /// Sort keys; empty when omitted.
    pub sort: Vec<SortKey>,
    /// Canonical filter predicates.
    pub filters: Vec<String>,
    /// Search text; `None` when blank.
    pub search: Option<String>,
}

impl FetchRequest {
    /// The canonical request key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the request cannot be rendered
    /// canonically.
    pub fn key(&self) -> Result<RequestKey> {
        to_canonical_string(self).map(RequestKey)
    }

    /// Query string parameters in a stable order.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("offset", self.offset.to_string()),
            ("limit", self.limit.to_string()),
        ];
        if let Some(sort) = serialize_sort(&self.sort) {
            pairs.push(("sort", sort));
        }
        for filter in &self.filters {
            pairs.push(("filters[]", filter.clone()));
        }
        if let Some(search) = &self.search {
            pairs.push(("search", search.clone()));
        }
        match &self.scope {
            TableScope::View {
                provider_id: Some(provider_id),
                ..
            } => pairs.push(("provider_id", provider_id.to_string())),
            TableScope::View { .. } => {}
            TableScope::Collection { view_id, .. } => pairs.push(("view_id", view_id.to_string())),
        }
        pairs
    }
}
