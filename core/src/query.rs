//! Fluent query builder for the HTTP API.
//!
//! # Design
//! A `Query` is created by [`select`] and then refined with chained calls.
//! [`Query::serialize`] is a pure projection, so the same query can be
//! serialized any number of times; the paginator relies on this when it
//! re-issues a query with a new page number.
//!
//! `Query` is `Clone`. Anything that mutates `page` across requests (the
//! paginator) owns its own copy.

use serde::Serialize;
use serde_json::Value;

use crate::condition::{clean, Expression};
use crate::error::{ConditionError, QueryError};
use crate::schema::Entity;

pub const DEFAULT_FIELD: &str = "id";
pub const DEFAULT_SORT: &str = "id";
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// An attached filter: a typed expression or a raw nested array.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Expr(Expression),
    Raw(Value),
}

impl Filter {
    pub fn to_value(&self) -> Value {
        match self {
            Filter::Expr(expr) => expr.to_filter(),
            Filter::Raw(value) => value.clone(),
        }
    }
}

/// Request body for `POST /kana/<route>`.
#[derive(Debug, Serialize)]
struct Body<'a> {
    filters: Value,
    fields: String,
    sort: &'a str,
    reverse: bool,
    results: u32,
    page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
    count: bool,
    compact_filters: bool,
    normalized_filters: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    route: Option<String>,
    entity: Option<Entity>,
    fields: Vec<String>,
    filter: Option<Filter>,
    sort: String,
    reverse: bool,
    results: u32,
    page: u32,
    user: Option<String>,
    count: bool,
    compact_filters: bool,
    normalized_filters: bool,
}

/// Start a query selecting `fields`. No fields selects just `id`.
pub fn select<I, S>(fields: I) -> Query
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for field in fields {
        let field = clean(field.as_ref());
        if !field.is_empty() && !normalized.contains(&field) {
            normalized.push(field);
        }
    }
    if normalized.is_empty() {
        normalized.push(DEFAULT_FIELD.to_string());
    }
    Query {
        fields: normalized,
        ..Query::default()
    }
}

impl Default for Query {
    fn default() -> Self {
        Self {
            route: None,
            entity: None,
            fields: Vec::new(),
            filter: None,
            sort: DEFAULT_SORT.to_string(),
            reverse: false,
            results: DEFAULT_PAGE_SIZE,
            page: 1,
            user: None,
            count: false,
            compact_filters: false,
            normalized_filters: false,
        }
    }
}

impl Query {
    /// Set the target entity, checked against the registry.
    pub fn from(mut self, route: &str) -> Result<Self, QueryError> {
        let entity: Entity = route.parse()?;
        self.route = Some(entity.route().to_string());
        self.entity = Some(entity);
        Ok(self)
    }

    /// Set a route the registry doesn't know; the server validates it.
    pub fn from_unchecked(mut self, route: &str) -> Result<Self, QueryError> {
        let route = clean(route);
        if route.is_empty() {
            return Err(QueryError::MissingRoute);
        }
        self.entity = route.parse().ok();
        self.route = Some(route);
        Ok(self)
    }

    /// Attach a filter. `None` keeps whatever filter is already set.
    ///
    /// Unchecked: the HTTP API filters on more fields than the registry
    /// lists. Use [`Query::try_filter`] to validate against the entity.
    pub fn filter(mut self, expr: impl Into<Option<Expression>>) -> Self {
        if let Some(expr) = expr.into() {
            self.filter = Some(Filter::Expr(expr));
        }
        self
    }

    /// Attach a filter after checking its fields and operators against the
    /// entity set by [`Query::from`]. Without a known entity nothing is checked.
    pub fn try_filter(self, expr: Expression) -> Result<Self, ConditionError> {
        if let Some(entity) = self.entity {
            entity.check(&expr)?;
        }
        Ok(self.filter(expr))
    }

    /// Attach a raw nested-array filter. `Null` keeps the existing filter.
    pub fn filter_raw(mut self, raw: Value) -> Self {
        if !raw.is_null() {
            self.filter = Some(Filter::Raw(raw));
        }
        self
    }

    /// Set the sort key. `None` is a no-op.
    pub fn sort<S: AsRef<str>>(mut self, key: Option<S>) -> Self {
        if let Some(key) = key {
            let key = clean(key.as_ref());
            if !key.is_empty() {
                self.sort = key;
            }
        }
        self
    }

    /// Overwrite all four output flags at once.
    pub fn set_flags(mut self, reverse: bool, count: bool, compact_filters: bool, normalized_filters: bool) -> Self {
        self.reverse = reverse;
        self.count = count;
        self.compact_filters = compact_filters;
        self.normalized_filters = normalized_filters;
        self
    }

    pub fn page(mut self, page: u32) -> Result<Self, QueryError> {
        self.set_page(page)?;
        Ok(self)
    }

    pub fn results(mut self, results: u32) -> Result<Self, QueryError> {
        self.set_results(results)?;
        Ok(self)
    }

    /// Scope list queries to a user id.
    pub fn user(mut self, user: &str) -> Self {
        let user = user.trim();
        self.user = (!user.is_empty()).then(|| user.to_string());
        self
    }

    pub(crate) fn set_page(&mut self, page: u32) -> Result<(), QueryError> {
        if page == 0 {
            return Err(QueryError::InvalidPage);
        }
        self.page = page;
        Ok(())
    }

    pub(crate) fn set_results(&mut self, results: u32) -> Result<(), QueryError> {
        if results == 0 {
            return Err(QueryError::InvalidPageSize);
        }
        self.results = results;
        Ok(())
    }

    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    pub fn entity(&self) -> Option<Entity> {
        self.entity
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn filter_ref(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn sort_key(&self) -> &str {
        &self.sort
    }

    pub fn is_reversed(&self) -> bool {
        self.reverse
    }

    pub fn page_num(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.results
    }

    /// The wire body. Pure: repeated calls yield identical output.
    pub fn serialize(&self) -> Result<String, QueryError> {
        if self.route.is_none() {
            return Err(QueryError::MissingRoute);
        }
        if self.fields.is_empty() {
            return Err(QueryError::EmptyFields);
        }
        let body = Body {
            filters: self
                .filter
                .as_ref()
                .map(Filter::to_value)
                .unwrap_or_else(|| Value::Array(Vec::new())),
            fields: self.fields.join(", "),
            sort: &self.sort,
            reverse: self.reverse,
            results: self.results,
            page: self.page,
            user: self.user.as_deref(),
            count: self.count,
            compact_filters: self.compact_filters,
            normalized_filters: self.normalized_filters,
        };
        serde_json::to_string(&body).map_err(|e| QueryError::Serialization(e.to_string()))
    }
}
