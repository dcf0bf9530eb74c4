//! Optional filter criteria and their ordered collection.
//!
//! Raw request inputs are normalized here: an absent, empty or whitespace-only
//! value never produces a criterion, so "not supplied" can never turn into
//! "match nothing" further down the pipeline.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionKind {
    /// `column = $n`
    Equality,
    /// `(c1 ILIKE $n OR c2 ILIKE $n ...)` sharing one `%term%` parameter.
    PatternMatch,
    /// `column = ANY($n)` bound to a text array.
    SetMembership,
}

/// Where a criterion is emitted by the composer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionScope {
    /// Injected into every dimension-aware slot of a template, with a fresh
    /// placeholder per occurrence.
    Dimension,
    /// Emitted once into the template's row-filter slot.
    Row,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterCriterion {
    name: String,
    kind: CriterionKind,
    scope: CriterionScope,
    columns: Vec<String>,
    values: Vec<String>,
}

impl FilterCriterion {
    /// Equality restriction on the dimension column (release train).
    pub fn dimension(column: impl Into<String>, value: Option<&str>) -> Option<Self> {
        let value = normalize(value)?;
        let column = column.into();
        Some(Self {
            name: column.clone(),
            kind: CriterionKind::Equality,
            scope: CriterionScope::Dimension,
            columns: vec![column],
            values: vec![value],
        })
    }

    pub fn equality(column: impl Into<String>, value: Option<&str>) -> Option<Self> {
        let value = normalize(value)?;
        let column = column.into();
        Some(Self {
            name: column.clone(),
            kind: CriterionKind::Equality,
            scope: CriterionScope::Row,
            columns: vec![column],
            values: vec![value],
        })
    }

    /// Free-text search across `columns`. The stored value is the raw term;
    /// the composer wraps it as `%term%`.
    pub fn search<I, S>(columns: I, term: Option<&str>) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let term = normalize(term)?;
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.is_empty() {
            return None;
        }
        Some(Self {
            name: "search".to_string(),
            kind: CriterionKind::PatternMatch,
            scope: CriterionScope::Row,
            columns,
            values: vec![term],
        })
    }

    pub fn membership<I, S>(column: impl Into<String>, values: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for value in values {
            if let Some(value) = normalize(Some(value.as_ref())) {
                if !normalized.contains(&value) {
                    normalized.push(value);
                }
            }
        }
        if normalized.is_empty() {
            return None;
        }
        let column = column.into();
        Some(Self {
            name: column.clone(),
            kind: CriterionKind::SetMembership,
            scope: CriterionScope::Row,
            columns: vec![column],
            values: normalized,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CriterionKind {
        self.kind
    }

    pub fn scope(&self) -> CriterionScope {
        self.scope
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// First bound value; every constructor guarantees at least one.
    pub fn value(&self) -> &str {
        self.values.first().map(String::as_str).unwrap_or_default()
    }
}

fn normalize(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Applied criteria in SQL emission order. Holds at most one dimension
/// criterion; row criteria keep insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PredicateSet {
    dimension: Option<FilterCriterion>,
    criteria: Vec<FilterCriterion>,
}

impl PredicateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a criterion. `None` (an unapplied input) is ignored, and a second
    /// dimension criterion replaces the first.
    pub fn with(mut self, criterion: Option<FilterCriterion>) -> Self {
        self.push(criterion);
        self
    }

    pub fn push(&mut self, criterion: Option<FilterCriterion>) {
        let Some(criterion) = criterion else {
            return;
        };
        match criterion.scope {
            CriterionScope::Dimension => self.dimension = Some(criterion),
            CriterionScope::Row => self.criteria.push(criterion),
        }
    }

    pub fn dimension(&self) -> Option<&FilterCriterion> {
        self.dimension.as_ref()
    }

    pub fn row_criteria(&self) -> &[FilterCriterion] {
        &self.criteria
    }

    /// Every applied criterion, dimension first.
    pub fn iter(&self) -> impl Iterator<Item = &FilterCriterion> {
        self.dimension.iter().chain(self.criteria.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.dimension.is_none() && self.criteria.is_empty()
    }
}
