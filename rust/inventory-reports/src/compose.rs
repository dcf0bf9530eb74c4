//! Statement composition for templated, filterable SELECTs.
//!
//! A [`Template`] declares the statement skeleton: select items (optionally
//! conditional counts), the base relation, an optional LEFT JOIN, base WHERE
//! conditions, grouping and ordering. It also marks *dimension-aware slots*,
//! the places where an active dimension criterion must be ANDed in.
//!
//! [`compose`] lowers a template plus a [`PredicateSet`] into a list of
//! pieces (literal SQL or a reference to a bound value). Placeholder numbers
//! are only assigned when that list is rendered, in a single pass and in
//! textual order, so the `$n` sequence is monotonic and always agrees with
//! the parameter vector.

use crate::{
    error::{Result, ServiceError},
    filter::{CriterionKind, CriterionScope, FilterCriterion, PredicateSet},
};
use serde::Serialize;
use tracing::debug;

/// A bound parameter value. Serialized the same way for statement previews.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum BindValue {
    Text(String),
    TextArray(Vec<String>),
    Int(i64),
}

/// Column identifier, optionally qualified by a relation alias. Rendered as
/// `alias."Name"`; names only ever come from template declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnRef {
    qualifier: Option<&'static str>,
    name: &'static str,
}

impl ColumnRef {
    pub const fn new(name: &'static str) -> Self {
        Self {
            qualifier: None,
            name,
        }
    }

    pub const fn qualified(qualifier: &'static str, name: &'static str) -> Self {
        Self {
            qualifier: Some(qualifier),
            name,
        }
    }

    fn with_qualifier(self, qualifier: Option<&'static str>) -> Self {
        Self { qualifier, ..self }
    }

    fn render(&self) -> String {
        let ident = quote_ident(self.name);
        match self.qualifier {
            Some(qualifier) => format!("{qualifier}.{ident}"),
            None => ident,
        }
    }
}

fn quote_ident(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Boolean condition over template columns. Every runtime value is bound.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(ColumnRef, BindValue),
    /// `column = ANY($n)`; an empty set never matches.
    AnyOf(ColumnRef, Vec<String>),
    IsNull(ColumnRef),
    IsNotNull(ColumnRef),
    /// `column <op> <expr>` against a fixed SQL expression such as `NOW()`.
    Compare(ColumnRef, &'static str, &'static str),
    /// Trusted static SQL declared by a template.
    Sql(&'static str),
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// A bare quoted column; the output key keeps its case.
    Column(&'static str),
    /// `<expr> AS <alias>` with no bound values.
    Expr {
        expr: &'static str,
        alias: &'static str,
    },
    /// `COUNT(<target>) [FILTER (WHERE ...)] AS <alias>`.
    Count(CountSpec),
}

/// A conditional aggregate: a count restricted by a base condition and,
/// when `dimension_aware`, by the active dimension criterion.
#[derive(Debug, Clone, PartialEq)]
pub struct CountSpec {
    pub alias: &'static str,
    pub target: &'static str,
    pub condition: Option<Condition>,
    pub dimension_aware: bool,
    pub coalesce: bool,
}

impl CountSpec {
    pub fn new(alias: &'static str, target: &'static str) -> Self {
        Self {
            alias,
            target,
            condition: None,
            dimension_aware: false,
            coalesce: false,
        }
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn dimension_aware(mut self) -> Self {
        self.dimension_aware = true;
        self
    }

    pub fn coalesced(mut self) -> Self {
        self.coalesce = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub relation: &'static str,
    pub on: Vec<Condition>,
    pub dimension_aware: bool,
}

/// Where row criteria (search, equality, membership) are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFilterSlot {
    Where,
    /// Into the LEFT JOIN condition, so skeleton rows survive filtering.
    Join,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub name: &'static str,
    pub select: Vec<SelectItem>,
    pub from: &'static str,
    pub join: Option<Join>,
    pub filters: Vec<Condition>,
    pub where_dimension_aware: bool,
    pub row_filter_slot: RowFilterSlot,
    /// Alias used when rendering criterion columns.
    pub row_qualifier: Option<&'static str>,
    pub group_by: Option<&'static str>,
    pub order_by: Option<&'static str>,
    /// The same ordering expressed over output columns, for callers that
    /// wrap the statement in an outer query.
    pub result_order: Option<&'static str>,
    pub paging: Option<Paging>,
    /// Columns criteria may reference.
    pub allowed_columns: &'static [&'static str],
    pub dimension_column: Option<&'static str>,
}

impl Template {
    pub fn new(name: &'static str, from: &'static str) -> Self {
        Self {
            name,
            select: Vec::new(),
            from,
            join: None,
            filters: Vec::new(),
            where_dimension_aware: false,
            row_filter_slot: RowFilterSlot::Where,
            row_qualifier: None,
            group_by: None,
            order_by: None,
            result_order: None,
            paging: None,
            allowed_columns: &[],
            dimension_column: None,
        }
    }

    /// Number of places an active dimension criterion is injected.
    pub fn dimension_slot_count(&self) -> usize {
        let counts = self
            .select
            .iter()
            .filter(|item| matches!(item, SelectItem::Count(spec) if spec.dimension_aware))
            .count();
        let join = usize::from(self.join.as_ref().is_some_and(|join| join.dimension_aware));
        counts + join + usize::from(self.where_dimension_aware)
    }

    /// Output column names in select order.
    pub fn output_columns(&self) -> Vec<&'static str> {
        self.select
            .iter()
            .map(|item| match item {
                SelectItem::Column(name) => *name,
                SelectItem::Expr { alias, .. } => *alias,
                SelectItem::Count(spec) => spec.alias,
            })
            .collect()
    }

    fn allowed_column(&self, column: &str) -> Option<&'static str> {
        self.allowed_columns
            .iter()
            .copied()
            .find(|allowed| *allowed == column)
    }
}

/// A rendered statement: SQL text plus parameters in placeholder order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComposedQuery {
    #[serde(skip)]
    pub template: &'static str,
    pub sql: String,
    pub params: Vec<BindValue>,
    #[serde(skip)]
    pub result_order: Option<&'static str>,
}

/// Composes `template` with `predicates`.
///
/// Validation happens before any SQL text is produced: an unknown column or a
/// dimension criterion on a template without a dimension column fails with
/// [`ServiceError::InvalidFilter`].
pub fn compose(template: &Template, predicates: &PredicateSet) -> Result<ComposedQuery> {
    let resolved = validate(template, predicates)?;

    let mut stmt = StatementBuilder::default();
    let dimension = resolved.dimension.as_ref();

    stmt.sql("SELECT ");
    for (idx, item) in template.select.iter().enumerate() {
        if idx > 0 {
            stmt.sql(", ");
        }
        match item {
            SelectItem::Column(name) => stmt.sql(quote_ident(name)),
            SelectItem::Expr { expr, alias } => stmt.sql(format!("{expr} AS {alias}")),
            SelectItem::Count(spec) => push_count(&mut stmt, spec, dimension),
        }
    }

    stmt.sql("\nFROM ");
    stmt.sql(template.from);

    if let Some(join) = &template.join {
        stmt.sql("\nLEFT JOIN ");
        stmt.sql(join.relation);
        stmt.sql(" ON ");
        let mut first = true;
        for condition in &join.on {
            push_conjunct(&mut stmt, &mut first, |stmt| push_condition(stmt, condition));
        }
        if join.dimension_aware {
            if let Some(dimension) = dimension {
                push_conjunct(&mut stmt, &mut first, |stmt| push_dimension(stmt, dimension));
            }
        }
        if template.row_filter_slot == RowFilterSlot::Join {
            for criterion in &resolved.rows {
                push_conjunct(&mut stmt, &mut first, |stmt| push_criterion(stmt, criterion));
            }
        }
        if first {
            stmt.sql("TRUE");
        }
    }

    let mut first = true;
    for condition in &template.filters {
        open_where(&mut stmt, &mut first);
        push_condition(&mut stmt, condition);
    }
    if template.where_dimension_aware {
        if let Some(dimension) = dimension {
            open_where(&mut stmt, &mut first);
            push_dimension(&mut stmt, dimension);
        }
    }
    if template.row_filter_slot == RowFilterSlot::Where {
        for criterion in &resolved.rows {
            open_where(&mut stmt, &mut first);
            push_criterion(&mut stmt, criterion);
        }
    }

    if let Some(group_by) = template.group_by {
        stmt.sql("\nGROUP BY ");
        stmt.sql(group_by);
    }
    if let Some(order_by) = template.order_by {
        stmt.sql("\nORDER BY ");
        stmt.sql(order_by);
    }
    if let Some(Paging { limit, offset }) = template.paging {
        stmt.sql("\nLIMIT ");
        stmt.push_bind(BindValue::Int(limit));
        stmt.sql(" OFFSET ");
        stmt.push_bind(BindValue::Int(offset));
    }

    let composed = stmt.finish(template.name, template.result_order)?;
    debug!(
        template = template.name,
        sql = %composed.sql,
        params = ?composed.params,
        "composed statement"
    );
    Ok(composed)
}

/// Criteria after allow-list resolution; columns now carry template-owned
/// identifiers and qualifiers.
struct ResolvedPredicates {
    dimension: Option<ResolvedCriterion>,
    rows: Vec<ResolvedCriterion>,
}

struct ResolvedCriterion {
    kind: CriterionKind,
    columns: Vec<ColumnRef>,
    values: Vec<String>,
}

fn validate(template: &Template, predicates: &PredicateSet) -> Result<ResolvedPredicates> {
    let dimension = match predicates.dimension() {
        Some(criterion) => {
            let Some(column) = template.dimension_column else {
                return Err(ServiceError::InvalidFilter(format!(
                    "template '{}' does not accept a dimension filter",
                    template.name
                )));
            };
            if criterion.columns() != [column] {
                return Err(ServiceError::InvalidFilter(format!(
                    "dimension filter must target '{column}' for template '{}'",
                    template.name
                )));
            }
            Some(resolve(template, criterion)?)
        }
        None => None,
    };

    let rows = predicates
        .row_criteria()
        .iter()
        .map(|criterion| resolve(template, criterion))
        .collect::<Result<Vec<_>>>()?;

    Ok(ResolvedPredicates { dimension, rows })
}

fn resolve(template: &Template, criterion: &FilterCriterion) -> Result<ResolvedCriterion> {
    let dimension_column = template
        .dimension_column
        .filter(|_| criterion.scope() == CriterionScope::Dimension);

    let columns = criterion
        .columns()
        .iter()
        .map(|column| {
            dimension_column
                .filter(|dimension| *dimension == column)
                .or_else(|| template.allowed_column(column))
                .map(|name| ColumnRef::new(name).with_qualifier(template.row_qualifier))
                .ok_or_else(|| {
                    ServiceError::InvalidFilter(format!(
                        "column '{column}' is not filterable for template '{}'",
                        template.name
                    ))
                })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ResolvedCriterion {
        kind: criterion.kind(),
        columns,
        values: criterion.values().to_vec(),
    })
}

fn open_where(stmt: &mut StatementBuilder, first: &mut bool) {
    if *first {
        stmt.sql("\nWHERE ");
    }
    push_conjunct(stmt, first, |_| {});
}

fn push_conjunct(
    stmt: &mut StatementBuilder,
    first: &mut bool,
    emit: impl FnOnce(&mut StatementBuilder),
) {
    if !*first {
        stmt.sql(" AND ");
    }
    *first = false;
    emit(stmt);
}

fn push_count(stmt: &mut StatementBuilder, spec: &CountSpec, dimension: Option<&ResolvedCriterion>) {
    let dimension = dimension.filter(|_| spec.dimension_aware);
    if spec.coalesce {
        stmt.sql("COALESCE(");
    }
    stmt.sql(format!("COUNT({})", spec.target));
    if spec.condition.is_some() || dimension.is_some() {
        stmt.sql(" FILTER (WHERE ");
        let mut first = true;
        if let Some(condition) = &spec.condition {
            push_conjunct(stmt, &mut first, |stmt| push_condition(stmt, condition));
        }
        if let Some(dimension) = dimension {
            push_conjunct(stmt, &mut first, |stmt| push_dimension(stmt, dimension));
        }
        stmt.sql(")");
    }
    if spec.coalesce {
        stmt.sql(", 0)");
    }
    stmt.sql(format!(" AS {}", spec.alias));
}

/// Each occurrence binds its own copy of the dimension value.
fn push_dimension(stmt: &mut StatementBuilder, dimension: &ResolvedCriterion) {
    push_criterion(stmt, dimension);
}

fn push_criterion(stmt: &mut StatementBuilder, criterion: &ResolvedCriterion) {
    match criterion.kind {
        CriterionKind::Equality => {
            let column = criterion.columns.first().map(ColumnRef::render).unwrap_or_default();
            stmt.sql(format!("{column} = "));
            stmt.push_bind(BindValue::Text(
                criterion.values.first().cloned().unwrap_or_default(),
            ));
        }
        CriterionKind::PatternMatch => {
            let term = criterion.values.first().cloned().unwrap_or_default();
            let shared = stmt.bind(BindValue::Text(format!("%{term}%")));
            stmt.sql("(");
            for (idx, column) in criterion.columns.iter().enumerate() {
                if idx > 0 {
                    stmt.sql(" OR ");
                }
                stmt.sql(format!("{} ILIKE ", column.render()));
                stmt.param(shared);
            }
            stmt.sql(")");
        }
        CriterionKind::SetMembership => {
            let column = criterion.columns.first().map(ColumnRef::render).unwrap_or_default();
            stmt.sql(format!("{column} = ANY("));
            stmt.push_bind(BindValue::TextArray(criterion.values.clone()));
            stmt.sql(")");
        }
    }
}

fn push_condition(stmt: &mut StatementBuilder, condition: &Condition) {
    match condition {
        Condition::Eq(column, value) => {
            stmt.sql(format!("{} = ", column.render()));
            stmt.push_bind(value.clone());
        }
        Condition::AnyOf(column, values) => {
            stmt.sql(format!("{} = ANY(", column.render()));
            stmt.push_bind(BindValue::TextArray(values.clone()));
            stmt.sql(")");
        }
        Condition::IsNull(column) => stmt.sql(format!("{} IS NULL", column.render())),
        Condition::IsNotNull(column) => stmt.sql(format!("{} IS NOT NULL", column.render())),
        Condition::Compare(column, op, expr) => {
            stmt.sql(format!("{} {op} {expr}", column.render()))
        }
        Condition::Sql(sql) => stmt.sql(*sql),
        Condition::And(parts) => {
            if parts.is_empty() {
                stmt.sql("TRUE");
                return;
            }
            let mut first = true;
            for part in parts {
                push_conjunct(stmt, &mut first, |stmt| push_condition(stmt, part));
            }
        }
        Condition::Or(parts) => {
            if parts.is_empty() {
                stmt.sql("FALSE");
                return;
            }
            stmt.sql("(");
            for (idx, part) in parts.iter().enumerate() {
                if idx > 0 {
                    stmt.sql(" OR ");
                }
                push_condition(stmt, part);
            }
            stmt.sql(")");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ParamRef(usize);

#[derive(Debug)]
enum Piece {
    Sql(String),
    Param(ParamRef),
}

#[derive(Debug, Default)]
struct StatementBuilder {
    pieces: Vec<Piece>,
    values: Vec<BindValue>,
}

impl StatementBuilder {
    fn sql(&mut self, text: impl Into<String>) {
        self.pieces.push(Piece::Sql(text.into()));
    }

    /// Registers a value without emitting it.
    fn bind(&mut self, value: BindValue) -> ParamRef {
        self.values.push(value);
        ParamRef(self.values.len() - 1)
    }

    fn param(&mut self, param: ParamRef) {
        self.pieces.push(Piece::Param(param));
    }

    fn push_bind(&mut self, value: BindValue) {
        let param = self.bind(value);
        self.param(param);
    }

    /// Renders pieces, numbering each distinct parameter at its first
    /// textual occurrence.
    fn finish(
        self,
        template: &'static str,
        result_order: Option<&'static str>,
    ) -> Result<ComposedQuery> {
        let mut sql = String::new();
        let mut assigned: Vec<Option<usize>> = vec![None; self.values.len()];
        let mut params = Vec::with_capacity(self.values.len());

        for piece in self.pieces {
            match piece {
                Piece::Sql(text) => sql.push_str(&text),
                Piece::Param(ParamRef(id)) => {
                    let slot = assigned.get_mut(id).ok_or_else(|| {
                        ServiceError::Internal(anyhow::anyhow!("unknown parameter reference {id}"))
                    })?;
                    let index = match *slot {
                        Some(index) => index,
                        None => {
                            params.push(self.values[id].clone());
                            let index = params.len();
                            *slot = Some(index);
                            index
                        }
                    };
                    sql.push('$');
                    sql.push_str(&index.to_string());
                }
            }
        }

        if params.len() != self.values.len() {
            return Err(ServiceError::Internal(anyhow::anyhow!(
                "{} bound values were never referenced in '{template}'",
                self.values.len() - params.len()
            )));
        }

        #[cfg(any(test, debug_assertions))]
        {
            let expected = max_dollar_placeholder(&sql);
            if expected != params.len() {
                return Err(ServiceError::Internal(anyhow::anyhow!(
                    "sql expects {expected} binds but {} were collected",
                    params.len()
                )));
            }
        }

        Ok(ComposedQuery {
            template,
            sql,
            params,
            result_order,
        })
    }
}

pub(crate) fn max_dollar_placeholder(sql: &str) -> usize {
    placeholder_indices(sql).into_iter().max().unwrap_or(0)
}

/// Every `$n` in textual order.
pub(crate) fn placeholder_indices(sql: &str) -> Vec<usize> {
    let bytes = sql.as_bytes();
    let mut found = Vec::new();
    let mut i = 0usize;

    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }

        i += 1;
        if i >= bytes.len() || !bytes[i].is_ascii_digit() {
            continue;
        }

        let mut value = 0usize;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            value = value * 10 + (bytes[i] - b'0') as usize;
            i += 1;
        }
        found.push(value);
    }

    found
}
