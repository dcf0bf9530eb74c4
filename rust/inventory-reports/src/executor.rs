//! Statement execution against the store.

use crate::{
    compose::{BindValue, ComposedQuery},
    db::PgPool,
    error::{Result, ServiceError},
};
use async_trait::async_trait;
use diesel::deserialize::QueryableByName;
use diesel::pg::Pg;
use diesel::query_builder::{BoxedSqlQuery, SqlQuery};
use diesel::sql_query;
use diesel::sql_types::{Array, Int8, Jsonb, Nullable, Text};
use diesel_async::RunQueryDsl;
use serde_json::{Map, Value};
use tracing::error;

/// One result row keyed by output column name.
pub type Row = Map<String, Value>;

/// Runs composed statements. Implementations must bind `params` in order and
/// never splice them into the statement text.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn fetch_rows(&self, query: &ComposedQuery) -> Result<Vec<Row>>;
}

#[derive(Debug, QueryableByName)]
struct RowPayload {
    #[diesel(sql_type = Nullable<Jsonb>)]
    payload: Option<Value>,
}

#[derive(Clone)]
pub struct PgExecutor {
    pool: PgPool,
}

impl PgExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueryExecutor for PgExecutor {
    async fn fetch_rows(&self, query: &ComposedQuery) -> Result<Vec<Row>> {
        let mut conn = self.pool.get().await.map_err(|err| {
            error!(error = ?err, template = query.template, "failed to acquire database connection");
            ServiceError::execution(
                format!("{}: connection unavailable", query.template),
                anyhow::anyhow!("{err:?}"),
            )
        })?;

        let mut statement = sql_query(wrap_statement(query)).into_boxed::<Pg>();
        for param in &query.params {
            statement = bind_value(statement, param);
        }

        let rows: Vec<RowPayload> = statement.load(&mut *conn).await.map_err(|err| {
            error!(
                error = ?err,
                template = query.template,
                sql = %query.sql,
                binds = ?query.params,
                "report query failed"
            );
            ServiceError::execution(query.template, err)
        })?;

        rows.into_iter()
            .map(|row| match row.payload {
                Some(Value::Object(map)) => Ok(map),
                other => Err(ServiceError::Internal(anyhow::anyhow!(
                    "{} returned a non-object row: {other:?}",
                    query.template
                ))),
            })
            .collect()
    }
}

/// Each row comes back as one JSON object so column names survive as keys.
/// The subquery's ORDER BY does not carry through, so it is re-applied.
fn wrap_statement(query: &ComposedQuery) -> String {
    let mut wrapped = format!("SELECT to_jsonb(q) AS payload FROM ({}) q", query.sql);
    if let Some(order) = query.result_order {
        wrapped.push_str(" ORDER BY ");
        wrapped.push_str(order);
    }
    wrapped
}

fn bind_value<'f>(
    query: BoxedSqlQuery<'f, Pg, SqlQuery>,
    value: &BindValue,
) -> BoxedSqlQuery<'f, Pg, SqlQuery> {
    match value {
        BindValue::Text(value) => query.bind::<Text, _>(value.clone()),
        BindValue::TextArray(values) => query.bind::<Array<Text>, _>(values.clone()),
        BindValue::Int(value) => query.bind::<Int8, _>(*value),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compose::compose, filter::PredicateSet, reports::templates};

    #[test]
    fn wrapper_reapplies_listing_order() {
        let composed = compose(&templates::license_listing(), &PredicateSet::new())
            .expect("license listing composes");
        let wrapped = wrap_statement(&composed);
        assert!(wrapped.starts_with("SELECT to_jsonb(q) AS payload FROM (SELECT"), "{wrapped}");
        assert!(wrapped.ends_with(") q ORDER BY id DESC"), "{wrapped}");
    }

    #[test]
    fn wrapper_without_order_is_left_alone() {
        let composed = ComposedQuery {
            template: "adhoc",
            sql: "SELECT 1 AS one".into(),
            params: Vec::new(),
            result_order: None,
        };
        assert_eq!(
            wrap_statement(&composed),
            "SELECT to_jsonb(q) AS payload FROM (SELECT 1 AS one) q"
        );
    }
}
