use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_postgres::types::{FromSqlOwned, ToSql};
use tokio_postgres::{Client, NoTls, Row};

use super::template::{QueryParam, QueryTemplate, ResultRow, RowHandler};
use crate::errors::{BinderError, BinderResult};
use crate::internals::ClientFactory;

/// Opens connections to a Postgres database.
#[derive(Debug, Clone)]
pub struct PostgresConnector {
    url: String,
}

impl PostgresConnector {
    /// Create a new [`PostgresConnector`]
    ///
    /// # Arguments
    ///
    /// * `url` - Connection string, either as `key=value` pairs or as a `postgresql://` URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
        }
    }
}

#[async_trait]
impl ClientFactory for PostgresConnector {
    type Client = Client;

    async fn open_client(&self) -> BinderResult<Self::Client> {
        let (client, connection) =
            tokio_postgres::connect(&self.url, NoTls).await.map_err(|e| BinderError::Connection(e.to_string()))?;

        // The connection performs the actual communication with the database:
        // it runs in its own task until the client is dropped
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("Postgres connection terminated: {e}");
            }
        });

        debug!("Connected to Postgres");
        Ok(client)
    }
}

/// [`QueryTemplate`] over a single Postgres connection, shared by all the binders using it.
///
/// The connection is opened on first use, and opened again if it gets closed.
pub struct PostgresTemplate<F> {
    factory: F,
    client: Mutex<Option<Arc<Client>>>,
}

impl<F: ClientFactory<Client = Client>> PostgresTemplate<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            client: Mutex::new(None),
        }
    }

    async fn client(&self) -> BinderResult<Arc<Client>> {
        let mut guard = self.client.lock().await;

        if let Some(client) = guard.as_ref().filter(|c| !c.is_closed()) {
            return Ok(client.clone());
        }

        let client = Arc::new(self.factory.open_client().await?);
        *guard = Some(client.clone());
        Ok(client)
    }
}

#[async_trait]
impl<F: ClientFactory<Client = Client>> QueryTemplate for PostgresTemplate<F> {
    async fn query(&self, sql: &str, params: &[QueryParam], handler: &mut RowHandler<'_>) -> BinderResult<()> {
        let client = self.client().await?;

        let sql_params: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| match p {
                QueryParam::Text(s) => s as &(dyn ToSql + Sync),
                QueryParam::Int(i) => i as &(dyn ToSql + Sync),
            })
            .collect();

        let rows = client.query(sql, &sql_params).await.map_err(|e| BinderError::call("query", e))?;
        trace!("Query returned {} rows", rows.len());

        for row in &rows {
            handler(&PgRow(row))?;
        }
        Ok(())
    }
}

struct PgRow<'a>(&'a Row);

impl PgRow<'_> {
    fn get<T: FromSqlOwned>(&self, column: &str) -> BinderResult<Option<T>> {
        self.0.try_get::<_, Option<T>>(column).map_err(|e| BinderError::Mapping(format!("column '{column}': {e}")))
    }
}

impl ResultRow for PgRow<'_> {
    fn get_string(&self, column: &str) -> BinderResult<Option<String>> {
        self.get(column)
    }

    fn get_i64(&self, column: &str) -> BinderResult<Option<i64>> {
        self.get(column)
    }

    fn get_bool(&self, column: &str) -> BinderResult<Option<bool>> {
        self.get(column)
    }

    fn get_timestamp_millis(&self, column: &str) -> BinderResult<Option<i64>> {
        Ok(self.get::<DateTime<Utc>>(column)?.map(|ts| ts.timestamp_millis()))
    }
}
