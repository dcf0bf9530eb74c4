//! Pooled PostgreSQL connections, optionally over rustls.

use crate::config::AppConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bb8::{ManageConnection, Pool};
use diesel_async::{AsyncPgConnection, SimpleAsyncConnection};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tokio_postgres::{Config as PgConfig, NoTls};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{info, warn};

pub type PgPool = Pool<PgConnectionManager>;

/// Builds the pool and probes it once. A failed probe is logged but not
/// fatal; the pool keeps retrying on demand.
pub async fn connect_pool(config: &AppConfig) -> Result<PgPool> {
    let tls = TlsFiles {
        root_cert: config.pg_ssl_root_cert.as_deref(),
        client_cert: config.pg_ssl_cert.as_deref(),
        client_key: config.pg_ssl_key.as_deref(),
    };
    let manager = PgConnectionManager::new(&config.database_url, tls)?;
    let pool = Pool::builder()
        .max_size(config.max_pool_size)
        .build(manager)
        .await
        .context("failed to build inventory database pool")?;

    match pool.get().await {
        Ok(_) => info!(max_size = config.max_pool_size, "inventory database reachable"),
        Err(err) => warn!(error = ?err, "inventory database not reachable yet"),
    }

    Ok(pool)
}

struct TlsFiles<'a> {
    root_cert: Option<&'a str>,
    client_cert: Option<&'a str>,
    client_key: Option<&'a str>,
}

#[derive(Clone)]
pub struct PgConnectionManager {
    config: PgConfig,
    tls: Option<MakeRustlsConnect>,
}

impl PgConnectionManager {
    fn new(database_url: &str, files: TlsFiles<'_>) -> Result<Self> {
        let config = database_url
            .parse::<PgConfig>()
            .context("INVENTORY_DATABASE_URL is not a valid connection string")?;
        let tls = files
            .root_cert
            .map(|root| tls_connector(root, files.client_cert, files.client_key))
            .transpose()?;
        Ok(Self { config, tls })
    }
}

#[async_trait]
impl ManageConnection for PgConnectionManager {
    type Connection = AsyncPgConnection;
    type Error = anyhow::Error;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let conn = match &self.tls {
            None => {
                let (client, connection) = self.config.connect(NoTls).await?;
                AsyncPgConnection::try_from_client_and_connection(client, connection).await
            }
            Some(connector) => {
                let (client, connection) = self.config.connect(connector.clone()).await?;
                AsyncPgConnection::try_from_client_and_connection(client, connection).await
            }
        };
        conn.map_err(|err| anyhow::anyhow!(err))
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.batch_execute("SELECT 1").await?;
        Ok(())
    }

    fn has_broken(&self, _: &mut Self::Connection) -> bool {
        false
    }
}

fn tls_connector(
    root_cert: &str,
    client_cert: Option<&str>,
    client_key: Option<&str>,
) -> Result<MakeRustlsConnect> {
    let mut roots = RootCertStore::empty();
    for cert in read_certs(Path::new(root_cert), "PGSSLROOTCERT")? {
        roots
            .add(cert)
            .map_err(|err| anyhow::anyhow!("PGSSLROOTCERT holds an unusable certificate: {err}"))?;
    }

    let builder = ClientConfig::builder().with_root_certificates(roots);
    let client = match (client_cert, client_key) {
        (None, None) => builder.with_no_client_auth(),
        (Some(cert), Some(key)) => builder
            .with_client_auth_cert(
                read_certs(Path::new(cert), "PGSSLCERT")?,
                read_key(Path::new(key))?,
            )
            .context("PGSSLCERT/PGSSLKEY do not form a usable client identity")?,
        _ => anyhow::bail!("PGSSLCERT and PGSSLKEY must be set together"),
    };

    Ok(MakeRustlsConnect::new(client))
}

fn read_certs(path: &Path, var: &str) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).with_context(|| format!("cannot open {var} at {}", path.display()))?;
    let chain = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("{var} is not valid PEM"))?;
    if chain.is_empty() {
        anyhow::bail!("{var} contained no certificates");
    }
    Ok(chain)
}

fn read_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file =
        File::open(path).with_context(|| format!("cannot open PGSSLKEY at {}", path.display()))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .context("PGSSLKEY is not valid PEM")?
        .context("PGSSLKEY contained no private key")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unparseable_database_url() {
        let files = TlsFiles {
            root_cert: None,
            client_cert: None,
            client_key: None,
        };
        let url = "postgres://inventory@localhost:notaport/assets";
        assert!(PgConnectionManager::new(url, files).is_err());
    }

    #[test]
    fn missing_root_cert_file_is_reported() {
        let err = tls_connector("/nonexistent/root.pem", None, None)
            .err()
            .expect("missing file must fail");
        assert!(err.to_string().contains("PGSSLROOTCERT"), "{err}");
    }
}
