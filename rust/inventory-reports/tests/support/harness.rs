use anyhow::Context;
use axum::{
    body::{self, Body},
    http::{self, Request, StatusCode},
    Router,
};
use inventory_reports::{config::AppConfig, server::Server};
use serde_json::Value;
use std::{
    env, fs,
    future::Future,
    path::{Path, PathBuf},
    sync::Once,
};
use tokio::{
    task::JoinHandle,
    time::{sleep, Duration},
};
use tokio_postgres::{Client, Config as PgConfig, NoTls};
use tower::ServiceExt;

const API_KEY: &str = "test-api-key";
const DB_CONNECT_RETRIES: usize = 120;
const DB_CONNECT_DELAY_MS: u64 = 250;
const FIXTURE_LOCK_ID: i64 = 8_490_001;

static TRACING_INIT: Once = Once::new();

/// Runs `test` against a router backed by a freshly seeded fixture database.
/// Skips when `INVENTORY_TEST_DATABASE_URL` is not set.
pub async fn with_inventory_harness<F, Fut>(test: F)
where
    F: FnOnce(InventoryTestHarness) -> Fut,
    Fut: Future<Output = ()>,
{
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt::try_init();
    });

    let database_url = match env::var("INVENTORY_TEST_DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => url,
        _ => {
            eprintln!(
                "[inventory-test] skipping harness: INVENTORY_TEST_DATABASE_URL is not set"
            );
            return;
        }
    };

    let (fixture, _lock_task) = connect(&database_url, "fixture")
        .await
        .expect("failed to reach fixture database");
    fixture
        .execute("SELECT pg_advisory_lock($1)", &[&FIXTURE_LOCK_ID])
        .await
        .expect("failed to take fixture lock");
    seed(&fixture).await.expect("failed to seed fixture database");

    let server = Server::new(test_config(database_url))
        .await
        .expect("failed to boot inventory server for harness");
    let harness = InventoryTestHarness {
        router: server.router(),
        api_key: API_KEY.to_string(),
        fixture,
    };

    test(harness).await;
}

fn test_config(database_url: String) -> AppConfig {
    let mut config = AppConfig::embedded(database_url);
    config.max_pool_size = 4;
    config.api_key = Some(API_KEY.to_string());
    config.default_limit = 2;
    config.taxonomy.servers = vec!["Server-Rack".into(), "Server-Tower".into()];
    config
}

async fn seed(client: &Client) -> anyhow::Result<()> {
    client
        .batch_execute(&load_fixture("schema.sql")?)
        .await
        .context("schema.sql failed")?;
    client
        .batch_execute(&load_fixture("seed.sql")?)
        .await
        .context("seed.sql failed")?;
    Ok(())
}

pub struct InventoryTestHarness {
    router: Router,
    api_key: String,
    fixture: Client,
}

impl InventoryTestHarness {
    pub async fn get(&self, uri: &str) -> http::Response<Body> {
        self.request(uri, true).await
    }

    pub async fn get_without_api_key(&self, uri: &str) -> http::Response<Body> {
        self.request(uri, false).await
    }

    /// Runs extra statements against the fixture before a request.
    pub async fn exec(&self, sql: &str) {
        self.fixture
            .batch_execute(sql)
            .await
            .expect("fixture statement should succeed");
    }

    async fn request(&self, uri: &str, include_api_key: bool) -> http::Response<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if include_api_key {
            builder = builder.header("x-api-key", &self.api_key);
        }
        let request = builder
            .body(Body::empty())
            .expect("failed to build harness request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router should handle harness request")
    }
}

pub async fn read_json(response: http::Response<Body>) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("response body should be readable");
    let value =
        serde_json::from_slice::<Value>(&bytes).expect("response body should be valid JSON");
    (status, value)
}

async fn connect(database_url: &str, label: &str) -> anyhow::Result<(Client, JoinHandle<()>)> {
    let config: PgConfig = database_url
        .parse()
        .context("INVENTORY_TEST_DATABASE_URL is invalid")?;
    let mut attempts = 0usize;
    loop {
        match config.connect(NoTls).await {
            Ok((client, connection)) => {
                let label = label.to_string();
                let task = tokio::spawn(async move {
                    if let Err(err) = connection.await {
                        eprintln!("[inventory-test] {label} connection closed: {err}");
                    }
                });
                return Ok((client, task));
            }
            Err(err) if attempts < DB_CONNECT_RETRIES => {
                attempts += 1;
                if attempts % 20 == 0 {
                    eprintln!("[inventory-test] waiting for database ({attempts}): {err}");
                }
                sleep(Duration::from_millis(DB_CONNECT_DELAY_MS)).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn load_fixture(name: &str) -> anyhow::Result<String> {
    let path = fixture_root().join(name);
    fs::read_to_string(&path).with_context(|| format!("failed to read fixture {}", path.display()))
}

fn fixture_root() -> PathBuf {
    if let Ok(root) = env::var("INVENTORY_FIXTURE_ROOT") {
        let candidate = PathBuf::from(root);
        if candidate.exists() {
            return candidate;
        }
    }
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}
