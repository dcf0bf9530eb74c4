use crate::error::ServiceError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    env,
    net::{SocketAddr, ToSocketAddrs},
    time::Duration,
};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub database_url: String,
    pub max_pool_size: u32,
    pub pg_ssl_root_cert: Option<String>,
    pub pg_ssl_cert: Option<String>,
    pub pg_ssl_key: Option<String>,
    pub api_key: Option<String>,
    pub default_limit: i64,
    pub max_limit: i64,
    pub request_timeout: Duration,
    pub taxonomy: Taxonomy,
}

/// Category vocabulary the report shapes count against. Values are bound as
/// parameters, so any free-form category string is acceptable here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Taxonomy {
    pub servers: Vec<String>,
    pub desktops: Vec<String>,
    pub laptops: Vec<String>,
    pub workstations: Vec<String>,
    pub delta_v_group: String,
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self {
            servers: vec!["Rack Type Server".into(), "Tower Type Server".into()],
            desktops: vec!["Desktop".into(), "Workstation".into()],
            laptops: vec!["Laptop".into()],
            workstations: vec!["Workstation".into()],
            delta_v_group: "Delta V Hardware".into(),
        }
    }
}

impl Taxonomy {
    /// Desktop-class categories without the workstation overlap, used by the
    /// warranty breakdown where workstations are their own class.
    pub fn desktops_only(&self) -> Vec<String> {
        self.desktops
            .iter()
            .filter(|category| !self.workstations.contains(category))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    inventory_listen_addr: Option<String>,
    #[serde(default)]
    inventory_listen_host: Option<String>,
    #[serde(default)]
    inventory_listen_port: Option<u16>,
    #[serde(default)]
    inventory_database_url: Option<String>,
    #[serde(default)]
    database_url: Option<String>,
    #[serde(default = "default_pool_size")]
    inventory_max_pool_size: u32,
    #[serde(default)]
    pgsslrootcert: Option<String>,
    #[serde(default)]
    pgsslcert: Option<String>,
    #[serde(default)]
    pgsslkey: Option<String>,
    #[serde(default)]
    inventory_api_key: Option<String>,
    #[serde(default = "default_limit")]
    inventory_default_limit: i64,
    #[serde(default = "default_max_limit")]
    inventory_max_limit: i64,
    #[serde(default = "default_timeout_secs")]
    inventory_request_timeout_secs: u64,
    #[serde(default)]
    inventory_server_categories: Option<String>,
    #[serde(default)]
    inventory_desktop_categories: Option<String>,
    #[serde(default)]
    inventory_laptop_categories: Option<String>,
    #[serde(default)]
    inventory_workstation_categories: Option<String>,
    #[serde(default)]
    inventory_delta_v_group: Option<String>,
}

const fn default_pool_size() -> u32 {
    10
}

const fn default_limit() -> i64 {
    100
}

const fn default_max_limit() -> i64 {
    500
}

const fn default_timeout_secs() -> u64 {
    30
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let raw: RawConfig =
            envy::from_env().context("failed to parse INVENTORY_* environment variables")?;

        let listen_addr = resolve_addr(
            raw.inventory_listen_addr,
            raw.inventory_listen_host,
            raw.inventory_listen_port,
        )?;

        let database_url = raw
            .inventory_database_url
            .or(raw.database_url)
            .or_else(|| env::var("DATABASE_URL").ok())
            .context("INVENTORY_DATABASE_URL or DATABASE_URL must be set")?;

        let defaults = Taxonomy::default();
        let taxonomy = Taxonomy {
            servers: category_list(raw.inventory_server_categories).unwrap_or(defaults.servers),
            desktops: category_list(raw.inventory_desktop_categories)
                .unwrap_or(defaults.desktops),
            laptops: category_list(raw.inventory_laptop_categories).unwrap_or(defaults.laptops),
            workstations: category_list(raw.inventory_workstation_categories)
                .unwrap_or(defaults.workstations),
            delta_v_group: raw
                .inventory_delta_v_group
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or(defaults.delta_v_group),
        };

        let config = Self {
            listen_addr,
            database_url,
            max_pool_size: raw.inventory_max_pool_size.max(1),
            pg_ssl_root_cert: raw.pgsslrootcert,
            pg_ssl_cert: raw.pgsslcert,
            pg_ssl_key: raw.pgsslkey,
            api_key: raw.inventory_api_key,
            default_limit: raw.inventory_default_limit.max(1),
            max_limit: raw.inventory_max_limit.max(raw.inventory_default_limit),
            request_timeout: Duration::from_secs(raw.inventory_request_timeout_secs.max(1)),
            taxonomy,
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects combinations the pool or the listing endpoints cannot use.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.pg_ssl_cert.is_some() != self.pg_ssl_key.is_some() {
            return Err(ServiceError::Config(
                "PGSSLCERT and PGSSLKEY must be set together".into(),
            ));
        }
        if self.pg_ssl_cert.is_some() && self.pg_ssl_root_cert.is_none() {
            return Err(ServiceError::Config(
                "PGSSLCERT requires PGSSLROOTCERT".into(),
            ));
        }
        if self.default_limit < 1 || self.max_limit < self.default_limit {
            return Err(ServiceError::Config(format!(
                "listing limits are inconsistent: default {} max {}",
                self.default_limit, self.max_limit
            )));
        }
        Ok(())
    }

    /// Configuration for callers that compose statements without serving HTTP.
    pub fn embedded(database_url: String) -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            database_url,
            max_pool_size: 1,
            pg_ssl_root_cert: None,
            pg_ssl_cert: None,
            pg_ssl_key: None,
            api_key: None,
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            request_timeout: Duration::from_secs(default_timeout_secs()),
            taxonomy: Taxonomy::default(),
        }
    }
}

fn category_list(csv: Option<String>) -> Option<Vec<String>> {
    csv.and_then(|csv| {
        let entries: Vec<_> = csv
            .split(',')
            .filter_map(|part| {
                let entry = part.trim();
                if entry.is_empty() {
                    None
                } else {
                    Some(entry.to_string())
                }
            })
            .collect();
        if entries.is_empty() {
            None
        } else {
            Some(entries)
        }
    })
}

fn resolve_addr(
    addr: Option<String>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<SocketAddr> {
    if let Some(addr) = addr {
        return addr
            .to_socket_addrs()
            .context("invalid INVENTORY_LISTEN_ADDR value")?
            .next()
            .context("INVENTORY_LISTEN_ADDR resolved to no addresses");
    }

    let host = host.unwrap_or_else(|| "0.0.0.0".to_string());
    let port = port.unwrap_or(8490);
    format!("{host}:{port}")
        .to_socket_addrs()
        .context("invalid listen host/port combination")?
        .next()
        .context("listen address resolved to no targets")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_list_trims_and_drops_empty_entries() {
        assert_eq!(
            category_list(Some(" Server-Rack, ,Server-Tower ".into())),
            Some(vec!["Server-Rack".to_string(), "Server-Tower".to_string()])
        );
        assert_eq!(category_list(Some(" , ".into())), None);
        assert_eq!(category_list(None), None);
    }

    #[test]
    fn desktops_only_excludes_workstations() {
        let taxonomy = Taxonomy::default();
        assert_eq!(taxonomy.desktops_only(), vec!["Desktop".to_string()]);
    }

    #[test]
    fn validate_rejects_half_configured_tls_and_bad_limits() {
        let base = AppConfig::embedded("postgres://localhost/inventory".into());
        assert!(base.validate().is_ok());

        let mut cert_only = base.clone();
        cert_only.pg_ssl_root_cert = Some("/etc/ssl/root.pem".into());
        cert_only.pg_ssl_cert = Some("/etc/ssl/client.pem".into());
        assert!(matches!(cert_only.validate(), Err(ServiceError::Config(msg)) if msg.contains("PGSSLKEY")));

        let mut no_root = base.clone();
        no_root.pg_ssl_cert = Some("/etc/ssl/client.pem".into());
        no_root.pg_ssl_key = Some("/etc/ssl/client.key".into());
        assert!(matches!(no_root.validate(), Err(ServiceError::Config(_))));

        let mut limits = base;
        limits.default_limit = 50;
        limits.max_limit = 10;
        assert!(matches!(limits.validate(), Err(ServiceError::Config(_))));
    }

    #[test]
    fn resolve_addr_defaults_to_all_interfaces() {
        let addr = resolve_addr(None, None, None).expect("default address should resolve");
        assert_eq!(addr.port(), 8490);
        let explicit = resolve_addr(Some("127.0.0.1:9000".into()), None, Some(1))
            .expect("explicit address should win");
        assert_eq!(explicit.port(), 9000);
    }
}
