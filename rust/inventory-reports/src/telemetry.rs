use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: OnceCell<()> = OnceCell::new();

/// Installs the global subscriber once; `RUST_LOG` overrides the `info`
/// default.
pub fn init_tracing() {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,inventory_reports=info"));
        if fmt().with_env_filter(filter).with_target(false).try_init().is_err() {
            eprintln!("tracing subscriber already installed");
        }
    });
}
