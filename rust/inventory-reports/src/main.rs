use inventory_reports::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();
    inventory_reports::run().await
}
