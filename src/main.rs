#[tokio::main]
async fn main() -> anyhow::Result<()> {
    browser_harness::cli::app::run().await
}
