use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    nofx_cli::app_init().await?;
    nofx_cli::run().await
}
