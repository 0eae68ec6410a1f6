use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    stride_cli::run_app().await
}
