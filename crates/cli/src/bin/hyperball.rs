use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    hyperball_cli::main_entry().await
}
