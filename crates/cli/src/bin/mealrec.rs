use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    mealrec_cli::main_entry().await
}
