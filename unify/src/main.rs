use anyhow::Result;

mod cli;
mod hidraw;

#[tokio::main]
async fn main() -> Result<()> {
    cli::execute().await
}
