//! wayfinder - UI navigation by graph exploration and grid path solving

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    wayfinder_cli::cli::run().await
}
