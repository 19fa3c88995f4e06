use anyhow::Result;
use srcfence::{Preset, run_combine_cli};

#[tokio::main]
async fn main() -> Result<()> {
    run_combine_cli(Preset::TypeScript).await
}
