use anyhow::Result;
use srcfence::{cli::parse_tree_args, run_tree, utils::init_logger};

#[tokio::main]
async fn main() -> Result<()> {
    let config = parse_tree_args()?;
    init_logger(config.verbosity);
    run_tree(&config).await
}
