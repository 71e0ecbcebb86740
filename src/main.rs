//! # Jenkins Operator
//!
//! Operator binary: initializes the runtime, then runs one controller per
//! kind until a shutdown signal arrives.

use anyhow::Result;
use jenkins_operator::runtime::initialization::initialize;
use jenkins_operator::runtime::watch_loop::run_watch_loop;

#[tokio::main]
async fn main() -> Result<()> {
    let init_result = initialize().await?;

    run_watch_loop(
        init_result.client,
        init_result.engines,
        &init_result.controller_config,
        init_result.server_state,
    )
    .await?;

    Ok(())
}
