use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    stateless_mcp_gateway::cli::run().await
}
