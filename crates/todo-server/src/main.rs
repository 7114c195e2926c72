use clap::Parser;
use todo_server::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    todo_server::init_tracing();
    let config = ServerConfig::parse();

    todo_server::run(config).await
}
