use aws_api_mcp::config::ServerConfig;
use aws_api_mcp::corpus::CorpusIndex;
use aws_api_mcp::embedder::Embedder;
use aws_api_mcp::error::Result;
use aws_api_mcp::mcp_server::AwsMcpServer;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("aws_api_mcp=info")
        .init();

    tracing::info!("Starting aws-api-mcp server...");

    let config = ServerConfig::from_env();

    if let Some(dir) = config.working_directory.as_deref() {
        if !std::path::Path::new(dir).is_absolute() {
            tracing::error!("AWS_API_MCP_WORKING_DIR must be an absolute path");
            std::process::exit(1);
        }
        std::fs::create_dir_all(dir)?;
        std::env::set_current_dir(dir)?;
        tracing::info!("CWD: {}", dir);
    }
    tracing::info!(
        region = %config.default_region,
        read_only = config.access_mode.is_read_only(),
        "loaded configuration"
    );

    let embedder = Embedder::default();
    let corpus = match CorpusIndex::build_builtin(&embedder) {
        Ok(corpus) => corpus,
        Err(e) => {
            // Cannot serve without a corpus.
            tracing::error!("Failed to build command corpus: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(
        commands = corpus.len(),
        version = corpus.version(),
        "command corpus ready"
    );

    let server = AwsMcpServer::new(config, corpus);

    if let Err(e) = server.run().await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
