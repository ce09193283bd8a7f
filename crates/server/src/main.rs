mod api;
mod router;
mod state;

use std::sync::Arc;

use tracing::info;

use nl2sql_agent::Text2SqlRunner;

fn load_config() -> nl2sql_core::Config {
    nl2sql_core::config::load_dotenv();
    nl2sql_core::Config::from_env()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config();
    nl2sql_core::logging::init(&config.logging_level);
    config.log_summary();

    let runner = Text2SqlRunner::from_config(&config).await?;
    let state = Arc::new(state::AppState {
        runner: Box::new(runner),
    });
    let app = router::build_router(state, &config.server.cors_origin);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
