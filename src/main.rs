use anyhow::Result;
use blogforge::config::Config;
use blogforge::nodes::BlogNodes;
use blogforge::server::{serve, AppState};
use blogforge::{llm, speech};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    // 1. Load config (config.yml plus env API keys)
    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            eprintln!("Check 'config.yml' and the *_API_KEY environment variables.");
            return Err(e);
        }
    };

    // 2. External-service clients
    let llm = llm::create_llm(&config)?;
    let transcriber = speech::create_transcriber(&config)?;
    let synthesizer = speech::create_synthesizer(&config)?;

    // 3. Step functions share the clients; one set serves all requests
    let nodes = BlogNodes::new(llm, transcriber, synthesizer, config.languages.clone());

    // 4. Serve
    serve(AppState {
        nodes: Arc::new(nodes),
        config: Arc::new(config),
    })
    .await
}
