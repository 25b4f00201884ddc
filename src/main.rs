mod cli;

use actix_web::{App, HttpServer};
use knnclass::{ClassifierConfig, SessionController, SessionEvent};
use tracing::info;

#[actix_web::main]
async fn main() -> Result<(), std::io::Error> {
    let args: Vec<String> = std::env::args().collect();

    // knnclass [config]        - REPL
    // knnclass serve [config]  - HTTP server
    let (serve, config_path) = match args.get(1).map(String::as_str) {
        Some("serve") => (true, args.get(2).map(String::as_str)),
        other => (false, other),
    };

    let config = match ClassifierConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(config.log_level.as_str())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if serve {
        let state = knnclass::server::app_state(&config);
        info!(addr = %config.listen_addr(), num_classes = config.num_classes, "starting server");
        HttpServer::new(move || App::new().app_data(state.clone()).configure(knnclass::server::config))
            .bind(config.listen_addr())?
            .run()
            .await?;
    } else {
        let mut session = SessionController::new(&config);
        let mut events: Vec<SessionEvent> = Vec::new();
        session.mark_ready(config.dimension, &mut events);
        cli::run_repl(&mut session);
    }

    Ok(())
}
