use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use decor::assistant::Assistant;
use decor::config::{BACKGROUND_IMAGE, BIND_HOST, RUST_LOG};
use decor::model::{ModelClient, OllamaLoader};
use decor::render::Page;
use decor::server::{self, AppState};
use std::{env, process};

use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: ./decor <port> <model config file>";

fn get_args() -> (u16, String) {
    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        println!("{USAGE}");
        process::exit(1);
    }

    let port = match args[1].parse() {
        Ok(port) => port,
        Err(_) => {
            println!("invalid port {:?}\n{USAGE}", args[1]);
            process::exit(1);
        }
    };

    (port, args[2].clone())
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(RUST_LOG)))
        .init();

    let (port, config_file) = get_args();

    // Failing to load the model is fatal
    let loader = OllamaLoader::from_file(&config_file)?;
    let client = ModelClient::load(&loader)?;

    let state = web::Data::new(AppState::new(
        Assistant::new(client),
        Page::load(BACKGROUND_IMAGE),
    ));

    let shutdown = state.shutdown.clone();
    actix_web::rt::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutting down, cancelling in-flight model requests");
            shutdown.cancel();
        }
    });

    info!("listening on {BIND_HOST}:{port}");

    // Start the HTTP server
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .configure(server::configure)
    })
    .bind((BIND_HOST, port))
    .with_context(|| format!("failed to bind {BIND_HOST}:{port}"))?
    .run()
    .await?;

    Ok(())
}
