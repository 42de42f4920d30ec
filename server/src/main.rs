use std::io;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};

use codepad_sandbox::Dispatcher;
use codepad_server::config::Config;
use codepad_server::connection::ConnectionIds;
use codepad_server::handlers;
use codepad_server::server::spawn_server;

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config =
        Config::from_env().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let dispatcher = Arc::new(Dispatcher::new(&config.sandbox));
    for (language, available) in dispatcher.probe().await {
        if available {
            log::info!("Interpreter for {} is available", language);
        } else {
            log::warn!("Interpreter for {} is missing, runs will be reported as unavailable", language);
        }
    }

    let srv_tx = spawn_server(dispatcher.clone());
    let ids = web::Data::new(ConnectionIds::default());
    let bind_addr = (config.host.clone(), config.port);
    log::info!("Listening on {}:{}", bind_addr.0, bind_addr.1);

    HttpServer::new(move || {
        let cors = if config.cors_origins.is_empty() {
            Cors::permissive()
        } else {
            config
                .cors_origins
                .iter()
                .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
                .allow_any_method()
                .allow_any_header()
        };
        App::new()
            .wrap(cors)
            .wrap(Logger::default())
            .app_data(web::Data::new(srv_tx.clone()))
            .app_data(web::Data::from(dispatcher.clone()))
            .app_data(web::Data::new(config.clone()))
            .app_data(ids.clone())
            .configure(handlers::root)
    })
    .bind(bind_addr)?
    .run()
    .await
}
