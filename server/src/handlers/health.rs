use crate::handlers::{request, ApiError};
use crate::server::ServerTx;
use crate::transport::TransportCommand;
use actix_web::{web, HttpResponse};
use codepad_sandbox::Dispatcher;
use serde_json::json;

pub fn configure_health_handlers(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health)));
}

async fn health(
    srv_tx: web::Data<ServerTx>,
    dispatcher: web::Data<Dispatcher>,
) -> Result<HttpResponse, ApiError> {
    let sessions = request(&srv_tx, |tx| TransportCommand::CountSessions { tx }).await?;
    let interpreters = dispatcher.probe().await;
    Ok(HttpResponse::Ok().json(json!({
        "status": "ok",
        "sessions": sessions,
        "interpreters": interpreters,
    })))
}
