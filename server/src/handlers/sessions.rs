use crate::config::Config;
use crate::handlers::{request, ApiError};
use crate::server::ServerTx;
use crate::transport::TransportCommand;
use actix_web::{web, HttpResponse};
use codepad_system::is_well_formed_session_id;
use serde::Deserialize;
use serde_json::json;

pub fn configure_session_handlers(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/sessions").route(web::post().to(create_session)))
        .service(
            web::resource("/api/sessions/{session_id}")
                .route(web::get().to(show_session))
                .route(web::delete().to(delete_session)),
        );
}

#[derive(Debug, Default, Deserialize)]
struct CreateSessionBody {
    #[serde(default)]
    language: Option<String>,
}

async fn create_session(
    body: web::Bytes,
    srv_tx: web::Data<ServerTx>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    // An empty body is the same as `{}`.
    let body: CreateSessionBody = if body.iter().all(u8::is_ascii_whitespace) {
        CreateSessionBody::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
    };
    let session = request(&srv_tx, |tx| TransportCommand::CreateSession {
        language: body.language,
        tx,
    })
    .await?;
    let share_url = config.share_url(&session.id);
    Ok(HttpResponse::Ok().json(json!({ "session": session, "shareUrl": share_url })))
}

fn session_id_param(path: web::Path<String>) -> Result<String, ApiError> {
    let session_id = path.into_inner();
    if is_well_formed_session_id(&session_id) {
        Ok(session_id)
    } else {
        Err(ApiError::MalformedSessionId)
    }
}

async fn show_session(
    path: web::Path<String>,
    srv_tx: web::Data<ServerTx>,
) -> Result<HttpResponse, ApiError> {
    let session_id = session_id_param(path)?;
    let session = request(&srv_tx, |tx| TransportCommand::GetSession { session_id, tx })
        .await?
        .ok_or(ApiError::SessionNotFound)?;
    Ok(HttpResponse::Ok().json(session))
}

async fn delete_session(
    path: web::Path<String>,
    srv_tx: web::Data<ServerTx>,
) -> Result<HttpResponse, ApiError> {
    let session_id = session_id_param(path)?;
    if request(&srv_tx, |tx| TransportCommand::DeleteSession { session_id, tx }).await? {
        Ok(HttpResponse::NoContent().finish())
    } else {
        Err(ApiError::SessionNotFound)
    }
}
