use crate::connection::ws_index;
use crate::handlers::execute::configure_execute_handlers;
use crate::handlers::health::configure_health_handlers;
use crate::handlers::sessions::configure_session_handlers;
use crate::server::{ServerCommand, ServerTx};
use crate::transport::TransportCommand;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use serde_json::json;
use tokio::sync::oneshot;

mod execute;
mod health;
mod sessions;

pub fn root(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _| ApiError::BadRequest(err.to_string()).into()),
    );
    cfg.service(web::resource("/ws").route(web::get().to(ws_index)));

    configure_session_handlers(cfg);
    configure_execute_handlers(cfg);
    configure_health_handlers(cfg);
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Session not found")]
    SessionNotFound,
    #[error("Malformed session id")]
    MalformedSessionId,
    #[error("{0}")]
    BadRequest(String),
    #[error("Server is shutting down")]
    Unavailable,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::SessionNotFound => StatusCode::NOT_FOUND,
            Self::MalformedSessionId | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

/// Sends a command to the server task and waits for its answer.
pub(crate) async fn request<T, F>(srv_tx: &ServerTx, make: F) -> Result<T, ApiError>
where
    F: FnOnce(oneshot::Sender<T>) -> TransportCommand,
{
    let (tx, rx) = oneshot::channel::<T>();
    srv_tx
        .send(ServerCommand::Transport(make(tx)))
        .map_err(|_| ApiError::Unavailable)?;
    rx.await.map_err(|_| ApiError::Unavailable)
}
