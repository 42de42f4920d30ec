use actix_web::{web, HttpResponse};
use codepad_sandbox::Dispatcher;
use serde::Deserialize;

pub fn configure_execute_handlers(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/execute").route(web::post().to(execute)));
}

#[derive(Debug, Deserialize)]
struct ExecuteBody {
    language: String,
    code: String,
}

/// Runs a buffer outside of any session. Failures are reported in the
/// result body, never as an HTTP error.
async fn execute(body: web::Json<ExecuteBody>, dispatcher: web::Data<Dispatcher>) -> HttpResponse {
    let ExecuteBody { language, code } = body.into_inner();
    let result = dispatcher.run(&language, &code).await;
    HttpResponse::Ok().json(result)
}
