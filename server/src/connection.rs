use std::sync::atomic::{AtomicU32, Ordering};

use actix::{Actor, ActorContext, AsyncContext, Handler, Message, Running, StreamHandler};
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use actix_web_actors::ws::{CloseCode, CloseReason};

use codepad_system::{ClientMessage, ConnectionId, ServerMessage};

use crate::config::Config;
use crate::connection_tx_storage::ConnectionTx;
use crate::server::{ServerCommand, ServerTx};

/// Outbound events a connection buffers before it is considered too slow.
const OUTBOUND_CAPACITY: usize = 256;

#[derive(Debug)]
pub enum ConnectionCommand {
    Connect {
        from: ConnectionId,
        tx: ConnectionTx,
    },
    Disconnect {
        from: ConnectionId,
    },
    Message {
        from: ConnectionId,
        message: ClientMessage,
    },
    /// A frame that could not be turned into a `ClientMessage`.
    Malformed {
        from: ConnectionId,
        reason: String,
    },
}

#[derive(Debug)]
pub enum ConnectionEvent {
    Message(ServerMessage),
    Close,
}

/// Source of connection ids, shared by every worker.
#[derive(Debug, Default)]
pub struct ConnectionIds(AtomicU32);

impl ConnectionIds {
    pub fn next(&self) -> ConnectionId {
        self.0.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }
}

#[derive(Message)]
#[rtype(result = "()")]
struct ConnectionActorMessage(ConnectionEvent);

struct ConnectionActor {
    id: ConnectionId,
    srv_tx: ServerTx,
}

impl ConnectionActor {
    fn send_command(&self, command: ConnectionCommand) {
        if self.srv_tx.send(ServerCommand::Connection(command)).is_err() {
            log::error!("Server task is gone, dropping frame of connection {}", self.id);
        }
    }
}

impl Actor for ConnectionActor {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<ConnectionEvent>(OUTBOUND_CAPACITY);

        self.send_command(ConnectionCommand::Connect { from: self.id, tx });

        let addr = ctx.address().recipient();
        let id = self.id;

        tokio::spawn(async move {
            log::debug!("connection {} forwarder - started", id);
            while let Some(event) = rx.recv().await {
                if addr.send(ConnectionActorMessage(event)).await.is_err() {
                    break;
                }
            }
            // The server dropped our queue: evicted or shutting down.
            addr.do_send(ConnectionActorMessage(ConnectionEvent::Close));
            log::debug!("connection {} forwarder - terminated", id);
        });
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        self.send_command(ConnectionCommand::Disconnect { from: self.id });
        Running::Stop
    }
}

/// Ingress
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ConnectionActor {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        let from = self.id;
        match msg {
            Ok(ws::Message::Ping(msg)) => ctx.pong(&msg),
            Ok(ws::Message::Text(text)) => {
                log::debug!("Ingress size: {}", text.len());
                let command = match ClientMessage::from_json(&text) {
                    Ok(message) => ConnectionCommand::Message { from, message },
                    Err(e) => ConnectionCommand::Malformed {
                        from,
                        reason: e.to_string(),
                    },
                };
                self.send_command(command);
            }
            Ok(ws::Message::Binary(_)) => self.send_command(ConnectionCommand::Malformed {
                from,
                reason: "binary frames are not supported".into(),
            }),
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                log::warn!("Connection {} protocol error: {}", from, e);
                ctx.stop();
            }
            _ => (),
        }
    }
}

/// Egress
impl Handler<ConnectionActorMessage> for ConnectionActor {
    type Result = ();

    fn handle(
        &mut self,
        msg: ConnectionActorMessage,
        ctx: &mut ws::WebsocketContext<Self>,
    ) -> Self::Result {
        match msg.0 {
            ConnectionEvent::Message(message) => match message.to_json() {
                Ok(text) => {
                    log::debug!("Egress {} to {}", message.event_name(), self.id);
                    ctx.text(text);
                }
                Err(e) => log::error!("Failed to encode {}: {}", message.event_name(), e),
            },
            ConnectionEvent::Close => {
                ctx.close(Some(CloseReason {
                    code: CloseCode::Normal,
                    description: None,
                }));
                ctx.stop();
            }
        }
    }
}

pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    srv_tx: web::Data<ServerTx>,
    ids: web::Data<ConnectionIds>,
    config: web::Data<Config>,
) -> Result<HttpResponse, Error> {
    let actor = ConnectionActor {
        id: ids.next(),
        srv_tx: srv_tx.get_ref().clone(),
    };
    ws::WsResponseBuilder::new(actor, &req, stream)
        .frame_size(config.ws_max_frame_bytes)
        .start()
}
