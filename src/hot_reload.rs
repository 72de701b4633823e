use actix_web::{HttpRequest, HttpResponse, web};
use actix_ws::Message;
use futures_util::StreamExt;
use tokio::sync::broadcast;

use crate::startup::AppState;

/// Id of the injected script tag; also the idempotency marker checked
/// before injecting into a page that already carries the client.
pub const CLIENT_MARKER: &str = "__next_dev_client";

pub fn dev_scope() -> actix_web::Scope {
    web::scope("/_next/dev")
        .route("/health", web::get().to(|| async { "OK" }))
        .route("/client.js", web::get().to(client_script))
        .route("/ws", web::get().to(ws_handler))
}

pub fn client_snippet() -> String {
    format!(r#"<script id="{CLIENT_MARKER}" defer src="/_next/dev/client.js"></script>"#)
}

async fn client_script() -> HttpResponse {
    HttpResponse::Ok()
        .append_header(("Cache-Control", "no-store, max-age=0"))
        .content_type("application/javascript")
        .body(include_str!("./js/client.js"))
}

async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> actix_web::Result<HttpResponse> {
    let (response, mut session, mut msg_stream) = actix_ws::handle(&req, stream)?;
    let mut reload_events = state.broadcaster.subscribe();

    actix_web::rt::spawn(async move {
        loop {
            tokio::select! {
                message = msg_stream.next() => match message {
                    Some(Ok(Message::Ping(bytes))) => {
                        if session.pong(&bytes).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(reason))) => {
                        let _ = session.close(reason).await;
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => break,
                },
                event = reload_events.recv() => match event {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(payload) => {
                            if session.text(payload).await.is_err() {
                                break;
                            }
                        }
                        Err(error) => {
                            eprintln!("[next dev] failed to serialize reload message: {error}");
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    });

    Ok(response)
}
