use std::{pin::pin, sync::Arc};

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
    routing::any,
};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use super::Shutdown;
use crate::protocol::Dispatcher;

#[derive(Clone)]
struct WsState {
    dispatcher: Arc<Dispatcher>,
    shutdown: Shutdown,
}

fn router(dispatcher: Arc<Dispatcher>, shutdown: Shutdown) -> Router {
    Router::new()
        .route("/", any(upgrade))
        .with_state(WsState {
            dispatcher,
            shutdown,
        })
        .layer(TraceLayer::new_for_http())
}

pub(super) async fn serve(listener: TcpListener, dispatcher: Arc<Dispatcher>, shutdown: Shutdown) {
    let app = router(dispatcher, shutdown.clone());
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.wait())
        .await
    {
        tracing::error!(?err, "websocket server failed");
    }
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<WsState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: WsState) {
    let (mut sender, mut receiver) = socket.split();
    let mut stopped = pin!(state.shutdown.wait());

    loop {
        let message = tokio::select! {
            () = &mut stopped => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            message = receiver.next() => message,
        };

        let reply = match message {
            Some(Ok(Message::Text(text))) => {
                state
                    .dispatcher
                    .dispatch(text.as_str().trim_end().as_bytes())
                    .await
            }
            Some(Ok(Message::Binary(data))) => state.dispatcher.dispatch(&data).await,
            Some(Ok(Message::Close(_)) | Err(_)) | None => break,
            Some(Ok(_)) => continue,
        };

        if let Some(reply) = reply {
            if sender
                .send(Message::Text(format!("{reply}\n").into()))
                .await
                .is_err()
            {
                break;
            }
        }
    }

    tracing::debug!("websocket connection closed");
}
