use std::{pin::pin, sync::Arc};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    task::JoinSet,
};

use super::Shutdown;
use crate::protocol::Dispatcher;

pub(super) async fn serve(listener: TcpListener, dispatcher: Arc<Dispatcher>, shutdown: Shutdown) {
    let mut connections = JoinSet::new();
    let mut stopped = pin!(shutdown.clone().wait());

    loop {
        tokio::select! {
            () = &mut stopped => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "tcp connection accepted");
                    connections.spawn(handle_connection(stream, dispatcher.clone(), shutdown.clone()));
                }
                Err(err) => tracing::warn!(?err, "failed to accept tcp connection"),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    drop(listener);
    connections.shutdown().await;
}

/// Newline-framed request/reply loop for one peer.
async fn handle_connection(stream: TcpStream, dispatcher: Arc<Dispatcher>, shutdown: Shutdown) {
    let peer = stream.peer_addr().ok();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut stopped = pin!(shutdown.wait());
    let mut line = String::new();

    loop {
        line.clear();
        let read = tokio::select! {
            () = &mut stopped => break,
            read = reader.read_line(&mut line) => read,
        };
        match read {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(?peer, ?err, "tcp read failed");
                break;
            }
        }

        let Some(reply) = dispatcher.dispatch(line.trim().as_bytes()).await else {
            continue;
        };
        let mut reply = reply.into_bytes();
        reply.push(b'\n');
        if let Err(err) = writer.write_all(&reply).await {
            tracing::debug!(?peer, ?err, "tcp write failed");
            break;
        }
    }

    tracing::debug!(?peer, "tcp connection closed");
}
