use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, instrument, warn};

use crate::config::BackupConfig;
use crate::core::codec::{padded_len, ServerCodec};
use crate::error::{ProtocolError, Result};
use crate::protocol::dispatcher::Dispatcher;
use crate::store::{ClientSessions, FileVault, Persistence, SqliteStore};
use crate::utils::metrics::Metrics;

/// Open storage, bind the configured address and serve until CTRL+C.
///
/// Storage and bind failures are returned as [`ProtocolError::Fatal`].
#[instrument(skip(config))]
pub async fn start_server(config: &BackupConfig) -> Result<()> {
    let store = SqliteStore::open(&config.storage.database_path).map_err(|e| {
        ProtocolError::Fatal(format!(
            "cannot open database {}: {e}",
            config.storage.database_path.display()
        ))
    })?;
    let sessions = ClientSessions::load(store)
        .map_err(|e| ProtocolError::Fatal(format!("cannot load clients: {e}")))?;
    info!(clients = sessions.len(), "Loaded registered clients");

    let vault = FileVault::new(&config.storage.backup_dir);
    let mut dispatcher = Dispatcher::new(sessions, vault, Arc::new(Metrics::new()));

    let addr = config.listen_address();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ProtocolError::Fatal(format!("cannot listen on {addr}: {e}")))?;
    info!(address = %addr, "Backup server listening");

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received CTRL+C signal, shutting down");
            let _ = shutdown_tx.send(()).await;
        }
    });

    let codec = ServerCodec::new(config.server.max_payload_size);
    serve(listener, &mut dispatcher, codec, shutdown_rx).await
}

/// Accept loop.
///
/// Each accepted connection is served to completion before the next accept, so the
/// dispatcher and its session cache are only ever touched by this task. Returns when
/// `shutdown_rx` yields or its senders are dropped.
pub async fn serve<P: Persistence>(
    listener: TcpListener,
    dispatcher: &mut Dispatcher<P>,
    codec: ServerCodec,
    mut shutdown_rx: mpsc::Receiver<()>,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Shutting down server");
                dispatcher.metrics().log_metrics();
                return Ok(());
            }

            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        dispatcher.metrics().connection_accepted();
                        handle_connection(stream, peer, dispatcher, codec).await;
                    }
                    Err(e) => {
                        dispatcher.metrics().connection_error();
                        error!(error = %e, "Error accepting connection");
                    }
                }
            }
        }
    }
}

/// Read one request, answer it, close.
///
/// A peer that closes without sending anything is dropped silently; a truncated or
/// oversized frame is answered with GENERAL_ERROR, and its client id, if the header
/// decoded, is marked as seen. The stream is dropped once, on return.
#[instrument(skip(stream, dispatcher, codec), fields(peer = %peer))]
pub async fn handle_connection<P: Persistence>(
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: &mut Dispatcher<P>,
    codec: ServerCodec,
) {
    let mut framed = Framed::new(stream, codec);

    let response = match framed.next().await {
        None => {
            debug!("Connection closed before a request");
            return;
        }
        Some(Err(e)) => Some(dispatcher.reject_frame(framed.codec().last_header(), &e)),
        Some(Ok(frame)) => dispatcher.dispatch(frame),
    };

    let Some(response) = response else {
        debug!("No response for this request, closing");
        return;
    };

    let code = response.code().as_u16();
    let bytes = padded_len(response.encode().len()) as u64;
    match framed.send(response).await {
        Ok(()) => {
            dispatcher.metrics().response_sent(bytes);
            debug!(code, bytes, "Response sent");
        }
        Err(e) => {
            dispatcher.metrics().connection_error();
            warn!(code, error = %e, "Failed to send response");
        }
    }
}
