//! Serve command implementation.
//!
//! Every client connection's bytes, read until the client closes its
//! end, become one entry. A connection that sends nothing appends
//! nothing. Reads run in spawned tasks; appends run on the thread that
//! opened the log, which is the only thread allowed to use it.

use binlog_core::Connection;
use std::path::Path;

/// Runs the serve command until interrupted.
#[cfg(unix)]
pub fn run(conn: &Connection, socket: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let listener = {
        let _guard = runtime.enter();
        tokio::net::UnixListener::bind(socket)?
    };
    tracing::info!(socket = %socket.display(), "listening");

    let result = runtime.block_on(serve(conn, listener, shutdown_signal()));

    std::fs::remove_file(socket)?;
    tracing::info!("socket removed, shutting down");
    result
}

/// Runs the serve command until interrupted.
#[cfg(not(unix))]
pub fn run(_conn: &Connection, _socket: &Path) -> Result<(), Box<dyn std::error::Error>> {
    Err("serve requires Unix domain sockets".into())
}

#[cfg(unix)]
async fn serve(
    conn: &Connection,
    listener: tokio::net::UnixListener,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<(), Box<dyn std::error::Error>> {
    use tokio::sync::mpsc;

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _) = accepted?;
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Some(raw) = read_client(stream).await {
                        // The receiver only goes away on shutdown.
                        let _ = tx.send(raw);
                    }
                });
            }
            Some(raw) = rx.recv() => {
                let position = conn.append(&raw)?;
                tracing::debug!(position, bytes = raw.len(), "appended");
            }
            () = &mut shutdown => break,
        }
    }

    // Flush what already arrived.
    drop(tx);
    while let Ok(raw) = rx.try_recv() {
        conn.append(&raw)?;
    }
    Ok(())
}

/// Reads a client until it closes its end; `None` if it sent nothing.
#[cfg(unix)]
async fn read_client(mut stream: tokio::net::UnixStream) -> Option<Vec<u8>> {
    use tokio::io::AsyncReadExt;

    let mut raw = Vec::new();
    match stream.read_to_end(&mut raw).await {
        Ok(0) => {
            tracing::debug!("empty connection skipped");
            None
        }
        Ok(_) => Some(raw),
        Err(err) => {
            tracing::warn!(error = %err, "failed to read client");
            None
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use binlog_core::{ConnectionRegistry, LogConfig};
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{UnixListener, UnixStream};

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn silent_clients_yield_nothing() {
        runtime().block_on(async {
            let (client, server) = UnixStream::pair().unwrap();
            drop(client);
            assert_eq!(read_client(server).await, None);

            let (mut client, server) = UnixStream::pair().unwrap();
            client.write_all(b"event").await.unwrap();
            drop(client);
            assert_eq!(read_client(server).await, Some(b"event".to_vec()));
        });
    }

    #[test]
    fn connect_then_close_appends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ConnectionRegistry::new();
        let conn = registry
            .open(dir.path().join("log"), LogConfig::new().map_size(16 * 1024 * 1024))
            .unwrap();
        let socket = dir.path().join("binlog.sock");

        let rt = runtime();
        let listener = {
            let _guard = rt.enter();
            UnixListener::bind(&socket).unwrap()
        };

        let clients = async {
            drop(UnixStream::connect(&socket).await.unwrap());
            drop(UnixStream::connect(&socket).await.unwrap());

            let mut client = UnixStream::connect(&socket).await.unwrap();
            client.write_all(b"payload").await.unwrap();
            drop(client);

            while conn.len().unwrap() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        };
        rt.block_on(serve(&conn, listener, clients)).unwrap();

        assert_eq!(conn.len().unwrap(), 1);
        let entry = conn.get(0).unwrap().unwrap();
        assert_eq!(entry.get("data"), Some(&binlog_core::Value::Bytes(b"payload".to_vec())));
    }
}
