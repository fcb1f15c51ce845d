//! Listener startup and lifecycle.
//!
//! Connections are accepted and served one at a time on the calling task, so
//! a second client waits in the listen backlog until the first one closes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{Context, Result, anyhow};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::config::IngestConfig;
use crate::http_api;
use crate::sink::AppendLog;

/// A bound, not yet running ingest server.
pub struct IngestServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    sink: AppendLog,
    shutdown: Arc<watch::Sender<bool>>,
}

/// Stops a server from another task or thread.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Ask the accept loop to exit. An in-flight request is abandoned.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }
}

impl IngestServer {
    /// Bind the listener on `config.bind`.
    pub async fn bind(config: &IngestConfig) -> Result<Self> {
        let sink = AppendLog::new(config.output_path.clone(), config.read_chunk_bytes);
        match sink.file_len() {
            Ok(0) => {}
            Ok(bytes) => tracing::info!(
                path = %sink.path().display(),
                bytes,
                "appending to existing output file"
            ),
            Err(e) => tracing::warn!("output file check failed: {e:#}"),
        }

        let listener = TcpListener::bind(config.bind)
            .await
            .with_context(|| format!("bind {}", config.bind))?;
        let local_addr = listener.local_addr().context("listener address")?;
        tracing::info!(port = local_addr.port(), "listening on port {}", local_addr.port());

        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            listener,
            local_addr,
            sink,
            shutdown: Arc::new(shutdown),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown.clone(),
        }
    }

    /// Serve connections until [`ShutdownHandle::stop`] is called.
    pub async fn run(self) -> Result<()> {
        let mut stop_rx = self.shutdown.subscribe();
        loop {
            let (stream, peer) = tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!("accept error: {e:#}");
                        continue;
                    }
                },
                _ = stop_rx.wait_for(|stop| *stop) => break,
            };

            tokio::select! {
                served = self.serve_one(stream, peer) => {
                    if let Err(e) = served {
                        tracing::warn!(peer = %peer, "client session error: {e:#}");
                    }
                }
                _ = stop_rx.wait_for(|stop| *stop) => {
                    tracing::warn!(peer = %peer, "shutdown interrupted an in-flight request");
                    break;
                }
            }
        }
        tracing::info!(addr = %self.local_addr, "server stopped");
        Ok(())
    }

    async fn serve_one(&self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        let _ = stream.set_nodelay(true);
        tracing::debug!(peer = %peer, "client connected");
        http_api::serve_connection(stream, peer, &self.sink).await
    }
}

/// An ingest server running on its own thread.
pub struct RunningServer {
    local_addr: SocketAddr,
    handle: ShutdownHandle,
    thread: JoinHandle<Result<()>>,
}

/// Bind and run a server on a dedicated thread with its own runtime.
pub fn spawn(config: IngestConfig) -> Result<RunningServer> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build runtime")?;
    let (ready_tx, ready_rx) = std::sync::mpsc::channel();
    let thread = std::thread::spawn(move || {
        runtime.block_on(async move {
            let server = match IngestServer::bind(&config).await {
                Ok(server) => server,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return Ok(());
                }
            };
            let _ = ready_tx.send(Ok((server.local_addr(), server.handle())));
            server.run().await
        })
    });

    let ready = ready_rx
        .recv()
        .map_err(|_| anyhow!("server thread exited before binding"));
    match ready.and_then(|bound| bound) {
        Ok((local_addr, handle)) => Ok(RunningServer {
            local_addr,
            handle,
            thread,
        }),
        Err(e) => {
            let _ = thread.join();
            Err(e)
        }
    }
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the accept loop and wait for the server thread.
    pub fn stop(self) -> Result<()> {
        self.handle.stop();
        self.thread
            .join()
            .map_err(|_| anyhow!("server thread panicked"))?
    }
}
