use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::backend::Backend;
use crate::config::ServerConfig;
use crate::driver::{DriverHandler, ErrorReporter};
use crate::error::ServerError;

/// TCP listener that hands each accepted connection to its own task.
pub struct Server {
    listener: TcpListener,
    handler: DriverHandler,
}

impl Server {
    pub async fn bind(
        config: &ServerConfig,
        backend: Arc<dyn Backend>,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.listen_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.listen_addr.clone(),
                source,
            })?;

        Ok(Self {
            listener,
            handler: DriverHandler::new(backend, config),
        })
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.handler = self.handler.with_reporter(reporter);
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever.
    pub async fn serve(self) -> Result<(), ServerError> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Accept connections until `shutdown` resolves.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        tracing::info!("Proxy listening on {}", self.local_addr()?);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((socket, addr)) => {
                            if let Err(e) = socket.set_nodelay(true) {
                                tracing::debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                            }
                            let handler = self.handler.clone();
                            tokio::spawn(async move {
                                handler.handle_connection(socket, addr.to_string()).await;
                            });
                        }
                        Err(e) => {
                            tracing::warn!("Accept error: {}", e);
                        }
                    }
                }
                _ = &mut shutdown => {
                    tracing::info!("Shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }

        Ok(())
    }
}
