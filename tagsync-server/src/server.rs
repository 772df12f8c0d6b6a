//! TCP accept loop
//!
//! One spawned task per connection. A failed accept is logged and the loop
//! keeps going; only the shutdown future stops it.

use crate::context::ServerContext;
use crate::error::Result;
use crate::session::handle_connection;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{error, info};

pub struct Server {
    listener: TcpListener,
    ctx: Arc<ServerContext>,
}

impl Server {
    pub async fn bind<A: ToSocketAddrs>(addr: A, ctx: Arc<ServerContext>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, ctx })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever
    pub async fn run(self) {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Accept connections until `shutdown` completes
    ///
    /// Sessions already running are left to finish on their own.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Listener stopped");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!("Connection from {}", peer);
                        tokio::spawn(handle_connection(stream, peer, Arc::clone(&self.ctx)));
                    }
                    Err(e) => error!("Accept failed: {}", e),
                },
            }
        }
    }
}
