//! Per-connection dispatch loop
//!
//! Decode one request, answer it, repeat until the peer goes away. Frame-level
//! faults (stall, oversized length, bad UTF-8) drop only the frame being
//! decoded; transport faults end this session and nothing else.

use crate::context::ServerContext;
use std::net::SocketAddr;
use std::sync::Arc;
use tagsync_common::protocol::{FrameReader, FrameWriter};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Serve one TCP connection until it closes
pub async fn handle_connection(stream: TcpStream, peer: SocketAddr, ctx: Arc<ServerContext>) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("{}: cannot set TCP_NODELAY: {}", peer, e);
    }
    let (read_half, write_half) = stream.into_split();
    serve(read_half, write_half, &peer.to_string(), ctx).await;
    info!("{} disconnected", peer);
}

/// Dispatch loop over any byte stream pair
pub async fn serve<R, W>(reader: R, writer: W, peer: &str, ctx: Arc<ServerContext>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = FrameReader::new(BufReader::new(reader), ctx.read_timeout());
    let mut writer = FrameWriter::new(writer);

    loop {
        let request = match reader.next_request().await {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(e) if e.is_recoverable() => {
                warn!("{}: dropping frame: {}", peer, e);
                continue;
            }
            Err(e) => {
                warn!("{}: connection lost: {}", peer, e);
                break;
            }
        };

        debug!("{}: {:?}", peer, request.command());
        let Some(response) = ctx.handle(request).await else {
            continue;
        };
        if let Err(e) = writer.send_response(&response).await {
            warn!("{}: write failed: {}", peer, e);
            break;
        }
    }
}
