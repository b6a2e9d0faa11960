//! Async transports for the NDJSON service
//!
//! A connection carries command lines in and three kinds of lines out:
//! responses, `variable_recovered` events and `gateway` lines for outbound
//! store traffic. The same loop drives stdio and a single TCP connection.

use std::io::{self, Write};
use std::net::SocketAddr;

use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use super::Service;
use crate::runtime::gateway::{ChannelGateway, GatewayMessage};
use crate::{RuntimeConfig, WorldServer};

/// Synchronous writer handing each written chunk to the connection task
///
/// [`Service`] writes a whole line per call, so one chunk is one line.
pub struct LineSink {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl LineSink {
    /// Wrap the sending half of a line channel
    pub fn new(tx: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self { tx }
    }
}

impl Write for LineSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "connection writer closed"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Serve one NDJSON session until the reader reaches EOF
///
/// Outbound store traffic goes to the same writer as `{"event":"gateway"}`
/// lines. Returns once every pending line has been written and the writer
/// shut down.
pub async fn serve<R, W>(config: RuntimeConfig, reader: R, writer: W) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (gateway, outbound) = ChannelGateway::channel();
    let (lines_tx, lines_rx) = mpsc::unbounded_channel();

    let server = WorldServer::new(config, gateway);
    let service = Service::new(server, LineSink::new(lines_tx));

    tokio::try_join!(
        read_commands(service, reader),
        write_output(writer, lines_rx, outbound)
    )?;
    Ok(())
}

/// Accept a single TCP connection and serve it
pub async fn serve_tcp(config: RuntimeConfig, listener: TcpListener) -> io::Result<SocketAddr> {
    let (stream, peer) = listener.accept().await?;
    tracing::info!(%peer, "client connected");

    let (reader, writer) = stream.into_split();
    serve(config, reader, writer).await?;

    tracing::info!(%peer, "client disconnected");
    Ok(peer)
}

async fn read_commands<R: AsyncRead + Unpin>(
    mut service: Service<LineSink>,
    reader: R,
) -> io::Result<()> {
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        service.handle_line(&line)?;
        tokio::task::yield_now().await;
    }
    // Dropping the service closes both output channels.
    Ok(())
}

async fn write_output<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut lines: mpsc::UnboundedReceiver<Vec<u8>>,
    mut outbound: mpsc::UnboundedReceiver<GatewayMessage>,
) -> io::Result<()> {
    let mut lines_open = true;
    let mut outbound_open = true;

    while lines_open || outbound_open {
        let line = tokio::select! {
            line = lines.recv(), if lines_open => match line {
                Some(line) => line,
                None => {
                    lines_open = false;
                    continue;
                }
            },
            message = outbound.recv(), if outbound_open => match message {
                Some(message) => gateway_line(&message)?,
                None => {
                    outbound_open = false;
                    continue;
                }
            },
        };

        writer.write_all(&line).await?;
        writer.flush().await?;
    }

    writer.shutdown().await
}

fn gateway_line(message: &GatewayMessage) -> io::Result<Vec<u8>> {
    let mut line = serde_json::to_vec(&json!({ "event": "gateway", "message": message }))?;
    line.push(b'\n');
    Ok(line)
}
