//! TCP listener for messages from neighbours.
//!
//! Every accepted connection gets its own read task. Each line is decoded
//! into a `Message` and forwarded on a single channel, so the node sees one
//! ordered stream of `Inbound` items regardless of how many neighbours are
//! connected. Malformed lines become `Inbound::DecodeFailure`; they never
//! close the connection or stop the listener. No more than `MAX_FRAME_SIZE`
//! bytes of one line are ever buffered.

use anyhow::Result;
use rst_core::protocol::{decode_frame, DecodeError, MAX_FRAME_SIZE};
use rst_core::Inbound;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Bound listening socket, not yet accepting.
pub struct Listener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind to an address. Port 0 picks a free port.
    pub async fn bind(listen_addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(listen_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Listening on {}", local_addr);
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Start accepting. Returns the stream of inbound items and the handle of
    /// the accept task; aborting the handle stops accepting new connections.
    pub fn spawn(self) -> (mpsc::UnboundedReceiver<Inbound>, JoinHandle<()>) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            self.accept_loop(inbound_tx).await;
        });
        (inbound_rx, handle)
    }

    async fn accept_loop(self, inbound_tx: mpsc::UnboundedSender<Inbound>) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("Accepted connection from {}", addr);
                    let tx = inbound_tx.clone();
                    tokio::spawn(async move {
                        read_frames(addr.to_string(), stream, tx).await;
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
            if inbound_tx.is_closed() {
                debug!("Inbound receiver dropped, listener on {} stopping", self.local_addr);
                break;
            }
        }
    }
}

/// Read newline-delimited frames from `reader` until EOF.
pub async fn read_frames<R>(origin: String, reader: R, inbound_tx: mpsc::UnboundedSender<Inbound>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    let limit = MAX_FRAME_SIZE as u64 + 1;

    loop {
        line.clear();
        match (&mut reader).take(limit).read_until(b'\n', &mut line).await {
            Ok(0) => {
                debug!("Connection from {} closed", origin);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Read from {} failed: {}", origin, e);
                break;
            }
        }

        if line.len() > MAX_FRAME_SIZE {
            warn!(
                "Frame from {} exceeds {} bytes, discarding the rest of the line",
                origin, MAX_FRAME_SIZE
            );
            let item = Inbound::DecodeFailure {
                origin: origin.clone(),
                error: DecodeError::TooLarge(line.len()),
            };
            if inbound_tx.send(item).is_err() {
                break;
            }
            if !line.ends_with(b"\n") {
                match skip_line(&mut reader).await {
                    Ok(skipped) => debug!("Skipped {} more byte(s) from {}", skipped, origin),
                    Err(e) => {
                        warn!("Read from {} failed: {}", origin, e);
                        break;
                    }
                }
            }
            continue;
        }

        if line.trim_ascii().is_empty() {
            continue;
        }

        let item = match decode_frame(&line) {
            Ok(message) => Inbound::Message(message),
            Err(error) => {
                warn!(
                    "Could not decode frame from {} ({} bytes, max {}): {}",
                    origin,
                    line.len(),
                    MAX_FRAME_SIZE,
                    error
                );
                Inbound::DecodeFailure {
                    origin: origin.clone(),
                    error,
                }
            }
        };

        if inbound_tx.send(item).is_err() {
            break;
        }
    }
}

/// Drop input up to and including the next newline, one buffer at a time.
async fn skip_line<R>(reader: &mut BufReader<R>) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut skipped = 0;
    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            return Ok(skipped);
        }
        let (used, done) = match buf.iter().position(|b| *b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (buf.len(), false),
        };
        reader.consume(used);
        skipped += used;
        if done {
            return Ok(skipped);
        }
    }
}
