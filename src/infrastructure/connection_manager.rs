// Connection manager - Device TCP client with reconnect
use crate::application::reading_handler::ReadingHandler;
use crate::domain::connection::ConnectionState;
use crate::infrastructure::config::DeviceSettings;
use crate::infrastructure::frame_decoder::FrameDecoder;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::watch;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("read failed: {0}")]
    Read(#[source] std::io::Error),

    #[error("connection closed by peer")]
    Closed,
}

/// Owns the single outbound connection to the device.
///
/// Only this type writes [`ConnectionState`]; everyone else holds a receiver.
pub struct ConnectionManager {
    address: String,
    connect_timeout: Duration,
    retry_delay: Duration,
    read_chunk_size: usize,
    max_pending: usize,
    state: watch::Sender<ConnectionState>,
    handler: Arc<dyn ReadingHandler>,
}

impl ConnectionManager {
    pub fn new(
        settings: &DeviceSettings,
        max_pending: usize,
        state: watch::Sender<ConnectionState>,
        handler: Arc<dyn ReadingHandler>,
    ) -> Self {
        Self {
            address: settings.address(),
            connect_timeout: settings.connect_timeout(),
            retry_delay: settings.retry_delay(),
            read_chunk_size: settings.read_chunk_size.max(1),
            max_pending,
            state,
            handler,
        }
    }

    /// Connect, receive and reconnect until `shutdown` turns true.
    ///
    /// There is no retry limit. Every failure moves the state to `Failed` and
    /// waits `retry_delay` before the next attempt. The first attempt starts
    /// from `Disconnected`; each retry announces itself as `Connecting`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Starting device connection to {}", self.address);
        let mut decoder = FrameDecoder::new(self.max_pending);
        let mut retrying = false;

        loop {
            if *shutdown.borrow() {
                break;
            }

            if retrying {
                self.set_state(ConnectionState::Connecting);
            }
            retrying = true;
            let connected = tokio::select! {
                result = self.connect() => result,
                _ = shutdown_requested(&mut shutdown) => break,
            };

            let failure = match connected {
                Ok(stream) => {
                    self.set_state(ConnectionState::Connected);
                    match self.receive(stream, &mut decoder, &mut shutdown).await {
                        Ok(()) => break,
                        Err(e) => e,
                    }
                }
                Err(e) => e,
            };

            tracing::warn!(
                "Device connection to {} failed: {}; retrying in {:?}",
                self.address,
                failure,
                self.retry_delay
            );
            self.set_state(ConnectionState::Failed(failure.to_string()));

            tokio::select! {
                _ = tokio::time::sleep(self.retry_delay) => {}
                _ = shutdown_requested(&mut shutdown) => break,
            }
        }

        self.set_state(ConnectionState::Disconnected);
        tracing::info!("Device connection stopped");
    }

    async fn connect(&self) -> Result<TcpStream, ConnectionError> {
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(ConnectionError::Connect(e)),
            Err(_) => Err(ConnectionError::Timeout(self.connect_timeout)),
        }
    }

    /// Read until the peer closes, a read fails, or shutdown is requested.
    /// Returns `Ok` only on shutdown. The stream is dropped on return.
    async fn receive(
        &self,
        mut stream: TcpStream,
        decoder: &mut FrameDecoder,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), ConnectionError> {
        // A partial frame from a previous connection is never completed by this one
        if !decoder.pending().is_empty() {
            tracing::debug!(
                "Dropping {} bytes of partial frame from the previous connection",
                decoder.pending().len()
            );
            decoder.reset();
        }
        let mut chunk = vec![0u8; self.read_chunk_size];

        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            let read = tokio::select! {
                result = stream.read(&mut chunk) => result.map_err(ConnectionError::Read)?,
                _ = shutdown_requested(shutdown) => return Ok(()),
            };
            if read == 0 {
                return Err(ConnectionError::Closed);
            }

            tracing::trace!("Received {:?}", String::from_utf8_lossy(&chunk[..read]));
            let readings = decoder.decode(&chunk[..read]);
            if !readings.is_empty() {
                self.handler.handle_readings(readings);
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        tracing::info!("Connection state: {}", state);
        self.state.send_replace(state);
    }
}

/// Resolves once shutdown is requested or its sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
