use async_trait::async_trait;
use thiserror::Error;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};
use tracing::info;

#[derive(Debug, Error)]
pub enum PropError {
    #[error("prop controller is not connected")]
    NotConnected,
    #[error("failed to deliver prop command {frame}: {source}")]
    Delivery {
        frame: String,
        #[source]
        source: std::io::Error,
    },
}

/// Wire frame for one prop command, e.g. `CMD|0F|0A|$`.
pub fn encode_command(code: u8) -> String {
    format!("CMD|0F|{code:02X}|$")
}

/// A physical prop driven alongside the slides. Callers must never let a
/// failure here hold up navigation.
#[async_trait]
pub trait PropController: Send + Sync {
    async fn send_command(&self, code: u8) -> Result<(), PropError>;
    fn is_connected(&self) -> bool;
}

/// Logs each frame instead of transmitting it.
#[derive(Debug, Default)]
pub struct LoggingPropController;

#[async_trait]
impl PropController for LoggingPropController {
    async fn send_command(&self, code: u8) -> Result<(), PropError> {
        info!(frame = %encode_command(code), "prop command");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }
}

#[derive(Debug, Default)]
pub struct DisconnectedPropController;

#[async_trait]
impl PropController for DisconnectedPropController {
    async fn send_command(&self, _code: u8) -> Result<(), PropError> {
        Err(PropError::NotConnected)
    }

    fn is_connected(&self) -> bool {
        false
    }
}

/// Writes frames to any byte sink: a serial device file, a socket, a pipe.
pub struct WriterPropController<W> {
    writer: Mutex<W>,
}

impl<W> WriterPropController<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W> PropController for WriterPropController<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send_command(&self, code: u8) -> Result<(), PropError> {
        let frame = encode_command(code);
        let mut writer = self.writer.lock().await;
        let result = async {
            writer.write_all(frame.as_bytes()).await?;
            writer.flush().await
        }
        .await;
        result.map_err(|source| PropError::Delivery { frame, source })
    }

    fn is_connected(&self) -> bool {
        true
    }
}
