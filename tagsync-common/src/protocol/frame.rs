use super::{
    Command, ProtocolError, ProtocolResult, Request, Response, Status, CHUNK_SIZE,
    MAX_PAYLOAD_BYTES, MAX_TAG_COUNT, SENTINEL,
};
use crate::layout::Clip;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{trace, warn};

/// Decodes frames from a byte stream
///
/// Waiting for the next sentinel has no deadline; a connection may sit idle
/// indefinitely between frames. Once a sentinel is seen, every fixed-size read
/// must make progress within `read_timeout` or the frame fails with
/// [`ProtocolError::Timeout`].
pub struct FrameReader<R> {
    inner: R,
    read_timeout: Duration,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, read_timeout: Duration) -> Self {
        Self {
            inner,
            read_timeout,
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Next client request, or `None` when the peer closed the stream between frames
    pub async fn next_request(&mut self) -> ProtocolResult<Option<Request>> {
        let Some(command) = self.next_command().await? else {
            return Ok(None);
        };

        let request = match command {
            Command::Image => Request::Image {
                row: self.read_u32().await?,
            },
            Command::TagList => Request::TagList,
            Command::SetTags => {
                let begin = self.read_u32().await?;
                let end = self.read_u32().await?;
                let count = self.read_len("tag count", MAX_TAG_COUNT).await?;
                let raw = self.read_vec(count).await?;
                Request::SetTags {
                    begin,
                    end,
                    values: raw.into_iter().map(|b| b == 0x01).collect(),
                }
            }
            Command::Save => Request::Save,
            Command::ClipLayout => Request::ClipLayout,
            Command::RowTable => Request::RowTable,
        };
        Ok(Some(request))
    }

    /// Next server response, or `None` when the peer closed the stream between frames
    pub async fn next_response(&mut self) -> ProtocolResult<Option<Response>> {
        let Some(command) = self.next_command().await? else {
            return Ok(None);
        };

        let status = Status::from_byte(self.read_u8().await?);
        let response = match command {
            Command::Image => {
                let row = self.read_u32().await?;
                let len = self.read_len("image", MAX_PAYLOAD_BYTES).await?;
                let bytes = self.read_vec(len).await?;
                if status.is_ok() {
                    Response::ImageData { row, bytes }
                } else {
                    Response::ImageError {
                        row,
                        message: into_string(bytes, "image error")?,
                    }
                }
            }
            Command::TagList => {
                let count = self.read_len("tag count", MAX_TAG_COUNT).await?;
                let mut aliases = Vec::with_capacity(count);
                for _ in 0..count {
                    let len = self.read_len("alias", MAX_PAYLOAD_BYTES).await?;
                    aliases.push(into_string(self.read_vec(len).await?, "alias")?);
                }
                Response::TagList { status, aliases }
            }
            Command::SetTags => Response::SetTags { status },
            Command::Save => Response::Save { status },
            Command::ClipLayout => {
                let mut clips = Vec::new();
                if status.is_ok() {
                    let count = self.read_len("clip count", MAX_PAYLOAD_BYTES / 12).await?;
                    clips.reserve(count);
                    for _ in 0..count {
                        let begin = self.read_u32().await?;
                        let end = self.read_u32().await?;
                        let view_count = self.read_u32().await?;
                        clips.push(Clip::new(begin, end, view_count));
                    }
                }
                Response::ClipLayout { status, clips }
            }
            Command::RowTable => {
                let len = self.read_len("row table", MAX_PAYLOAD_BYTES).await?;
                let table = into_string(self.read_vec(len).await?, "row table")?;
                Response::RowTable { status, table }
            }
        };
        Ok(Some(response))
    }

    /// Scan for a sentinel followed by a known command byte
    async fn next_command(&mut self) -> ProtocolResult<Option<Command>> {
        let mut byte = [0u8; 1];
        loop {
            if self.inner.read(&mut byte).await? == 0 {
                return Ok(None);
            }
            if byte[0] != SENTINEL {
                trace!("Dropping stray byte {:#04x}", byte[0]);
                continue;
            }

            // A run of sentinels still marks a single frame start
            let mut cmd = self.read_u8().await?;
            while cmd == SENTINEL {
                cmd = self.read_u8().await?;
            }

            match Command::try_from(cmd) {
                Ok(command) => {
                    trace!("Frame header matched: {:?}", command);
                    return Ok(Some(command));
                }
                Err(unknown) => {
                    warn!("Unknown command byte {:#04x}, peer version mismatch?", unknown);
                }
            }
        }
    }

    async fn read_u8(&mut self) -> ProtocolResult<u8> {
        let mut buf = [0u8; 1];
        self.fill(&mut buf).await?;
        Ok(buf[0])
    }

    async fn read_u32(&mut self) -> ProtocolResult<u32> {
        let mut buf = [0u8; 4];
        self.fill(&mut buf).await?;
        Ok(u32::from_be_bytes(buf))
    }

    async fn read_len(&mut self, field: &'static str, limit: u32) -> ProtocolResult<usize> {
        let len = self.read_u32().await?;
        if len > limit {
            return Err(ProtocolError::PayloadTooLarge { field, len, limit });
        }
        Ok(len as usize)
    }

    /// Read exactly `len` bytes, one chunk at a time
    async fn read_vec(&mut self, len: usize) -> ProtocolResult<Vec<u8>> {
        let mut data = vec![0u8; len];
        for chunk in data.chunks_mut(CHUNK_SIZE) {
            self.fill(chunk).await?;
        }
        Ok(data)
    }

    /// Fill `buf` completely, failing if a read stalls past the timeout
    async fn fill(&mut self, buf: &mut [u8]) -> ProtocolResult<()> {
        let mut received = 0;
        while received < buf.len() {
            match timeout(self.read_timeout, self.inner.read(&mut buf[received..])).await {
                Err(_) => {
                    return Err(ProtocolError::Timeout {
                        expected: buf.len(),
                        received,
                    })
                }
                Ok(Ok(0)) => return Err(ProtocolError::Closed),
                Ok(Ok(n)) => received += n,
                Ok(Err(e)) => return Err(ProtocolError::Io(e)),
            }
        }
        Ok(())
    }
}

fn into_string(bytes: Vec<u8>, field: &'static str) -> ProtocolResult<String> {
    String::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8(field))
}

/// Encodes frames onto a byte stream
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub async fn send_request(&mut self, request: &Request) -> ProtocolResult<()> {
        self.inner.write_all(&request.encode()).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Write a response frame
    ///
    /// Image bytes follow the declared length in fixed-size chunks.
    pub async fn send_response(&mut self, response: &Response) -> ProtocolResult<()> {
        match response {
            Response::ImageData { bytes, .. } => {
                self.inner.write_all(&response.encode_header()).await?;
                for chunk in bytes.chunks(CHUNK_SIZE) {
                    self.inner.write_all(chunk).await?;
                }
            }
            _ => self.inner.write_all(&response.encode()).await?,
        }
        self.inner.flush().await?;
        Ok(())
    }
}
