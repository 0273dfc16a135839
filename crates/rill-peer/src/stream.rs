//! Buffered, framed stream I/O.
//!
//! Wraps a transport stream in buffered reader/writer halves and speaks the
//! datagram framing: a u32 big-endian body length followed by the encoded
//! datagram body. One datagram per write/flush, one per read cycle; there is
//! no fragmentation or reassembly across reads. Writes are not delivered
//! until flushed — [`FramedStream::write_datagram`] flushes.

use bytes::BytesMut;
use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, ReadHalf, WriteHalf,
};

use rill_core::wire::{CodecRegistry, Datagram, DecodeError};

use crate::error::{PeerError, SendError};

pub struct FramedStream<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: BufWriter<WriteHalf<S>>,
    max_datagram: usize,
}

impl<S: AsyncRead + AsyncWrite> FramedStream<S> {
    pub fn new(stream: S, max_datagram: usize) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
            max_datagram,
        }
    }

    /// Read one datagram frame and decode it.
    ///
    /// The length prefix is validated against the datagram limit before any
    /// buffer is allocated.
    pub async fn read_datagram(&mut self, registry: &CodecRegistry) -> Result<Datagram, PeerError> {
        let mut len_bytes = [0u8; 4];
        self.reader.read_exact(&mut len_bytes).await?;
        let len = u32::from_be_bytes(len_bytes) as usize;
        if len > self.max_datagram {
            return Err(DecodeError::TooLarge {
                len,
                max: self.max_datagram,
            }
            .into());
        }

        let mut body = BytesMut::zeroed(len);
        self.reader.read_exact(&mut body).await?;
        Ok(registry.decode_datagram(&body)?)
    }

    /// Encode one datagram, write its frame, and flush.
    pub async fn write_datagram(
        &mut self,
        registry: &CodecRegistry,
        datagram: &Datagram,
    ) -> Result<(), SendError> {
        let body = registry.encode_datagram(datagram)?;
        if body.len() > self.max_datagram {
            return Err(SendError::Oversized(body.len()));
        }

        self.writer
            .write_all(&(body.len() as u32).to_be_bytes())
            .await?;
        self.writer.write_all(&body).await?;
        self.writer.flush().await?;
        Ok(())
    }
}
