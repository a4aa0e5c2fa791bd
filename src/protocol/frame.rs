//! Encrypted frame channel.
//!
//! Wire layout per frame: `length:u16 BE | type:u8 | ciphertext`, where
//! `length` covers the ciphertext including its AEAD tag. A [`Session`]
//! owns the AEAD state for one connection and keeps an independent nonce
//! counter per direction, each behind its own lock so the request and
//! response pumps never serialize against each other.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::crypto::{Aead, AeadKey, Nonce};
use crate::error::{Error, Result};

/// Frame header size: 2 bytes length + 1 byte type.
pub const FRAME_HEADER_SIZE: usize = 3;

/// Maximum plaintext bytes per frame.
pub const MAX_FRAME_PAYLOAD: usize = 16384;

/// Reflex frame types.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// Application payload (the first DATA frame also carries the destination).
    Data = 0x01,
    /// Padding bytes, or a 2-byte control payload steering the peer's next
    /// packet size.
    Padding = 0x02,
    /// An 8-byte control payload steering the peer's next inter-frame delay.
    Timing = 0x03,
    /// Graceful end of this direction.
    Close = 0x04,
}

impl FrameType {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            0x01 => Ok(Self::Data),
            0x02 => Ok(Self::Padding),
            0x03 => Ok(Self::Timing),
            0x04 => Ok(Self::Close),
            other => Err(Error::UnknownFrame(other)),
        }
    }
}

/// A decrypted protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub frame_type: FrameType,
    pub payload: Vec<u8>,
}

/// AEAD encryption state for one Reflex connection.
///
/// The read and write nonce counters are independent monotonic sequences;
/// each is read-and-incremented under its own async mutex, which also
/// serializes the surrounding I/O so header and ciphertext stay ordered.
pub struct Session {
    aead: Aead,
    read_nonce: Mutex<u64>,
    write_nonce: Mutex<u64>,
}

impl Session {
    /// Create a session from a 32-byte key.
    ///
    /// Any other key length is rejected with [`Error::BadKey`].
    pub fn new(session_key: &[u8]) -> Result<Self> {
        let key = AeadKey::from_slice(session_key)?;
        Ok(Self {
            aead: Aead::new(&key),
            read_nonce: Mutex::new(0),
            write_nonce: Mutex::new(0),
        })
    }

    /// Encrypt and write a single frame.
    ///
    /// `data` must not exceed [`MAX_FRAME_PAYLOAD`].
    pub async fn write_frame<W>(&self, writer: &mut W, frame_type: FrameType, data: &[u8]) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        debug_assert!(data.len() <= MAX_FRAME_PAYLOAD);

        let mut counter = self.write_nonce.lock().await;
        let nonce = Nonce::from_counter(*counter);
        let sealed = self.aead.seal(&nonce, data)?;

        let mut header = [0u8; FRAME_HEADER_SIZE];
        header[0..2].copy_from_slice(&(sealed.len() as u16).to_be_bytes());
        header[2] = frame_type as u8;

        writer.write_all(&header).await?;
        writer.write_all(&sealed).await?;
        *counter += 1;
        Ok(())
    }

    /// Read and decrypt a single frame.
    ///
    /// A zero-length frame yields an empty payload without consuming
    /// ciphertext and without advancing the read counter.
    pub async fn read_frame<R>(&self, reader: &mut R) -> Result<Frame>
    where
        R: AsyncRead + Unpin,
    {
        let mut counter = self.read_nonce.lock().await;

        let mut header = [0u8; FRAME_HEADER_SIZE];
        reader.read_exact(&mut header).await?;

        let length = u16::from_be_bytes([header[0], header[1]]) as usize;
        let frame_type = FrameType::from_u8(header[2])?;

        if length == 0 {
            return Ok(Frame {
                frame_type,
                payload: Vec::new(),
            });
        }

        let mut sealed = vec![0u8; length];
        reader.read_exact(&mut sealed).await?;

        let nonce = Nonce::from_counter(*counter);
        let payload = self.aead.open(&nonce, &sealed)?;
        *counter += 1;

        Ok(Frame {
            frame_type,
            payload,
        })
    }

    /// Send a CLOSE frame signalling the end of this direction.
    pub async fn write_close<W>(&self, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        self.write_frame(writer, FrameType::Close, &[]).await
    }

    /// Send a PADDING frame carrying opaque filler bytes.
    pub async fn write_padding<W>(&self, writer: &mut W, padding: &[u8]) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        self.write_frame(writer, FrameType::Padding, padding).await
    }

    /// Instruct the peer to use a specific wire size for its next frame.
    pub async fn send_padding_ctrl<W>(&self, writer: &mut W, target_size: u16) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        self.write_frame(writer, FrameType::Padding, &encode_padding_ctrl(target_size))
            .await
    }

    /// Instruct the peer to apply a specific delay before its next frame.
    pub async fn send_timing_ctrl<W>(&self, writer: &mut W, delay: Duration) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        self.write_frame(writer, FrameType::Timing, &encode_timing_ctrl(delay))
            .await
    }
}

/// Encode a PADDING control payload carrying the target wire size.
pub fn encode_padding_ctrl(target_size: u16) -> [u8; 2] {
    target_size.to_be_bytes()
}

/// Encode a TIMING control payload carrying the delay in milliseconds.
pub fn encode_timing_ctrl(delay: Duration) -> [u8; 8] {
    (delay.as_millis() as u64).to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{SecureRandom, TAG_SIZE};

    fn test_key() -> [u8; 32] {
        SecureRandom::bytes()
    }

    fn paired_sessions() -> (Session, Session) {
        let key = test_key();
        (Session::new(&key).unwrap(), Session::new(&key).unwrap())
    }

    #[test]
    fn test_session_rejects_bad_key_lengths() {
        assert!(Session::new(&[0u8; 32]).is_ok());
        assert!(matches!(Session::new(&[0u8; 5]), Err(Error::BadKey(5))));
        assert!(matches!(Session::new(&[0u8; 64]), Err(Error::BadKey(64))));
        assert!(Session::new(&[]).is_err());
    }

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let (writer, reader) = paired_sessions();
        let mut buf = Vec::new();

        writer
            .write_frame(&mut buf, FrameType::Data, b"hello, reflex protocol!")
            .await
            .unwrap();

        let frame = reader.read_frame(&mut buf.as_slice()).await.unwrap();
        assert_eq!(frame.frame_type, FrameType::Data);
        assert_eq!(frame.payload, b"hello, reflex protocol!");
    }

    #[tokio::test]
    async fn test_multiple_frames_in_order() {
        let (writer, reader) = paired_sessions();
        let mut buf = Vec::new();

        let messages = ["first", "second", "third", "fourth", "fifth"];
        for msg in messages {
            writer
                .write_frame(&mut buf, FrameType::Data, msg.as_bytes())
                .await
                .unwrap();
        }

        let mut cursor = buf.as_slice();
        for msg in messages {
            let frame = reader.read_frame(&mut cursor).await.unwrap();
            assert_eq!(frame.payload, msg.as_bytes());
        }
    }

    #[tokio::test]
    async fn test_all_frame_types() {
        for ty in [
            FrameType::Data,
            FrameType::Padding,
            FrameType::Timing,
            FrameType::Close,
        ] {
            let (writer, reader) = paired_sessions();
            let mut buf = Vec::new();

            writer.write_frame(&mut buf, ty, b"test").await.unwrap();
            let frame = reader.read_frame(&mut buf.as_slice()).await.unwrap();
            assert_eq!(frame.frame_type, ty);
        }
    }

    #[tokio::test]
    async fn test_unknown_frame_type_rejected() {
        let (writer, reader) = paired_sessions();
        let mut buf = Vec::new();
        writer
            .write_frame(&mut buf, FrameType::Data, b"x")
            .await
            .unwrap();

        buf[2] = 0x7f;
        let result = reader.read_frame(&mut buf.as_slice()).await;
        assert!(matches!(result, Err(Error::UnknownFrame(0x7f))));
    }

    #[tokio::test]
    async fn test_wrong_key_fails() {
        let writer = Session::new(&test_key()).unwrap();
        let reader = Session::new(&test_key()).unwrap();
        let mut buf = Vec::new();

        writer
            .write_frame(&mut buf, FrameType::Data, b"secret")
            .await
            .unwrap();

        let result = reader.read_frame(&mut buf.as_slice()).await;
        assert!(matches!(result, Err(Error::AeadOpen)));
    }

    #[tokio::test]
    async fn test_large_payload_integrity() {
        let (writer, reader) = paired_sessions();
        let mut buf = Vec::new();

        let original = crate::crypto::random_padding(MAX_FRAME_PAYLOAD);
        writer
            .write_frame(&mut buf, FrameType::Data, &original)
            .await
            .unwrap();
        assert_eq!(buf.len(), FRAME_HEADER_SIZE + original.len() + TAG_SIZE);

        let frame = reader.read_frame(&mut buf.as_slice()).await.unwrap();
        assert_eq!(frame.payload, original);
    }

    #[tokio::test]
    async fn test_empty_plaintext_frame() {
        let (writer, reader) = paired_sessions();
        let mut buf = Vec::new();

        writer
            .write_frame(&mut buf, FrameType::Data, &[])
            .await
            .unwrap();

        let frame = reader.read_frame(&mut buf.as_slice()).await.unwrap();
        assert!(frame.payload.is_empty());
    }

    #[tokio::test]
    async fn test_zero_length_frame_skips_read_counter() {
        let (writer, reader) = paired_sessions();

        // A hand-crafted zero-length frame carries no ciphertext; reading it
        // must not consume a nonce.
        let mut buf = vec![0x00, 0x00, FrameType::Padding as u8];
        writer
            .write_frame(&mut buf, FrameType::Data, b"after")
            .await
            .unwrap();

        let mut cursor = buf.as_slice();
        let empty = reader.read_frame(&mut cursor).await.unwrap();
        assert_eq!(empty.frame_type, FrameType::Padding);
        assert!(empty.payload.is_empty());

        // The next real frame still opens under counter 0
        let frame = reader.read_frame(&mut cursor).await.unwrap();
        assert_eq!(frame.payload, b"after");
    }

    #[tokio::test]
    async fn test_incomplete_header_errors() {
        let (_, reader) = paired_sessions();
        let buf = [0x00u8, 0x05];
        assert!(reader.read_frame(&mut buf.as_slice()).await.is_err());
    }

    #[tokio::test]
    async fn test_truncated_ciphertext_errors() {
        let (writer, reader) = paired_sessions();
        let mut buf = Vec::new();
        writer
            .write_frame(&mut buf, FrameType::Data, b"payload")
            .await
            .unwrap();

        buf.truncate(buf.len() - 4);
        assert!(reader.read_frame(&mut buf.as_slice()).await.is_err());
    }

    #[tokio::test]
    async fn test_close_frame_helper() {
        let (writer, reader) = paired_sessions();
        let mut buf = Vec::new();

        writer.write_close(&mut buf).await.unwrap();
        let frame = reader.read_frame(&mut buf.as_slice()).await.unwrap();
        assert_eq!(frame.frame_type, FrameType::Close);
        assert!(frame.payload.is_empty());
    }

    #[tokio::test]
    async fn test_padding_frame_helper() {
        let (writer, reader) = paired_sessions();
        let mut buf = Vec::new();

        let padding = crate::crypto::random_padding(128);
        writer.write_padding(&mut buf, &padding).await.unwrap();

        let frame = reader.read_frame(&mut buf.as_slice()).await.unwrap();
        assert_eq!(frame.frame_type, FrameType::Padding);
        assert_eq!(frame.payload, padding);
    }

    #[tokio::test]
    async fn test_control_frame_payloads() {
        let (writer, reader) = paired_sessions();
        let mut buf = Vec::new();

        writer.send_padding_ctrl(&mut buf, 1024).await.unwrap();
        writer
            .send_timing_ctrl(&mut buf, Duration::from_millis(50))
            .await
            .unwrap();

        let mut cursor = buf.as_slice();
        let padding = reader.read_frame(&mut cursor).await.unwrap();
        assert_eq!(padding.frame_type, FrameType::Padding);
        assert_eq!(padding.payload, 1024u16.to_be_bytes());

        let timing = reader.read_frame(&mut cursor).await.unwrap();
        assert_eq!(timing.frame_type, FrameType::Timing);
        assert_eq!(timing.payload, 50u64.to_be_bytes());
    }

    #[tokio::test]
    async fn test_interleaved_directions_stay_independent() {
        let key = test_key();
        let client = Session::new(&key).unwrap();
        let server = Session::new(&key).unwrap();

        let mut client_to_server = Vec::new();
        let mut server_to_client = Vec::new();

        // Interleave writes on both directions; each uses its own counter.
        for i in 0u8..4 {
            client
                .write_frame(&mut client_to_server, FrameType::Data, &[i])
                .await
                .unwrap();
            server
                .write_frame(&mut server_to_client, FrameType::Data, &[i ^ 0xff])
                .await
                .unwrap();
        }

        let mut cursor = client_to_server.as_slice();
        for i in 0u8..4 {
            let frame = server.read_frame(&mut cursor).await.unwrap();
            assert_eq!(frame.payload, [i]);
        }

        let mut cursor = server_to_client.as_slice();
        for i in 0u8..4 {
            let frame = client.read_frame(&mut cursor).await.unwrap();
            assert_eq!(frame.payload, [i ^ 0xff]);
        }
    }

    #[tokio::test]
    async fn test_concurrent_write_read_over_duplex() {
        let key = test_key();
        let writer_sess = Session::new(&key).unwrap();
        let reader_sess = Session::new(&key).unwrap();

        let (client, server) = tokio::io::duplex(4096);
        let (_, mut client_write) = tokio::io::split(client);
        let (mut server_read, _) = tokio::io::split(server);

        let messages = ["alpha", "bravo", "charlie", "delta"];

        let send = tokio::spawn(async move {
            for msg in messages {
                writer_sess
                    .write_frame(&mut client_write, FrameType::Data, msg.as_bytes())
                    .await
                    .unwrap();
            }
        });

        for expected in messages {
            let frame = reader_sess.read_frame(&mut server_read).await.unwrap();
            assert_eq!(frame.payload, expected.as_bytes());
        }

        send.await.unwrap();
    }
}
