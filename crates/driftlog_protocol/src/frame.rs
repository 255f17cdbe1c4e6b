//! Length-prefixed CBOR framing.
//!
//! ```text
//! | body_len (4, BE) | CBOR body (body_len) |
//! ```

use crate::error::{ProtocolError, ProtocolResult};
use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the frame length prefix.
pub const HEADER_SIZE: usize = 4;

/// Largest accepted frame body (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Encodes `message` into a complete frame.
///
/// # Errors
///
/// Returns an error if serialization fails or the body exceeds
/// [`MAX_FRAME_SIZE`].
pub fn encode_frame<T: Serialize>(message: &T) -> ProtocolResult<Bytes> {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + 64);
    buf.put_u32(0);
    ciborium::into_writer(message, (&mut buf).writer()).map_err(ProtocolError::encode)?;

    let size = buf.len() - HEADER_SIZE;
    let len = u32::try_from(size)
        .ok()
        .filter(|_| size <= MAX_FRAME_SIZE)
        .ok_or(ProtocolError::FrameTooLarge {
            size,
            max: MAX_FRAME_SIZE,
        })?;
    buf[..HEADER_SIZE].copy_from_slice(&len.to_be_bytes());
    Ok(buf.freeze())
}

/// Decodes a frame body (without its length prefix).
///
/// # Errors
///
/// Returns [`ProtocolError::Decode`] if the body is not a valid `T`.
pub fn decode_body<T: DeserializeOwned>(body: &[u8]) -> ProtocolResult<T> {
    ciborium::from_reader(body).map_err(ProtocolError::decode)
}

/// Writes one frame and flushes.
///
/// # Errors
///
/// Returns an error if encoding or the write fails.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> ProtocolResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode_frame(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame.
///
/// Returns `Ok(None)` on a clean end of stream before a frame starts.
///
/// # Errors
///
/// Returns an error if the stream ends mid-frame, the announced size
/// exceeds [`MAX_FRAME_SIZE`], or the body fails to decode.
pub async fn read_frame<R, T>(reader: &mut R) -> ProtocolResult<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut header = [0u8; HEADER_SIZE];
    if reader.read(&mut header[..1]).await? == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut header[1..]).await?;

    let size = u32::from_be_bytes(header) as usize;
    if size > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut body = BytesMut::zeroed(size);
    reader.read_exact(&mut body).await?;
    decode_body(&body).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{AppendRequest, ReadRequest, ReadResponse, Request, Response};
    use crate::status::Status;
    use driftlog_core::Record;

    #[tokio::test]
    async fn request_over_duplex() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let request = Request::Append(AppendRequest {
            record: Record::new(b"hello world".to_vec()),
        });

        write_frame(&mut client, &request).await.unwrap();
        let read: Request = read_frame(&mut server).await.unwrap().unwrap();
        assert_eq!(read, request);
    }

    #[tokio::test]
    async fn clean_eof_is_none() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);

        let read: Option<Request> = read_frame(&mut server).await.unwrap();
        assert!(read.is_none());
    }

    #[tokio::test]
    async fn eof_mid_frame_is_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let frame = encode_frame(&Request::Read(ReadRequest { offset: 3 })).unwrap();
        client.write_all(&frame[..frame.len() - 1]).await.unwrap();
        drop(client);

        let err = read_frame::<_, Request>(&mut server).await.unwrap_err();
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn oversized_header_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let size = (MAX_FRAME_SIZE as u32) + 1;
        client.write_all(&size.to_be_bytes()).await.unwrap();

        let err = read_frame::<_, Request>(&mut server).await.unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { .. }));
    }

    #[test]
    fn header_holds_body_length() {
        let frame = encode_frame(&Response::Error(Status::out_of_range(9))).unwrap();
        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&frame[..HEADER_SIZE]);

        assert_eq!(u32::from_be_bytes(header) as usize, frame.len() - HEADER_SIZE);
        let decoded: Response = decode_body(&frame[HEADER_SIZE..]).unwrap();
        assert_eq!(decoded, Response::Error(Status::out_of_range(9)));
    }

    #[test]
    fn garbage_body_is_decode_error() {
        let err = decode_body::<Request>(&[0xff, 0x00, 0x13]).unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn arbitrary_bodies_never_panic(body in prop::collection::vec(any::<u8>(), 0..256)) {
                let _ = decode_body::<Request>(&body);
                let _ = decode_body::<Response>(&body);
            }

            #[test]
            fn appended_value_survives_framing(value in prop::collection::vec(any::<u8>(), 0..512), offset in any::<u64>()) {
                let record = Record { value, offset };
                let frame = encode_frame(&Response::Read(ReadResponse { record: record.clone() })).unwrap();
                let decoded: Response = decode_body(&frame[HEADER_SIZE..]).unwrap();
                prop_assert_eq!(decoded, Response::Read(ReadResponse { record }));
            }
        }
    }
}
