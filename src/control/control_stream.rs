use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::Mutex;
use tracing::{trace, warn};

use crate::control::control_message::ControlMessage;
use crate::error::{MoqtError, Result};
use crate::transport::{BiStream, RecvStream, SendStream};
use crate::util::buf_ext::{varint_len_from_first_byte, BufExt, BufMutExt};

/// Control message framing on the session's control stream:
///
/// ```ascii
/// type (i)
/// length (i)
/// payload (length bytes)
/// ```
///
/// Reads are sequential on one buffered reader, and every write of a complete frame happens
///  under a lock so that concurrent senders can not interleave their frames. A write that fails
///  or is abandoned part way leaves the stream unusable for writing: all later writes fail.
pub struct ControlStream {
    reader: Mutex<BufReader<RecvStream>>,
    writer: Mutex<FrameWriter>,
    max_message_len: usize,
}

struct FrameWriter {
    stream: BufWriter<SendStream>,
    /// set while a frame is written, and left set if that write did not complete
    incomplete_frame: bool,
}

impl ControlStream {
    pub fn new(stream: BiStream, max_message_len: usize) -> ControlStream {
        ControlStream {
            reader: Mutex::new(BufReader::new(stream.recv)),
            writer: Mutex::new(FrameWriter {
                stream: BufWriter::new(stream.send),
                incomplete_frame: false,
            }),
            max_message_len,
        }
    }

    pub async fn read_control_message(&self) -> Result<ControlMessage> {
        let mut reader = self.reader.lock().await;

        let type_id = read_varint(&mut *reader).await?;
        let len = read_varint(&mut *reader).await?;
        if len > self.max_message_len as u64 {
            warn!("control message of type {:#x} declares {} bytes, maximum is {}", type_id, len, self.max_message_len);
            return Err(MoqtError::protocol_violation(format!(
                "control message length {} exceeds maximum of {}", len, self.max_message_len)));
        }

        let mut payload = vec![0u8; len as usize];
        reader.read_exact(&mut payload).await?;
        trace!("received control message of type {:#x} with {} bytes", type_id, len);

        let msg = ControlMessage::try_deser(type_id, &payload);
        if let Err(e) = &msg {
            warn!("invalid control message of type {:#x}: {}", type_id, e);
        }
        msg
    }

    pub async fn write_control_message(&self, msg: &ControlMessage) -> Result<()> {
        let mut payload = BytesMut::new();
        msg.ser_payload(&mut payload)?;
        if payload.len() > self.max_message_len {
            return Err(MoqtError::protocol_violation(format!(
                "{:?} is {} bytes long, maximum is {}", msg.message_type(), payload.len(), self.max_message_len)));
        }

        let mut header = BytesMut::with_capacity(16);
        header.try_put_varint(msg.message_type().into())?;
        header.try_put_usize_varint(payload.len())?;

        let mut writer = self.writer.lock().await;
        if writer.incomplete_frame {
            warn!("not sending {:?}: an earlier frame was not written completely", msg.message_type());
            return Err(MoqtError::Transport(io::Error::new(io::ErrorKind::BrokenPipe,
                "control stream has an incomplete frame from an earlier write")));
        }
        writer.incomplete_frame = true;
        writer.stream.write_all(&header).await?;
        writer.stream.write_all(&payload).await?;
        writer.stream.flush().await?;
        writer.incomplete_frame = false;
        trace!("sent {:?} with {} bytes", msg.message_type(), payload.len());
        Ok(())
    }
}

/// Reads a single varint, waiting until all of its bytes are available
pub async fn read_varint<R: AsyncRead + Unpin + ?Sized>(r: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    buf[0] = r.read_u8().await?;
    let len = varint_len_from_first_byte(buf[0]);
    r.read_exact(&mut buf[1..len]).await?;

    let mut b: &[u8] = &buf[..len];
    b.try_get_varint()
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::time::Duration;

    use rstest::rstest;
    use tokio::io::{duplex, split, AsyncWriteExt};

    use super::*;
    use crate::control::request_id::MaxRequestId;
    use crate::control::setup::{ClientSetup, SetupParameter};

    /// a control stream whose peer is driven directly through the returned raw stream halves
    fn stream_with_raw_peer(max_message_len: usize) -> (ControlStream, BiStream) {
        let (local, remote) = duplex(64 * 1024);
        let (local_recv, local_send) = split(local);
        let (remote_recv, remote_send) = split(remote);
        let stream = ControlStream::new(BiStream { send: Box::new(local_send), recv: Box::new(local_recv) }, max_message_len);
        (stream, BiStream { send: Box::new(remote_send), recv: Box::new(remote_recv) })
    }

    fn pair() -> (ControlStream, ControlStream) {
        let (local, remote) = duplex(64 * 1024);
        let (local_recv, local_send) = split(local);
        let (remote_recv, remote_send) = split(remote);
        (
            ControlStream::new(BiStream { send: Box::new(local_send), recv: Box::new(local_recv) }, 65535),
            ControlStream::new(BiStream { send: Box::new(remote_send), recv: Box::new(remote_recv) }, 65535),
        )
    }

    #[tokio::test]
    async fn test_write_read() {
        let (a, b) = pair();
        let setup: ControlMessage = ClientSetup::new(vec![SetupParameter::Path.bytes("/x").unwrap()]).into();
        a.write_control_message(&setup).await.unwrap();
        a.write_control_message(&MaxRequestId { request_id: 7 }.into()).await.unwrap();

        assert_eq!(b.read_control_message().await.unwrap(), setup);
        assert_eq!(b.read_control_message().await.unwrap(), ControlMessage::from(MaxRequestId { request_id: 7 }));
    }

    #[tokio::test]
    async fn test_wire_format() {
        let (stream, mut peer) = stream_with_raw_peer(65535);
        stream.write_control_message(&MaxRequestId { request_id: 1000 }.into()).await.unwrap();

        let mut buf = [0u8; 4];
        peer.recv.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x15, 0x02, 0x43, 0xE8]);
    }

    #[rstest]
    #[case::length_mismatch(vec![0x20, 0x05, 0x01, 0x02, 0x0A, 0xFF, 0xFF])]
    #[case::unknown_type(vec![0x3F, 0x00])]
    #[case::not_implemented(vec![0x03, 0x00])]
    #[case::too_long(vec![0x20, 0x41, 0x01])]
    #[tokio::test]
    async fn test_read_protocol_violation(#[case] wire: Vec<u8>) {
        let (stream, mut peer) = stream_with_raw_peer(256);
        peer.send.write_all(&wire).await.unwrap();
        peer.send.flush().await.unwrap();

        let err = stream.read_control_message().await.unwrap_err();
        assert!(err.is_protocol_violation(), "{}", err);
    }

    #[tokio::test]
    async fn test_read_short_payload() {
        let (stream, mut peer) = stream_with_raw_peer(256);
        peer.send.write_all(&[0x20, 0x05, 0x01]).await.unwrap();
        drop(peer);

        assert!(matches!(stream.read_control_message().await, Err(MoqtError::Transport(_))));
    }

    #[tokio::test]
    async fn test_concurrent_writers_do_not_interleave() {
        let (a, b) = pair();
        let a = Arc::new(a);

        let mut handles = Vec::new();
        for i in 0..20u64 {
            let a = a.clone();
            handles.push(tokio::spawn(async move {
                let params = vec![SetupParameter::Implementation.bytes(vec![b'x'; 1000 + i as usize]).unwrap()];
                a.write_control_message(&ClientSetup::new(params).into()).await.unwrap();
            }));
        }

        let mut lengths = Vec::new();
        for _ in 0..20 {
            match b.read_control_message().await.unwrap() {
                ControlMessage::ClientSetup(setup) => lengths.push(setup.parameters[0].as_bytes().unwrap().len()),
                other => panic!("unexpected {:?}", other),
            }
        }
        for h in handles {
            h.await.unwrap();
        }
        lengths.sort();
        assert_eq!(lengths, (1000..1020).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_write_fails_later_writes() {
        let (a, b) = pair();
        let big: ControlMessage = ClientSetup::new(vec![SetupParameter::Implementation.bytes(vec![b'x'; 40_000]).unwrap()]).into();

        a.write_control_message(&big).await.unwrap();
        // nobody reads, so the second frame only fits into the pipe in part
        assert!(tokio::time::timeout(Duration::from_secs(1), a.write_control_message(&big)).await.is_err());

        assert!(matches!(a.write_control_message(&MaxRequestId { request_id: 5000 }.into()).await, Err(MoqtError::Transport(_))));
        assert_eq!(b.read_control_message().await.unwrap(), big);
    }

    #[tokio::test]
    async fn test_read_varint() {
        let mut b: &[u8] = &[0x9d, 0x7f, 0x3e, 0x7d, 0x01];
        assert_eq!(read_varint(&mut b).await.unwrap(), 494878333);
        assert_eq!(read_varint(&mut b).await.unwrap(), 1);
        assert!(read_varint(&mut b).await.is_err());
    }
}
