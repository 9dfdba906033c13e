//! Read pump: re-assembles the TCP stream into interpreted responses.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use lcs_protocol::frame::{DecodeResult, try_decode};
use lcs_protocol::response::{TypedResponse, interpret};

/// Initial capacity of the re-assembly buffer. Frames are small (≤ 84
/// bytes for the largest block command), so this never grows in practice.
const READ_BUF_CAPACITY: usize = 4096;

/// Reads the socket until EOF, error or cancellation.
///
/// Every chunk lands in a [`BytesMut`]; the decoder is applied until it
/// reports an incomplete tail. Corrupt stretches are logged and skipped:
/// framing loss is absorbed here and never fails a caller directly.
/// Decoded frames are interpreted and forwarded to the dispatch loop;
/// pump exit closes that channel, which the dispatcher treats as
/// connection loss.
pub(crate) async fn read_pump<R>(
    mut read: R,
    frames_tx: mpsc::Sender<TypedResponse>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(READ_BUF_CAPACITY);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            result = read.read_buf(&mut buf) => {
                match result {
                    Ok(0) => {
                        debug!("agent closed the connection");
                        break;
                    }
                    Ok(_) => {
                        if !drain_frames(&mut buf, &frames_tx).await {
                            return;
                        }
                    }
                    Err(e) => {
                        warn!("read error: {e}");
                        break;
                    }
                }
            }
        }
    }
}

/// Decodes every complete frame in `buf`. Returns `false` when the
/// dispatcher side is gone and the pump should stop.
async fn drain_frames(buf: &mut BytesMut, frames_tx: &mpsc::Sender<TypedResponse>) -> bool {
    while !buf.is_empty() {
        match try_decode(buf) {
            DecodeResult::Frame(frame, consumed) => {
                trace!(opcode = format_args!("0x{:04X}", frame.opcode()), "frame received");
                let response = interpret(&frame);
                buf.advance(consumed);
                if frames_tx.send(response).await.is_err() {
                    return false;
                }
            }
            DecodeResult::Incomplete => break,
            DecodeResult::Corrupt { skip, reason } => {
                warn!(reason, "frame corrupt, resynchronizing");
                buf.advance(skip);
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use lcs_protocol::ResponseKind;
    use lcs_protocol::frame::Frame;

    fn ack_frame() -> Frame {
        Frame {
            dest: [0x13, 0x00, 0x00, 0x00, 0x00],
            src: [0x13, 0x01, 0x01, 0x00, 0x00],
            op1: 0x10,
            op2: 0x00,
            data: vec![0x00],
        }
    }

    #[tokio::test]
    async fn pump_decodes_and_forwards() {
        let (frames_tx, mut frames_rx) = mpsc::channel(8);
        let bytes = ack_frame().encode();

        read_pump(&bytes[..], frames_tx, CancellationToken::new()).await;

        let resp = frames_rx.recv().await.expect("one response");
        assert!(matches!(resp.kind, ResponseKind::LampControlAck { ok: true }));
        assert!(frames_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn pump_skips_garbage_prefix() {
        let (frames_tx, mut frames_rx) = mpsc::channel(8);
        let mut bytes = vec![0xFF, 0x17, 0x55];
        bytes.extend_from_slice(&ack_frame().encode());

        read_pump(&bytes[..], frames_tx, CancellationToken::new()).await;

        assert!(frames_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn pump_reassembles_split_frames() {
        let (frames_tx, mut frames_rx) = mpsc::channel(8);
        let bytes = ack_frame().encode();
        let (client, mut server) = tokio::io::duplex(64);

        let pump = tokio::spawn(read_pump(client, frames_tx, CancellationToken::new()));

        // Deliver one byte at a time.
        for b in bytes {
            tokio::io::AsyncWriteExt::write_all(&mut server, &[b])
                .await
                .unwrap();
            tokio::task::yield_now().await;
        }
        drop(server);

        pump.await.unwrap();
        assert!(frames_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn pump_stops_on_cancel() {
        let (frames_tx, _frames_rx) = mpsc::channel(8);
        let (client, _server) = tokio::io::duplex(64);
        let cancel = CancellationToken::new();

        let c = cancel.clone();
        let handle = tokio::spawn(read_pump(client, frames_tx, c));

        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .expect("should stop")
            .expect("no panic");
    }
}
