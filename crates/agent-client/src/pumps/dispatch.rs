//! Dispatch loop: the single-flight request lane.
//!
//! The LCS protocol carries no correlation ids: the i-th response on the
//! wire answers the i-th request. The only safe way to uphold that is to
//! never have two requests in flight, so all sends funnel through one
//! task that writes a frame, waits for exactly one decoded response (or
//! deadline / connection loss / cancellation), resolves the caller, and
//! only then takes the next request.

use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use lcs_protocol::frame::Frame;
use lcs_protocol::response::TypedResponse;

use crate::client::Shared;
use crate::error::ClientError;

/// One queued request: the frame to write and the caller's resolver.
pub(crate) struct Pending {
    pub(crate) frame: Frame,
    pub(crate) resolve: oneshot::Sender<Result<TypedResponse, ClientError>>,
}

/// Why the in-flight wait ended.
enum Outcome {
    Resolved(TypedResponse),
    Timeout,
    Lost,
    Cancelled,
}

pub(crate) async fn dispatch_loop<W>(
    shared: Arc<Shared>,
    conn_gen: u64,
    mut write: W,
    mut request_rx: mpsc::Receiver<Pending>,
    mut frames_rx: mpsc::Receiver<TypedResponse>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    let request_timeout = shared.config.request_timeout;

    // `true` when the loop ends because the transport died rather than
    // because of disconnect()/shutdown.
    let lost = loop {
        // Idle: wait for the next request. Responses arriving now have no
        // pending request (late replies to a timed-out command, or agent
        // chatter) and are dropped.
        let pending = tokio::select! {
            _ = cancel.cancelled() => break false,

            frame = frames_rx.recv() => {
                match frame {
                    Some(resp) => {
                        warn!(
                            opcode = %resp.opcode_hex(),
                            source = %resp.source,
                            "dropping spurious frame with no pending request"
                        );
                        continue;
                    }
                    None => break true,
                }
            }

            req = request_rx.recv() => match req {
                Some(p) => p,
                // Client handle dropped: treated like a disconnect.
                None => break false,
            },
        };

        if let Err(e) = write.write_all(&pending.frame.encode()).await {
            warn!("write failed: {e}");
            let _ = pending.resolve.send(Err(ClientError::ConnectionLost));
            break true;
        }

        let deadline = tokio::time::sleep(request_timeout);
        tokio::pin!(deadline);

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Outcome::Cancelled,
            _ = &mut deadline => Outcome::Timeout,
            frame = frames_rx.recv() => match frame {
                Some(resp) => Outcome::Resolved(resp),
                None => Outcome::Lost,
            },
        };

        match outcome {
            Outcome::Resolved(resp) => {
                let _ = pending.resolve.send(Ok(resp));
            }
            Outcome::Timeout => {
                debug!(
                    opcode = format_args!("0x{:04X}", pending.frame.opcode()),
                    "request deadline expired"
                );
                let _ = pending.resolve.send(Err(ClientError::Timeout));
            }
            Outcome::Cancelled => {
                let _ = pending.resolve.send(Err(ClientError::Cancelled));
                break false;
            }
            Outcome::Lost => {
                let _ = pending.resolve.send(Err(ClientError::ConnectionLost));
                break true;
            }
        }
    };

    // Fail everything still queued, in enqueue order.
    request_rx.close();
    while let Ok(pending) = request_rx.try_recv() {
        let err = if lost {
            ClientError::ConnectionLost
        } else {
            ClientError::Cancelled
        };
        let _ = pending.resolve.send(Err(err));
    }

    let _ = write.shutdown().await;
    shared.on_conn_closed(conn_gen, lost).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use lcs_protocol::ResponseKind;
    use lcs_protocol::response::interpret;

    use crate::types::AgentConfig;

    fn ack_response() -> TypedResponse {
        interpret(&Frame {
            dest: [0x13, 0x00, 0x00, 0x00, 0x00],
            src: [0x13, 0x01, 0x01, 0x00, 0x00],
            op1: 0x10,
            op2: 0x00,
            data: vec![0x00],
        })
    }

    fn request() -> Frame {
        Frame::request(0x13, 1, 1, 0x92, 0x00, vec![0x01, 0x05, 0x00, 0x50])
    }

    struct Lane {
        request_tx: mpsc::Sender<Pending>,
        frames_tx: mpsc::Sender<TypedResponse>,
        cancel: CancellationToken,
    }

    fn spawn_lane(timeout: Duration) -> Lane {
        let mut config = AgentConfig::new("127.0.0.1", 1);
        config.request_timeout = timeout;
        let shared = Shared::new(config);

        let (request_tx, request_rx) = mpsc::channel(8);
        let (frames_tx, frames_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        tokio::spawn(dispatch_loop(
            shared,
            0,
            tokio::io::sink(),
            request_rx,
            frames_rx,
            cancel.clone(),
        ));

        Lane {
            request_tx,
            frames_tx,
            cancel,
        }
    }

    async fn submit(lane: &Lane) -> oneshot::Receiver<Result<TypedResponse, ClientError>> {
        let (tx, rx) = oneshot::channel();
        lane.request_tx
            .send(Pending {
                frame: request(),
                resolve: tx,
            })
            .await
            .unwrap();
        rx
    }

    #[tokio::test]
    async fn response_resolves_pending() {
        let lane = spawn_lane(Duration::from_secs(5));
        let rx = submit(&lane).await;

        lane.frames_tx.send(ack_response()).await.unwrap();

        let resp = rx.await.unwrap().unwrap();
        assert!(matches!(resp.kind, ResponseKind::LampControlAck { ok: true }));
        lane.cancel.cancel();
    }

    #[tokio::test]
    async fn responses_resolve_in_enqueue_order() {
        let lane = spawn_lane(Duration::from_secs(5));
        let rx1 = submit(&lane).await;
        let rx2 = submit(&lane).await;

        let mut first = ack_response();
        first.source.cu = 1;
        let mut second = ack_response();
        second.source.cu = 2;
        lane.frames_tx.send(first).await.unwrap();
        lane.frames_tx.send(second).await.unwrap();

        assert_eq!(rx1.await.unwrap().unwrap().source.cu, 1);
        assert_eq!(rx2.await.unwrap().unwrap().source.cu, 2);
        lane.cancel.cancel();
    }

    #[tokio::test]
    async fn deadline_fails_head_and_lane_continues() {
        let lane = spawn_lane(Duration::from_millis(20));
        let rx1 = submit(&lane).await;

        assert!(matches!(rx1.await.unwrap(), Err(ClientError::Timeout)));

        // The lane keeps serving after a timeout.
        let rx2 = submit(&lane).await;
        lane.frames_tx.send(ack_response()).await.unwrap();
        assert!(rx2.await.unwrap().is_ok());
        lane.cancel.cancel();
    }

    #[tokio::test]
    async fn connection_loss_fails_all_pending_fifo() {
        let lane = spawn_lane(Duration::from_secs(5));
        let rx1 = submit(&lane).await;
        let rx2 = submit(&lane).await;
        let rx3 = submit(&lane).await;

        // Read pump gone: frames channel closes.
        drop(lane.frames_tx);

        for rx in [rx1, rx2, rx3] {
            assert!(matches!(rx.await.unwrap(), Err(ClientError::ConnectionLost)));
        }
    }

    #[tokio::test]
    async fn cancel_fails_pending_with_cancelled() {
        let lane = spawn_lane(Duration::from_secs(5));
        let rx1 = submit(&lane).await;
        let rx2 = submit(&lane).await;

        lane.cancel.cancel();

        assert!(matches!(rx1.await.unwrap(), Err(ClientError::Cancelled)));
        assert!(matches!(rx2.await.unwrap(), Err(ClientError::Cancelled)));
    }

    #[tokio::test]
    async fn spurious_frame_is_dropped() {
        let lane = spawn_lane(Duration::from_secs(5));

        // No pending request: the frame must be swallowed, not queued.
        lane.frames_tx.send(ack_response()).await.unwrap();
        tokio::task::yield_now().await;

        let rx = submit(&lane).await;
        lane.frames_tx.send(ack_response()).await.unwrap();
        assert!(rx.await.unwrap().is_ok());
        lane.cancel.cancel();
    }
}
