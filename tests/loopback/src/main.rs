fn main() {
    println!("Run `cargo test -p wire-loopback` to execute the loopback tests.");
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use lcs_agent_client::{AgentClient, AgentConfig, ClientError, ConnectionState};
    use lcs_agent_manager::AgentManager;
    use lcs_protocol::frame::{DecodeResult, Frame, try_decode};
    use lcs_protocol::response::ResponseKind;
    use lcs_protocol::types::DeviceType;

    /// Reads and decodes exactly one frame from the socket.
    async fn read_frame(stream: &mut TcpStream) -> Frame {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 256];
        loop {
            if let DecodeResult::Frame(frame, consumed) = try_decode(&buf) {
                buf.drain(..consumed);
                return frame;
            }
            let n = stream.read(&mut chunk).await.expect("mock agent read");
            assert!(n > 0, "client closed while the mock expected a frame");
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    fn ack_for(request: &Frame) -> Frame {
        Frame {
            dest: request.src,
            src: request.dest,
            op1: 0x10,
            op2: 0x00,
            data: vec![0x00],
        }
    }

    async fn client_for(addr: SocketAddr) -> AgentClient {
        let client = AgentClient::new(AgentConfig::new(addr.ip().to_string(), addr.port()));
        client.connect().await.expect("mock agent accepts");
        client
    }

    #[tokio::test]
    async fn control_lamp_wire_bytes_are_exact() {
        // The full encoded command for control_lamp(1, 1, 5, 80),
        // including the big-endian length and little-endian BCC.
        const EXPECTED: [u8; 22] = [
            0x02, 0x00, 0x16, // STX, length 22
            0x13, 0x01, 0x01, 0x00, 0x00, // dest: LCS master 1 cu 1
            0x13, 0x00, 0x00, 0x00, 0x00, // src: host
            0x92, 0x00, // OP
            0x01, 0x05, 0x00, 0x50, // cu, lamp 5, 0, brightness 80
            0x96, 0x58, // BCC, little-endian
            0x03, // ETX
        ];

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut raw = vec![0u8; EXPECTED.len()];
            stream.read_exact(&mut raw).await.unwrap();

            let frame = match try_decode(&raw) {
                DecodeResult::Frame(frame, consumed) => {
                    assert_eq!(consumed, raw.len());
                    frame
                }
                other => panic!("mock failed to decode request: {other:?}"),
            };
            stream.write_all(&ack_for(&frame).encode()).await.unwrap();
            raw
        });

        let client = client_for(addr).await;
        let resp = client.control_lamp(1, 1, 5, 80).await.unwrap();
        assert!(resp.is_ack_ok());

        let raw = server.await.unwrap();
        assert_eq!(raw, EXPECTED);
        client.disconnect().await;
    }

    #[tokio::test]
    async fn garbage_prefix_is_resynced_silently() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_frame(&mut stream).await;

            // Line noise before the real response; the client's decoder
            // must skip it without failing the request.
            stream.write_all(&[0xFF, 0x13, 0x37]).await.unwrap();
            stream.write_all(&ack_for(&request).encode()).await.unwrap();
        });

        let client = client_for(addr).await;
        let resp = client.control_lamp(1, 1, 5, 80).await.unwrap();
        assert!(resp.is_ack_ok());
        client.disconnect().await;
    }

    #[tokio::test]
    async fn byte_by_byte_delivery_still_decodes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_frame(&mut stream).await;

            for byte in ack_for(&request).encode() {
                stream.write_all(&[byte]).await.unwrap();
                stream.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });

        let client = client_for(addr).await;
        let resp = client.control_lamp(1, 1, 5, 80).await.unwrap();
        assert!(resp.is_ack_ok());
        client.disconnect().await;
    }

    #[tokio::test]
    async fn concurrent_sends_resolve_positionally() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            // Answer the i-th request with a brightness table whose only
            // entry is i, so the test can tell the responses apart.
            for i in 1..=2u8 {
                let request = read_frame(&mut stream).await;
                let reply = Frame {
                    dest: request.src,
                    src: request.dest,
                    op1: 0x16,
                    op2: 0x00,
                    data: vec![i],
                };
                stream.write_all(&reply.encode()).await.unwrap();
            }
        });

        let client = std::sync::Arc::new(client_for(addr).await);

        let first = {
            let client = client.clone();
            tokio::spawn(async move { client.get_lamp_brightness(DeviceType::Lcs, 1, 1).await })
        };
        // Give the first send a moment to reach the lane head.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = {
            let client = client.clone();
            tokio::spawn(async move { client.get_lamp_brightness(DeviceType::Lcs, 1, 2).await })
        };

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();
        assert_eq!(
            first.kind,
            ResponseKind::LampBrightness { values: vec![1] }
        );
        assert_eq!(
            second.kind,
            ResponseKind::LampBrightness { values: vec![2] }
        );
        client.disconnect().await;
    }

    #[tokio::test]
    async fn connection_loss_fails_pending_and_rejects_new_sends() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            // Swallow the first request, then slam the door.
            let _ = read_frame(&mut stream).await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(stream);
        });

        let client = std::sync::Arc::new(client_for(addr).await);

        let mut handles = Vec::new();
        for lamp in 1..=3u8 {
            let client = client.clone();
            handles.push(tokio::spawn(async move {
                client.control_lamp(1, 1, lamp, 40).await
            }));
            // Keep enqueue order deterministic.
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        for handle in handles {
            let result = handle.await.unwrap();
            assert!(
                matches!(result, Err(ClientError::ConnectionLost)),
                "pending request must fail with ConnectionLost, got {result:?}"
            );
        }

        // The client is now in its reconnect window.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(matches!(
            client.state().await,
            ConnectionState::Reconnecting { .. } | ConnectionState::Connecting
        ));
        let result = client.control_lamp(1, 1, 4, 40).await;
        assert!(matches!(result, Err(ClientError::NotConnected)));

        client.disconnect().await;
    }

    #[tokio::test]
    async fn corrupt_checksum_surfaces_as_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_frame(&mut stream).await;

            // Flip a data byte after encoding: the BCC no longer matches,
            // so the client must discard the frame and time out.
            let mut bytes = ack_for(&request).encode();
            bytes[15] ^= 0xFF;
            stream.write_all(&bytes).await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
        });

        let mut config = AgentConfig::new(addr.ip().to_string(), addr.port());
        config.request_timeout = Duration::from_millis(100);
        let client = AgentClient::new(config);
        client.connect().await.unwrap();

        let result = client.control_lamp(1, 1, 5, 80).await;
        assert!(matches!(result, Err(ClientError::Timeout)));
        client.disconnect().await;
    }

    /// Long-lived mock agent that acks every decoded frame, tagging the
    /// ack data with `marker` so responses can be traced to an agent.
    async fn spawn_marked_agent(marker: u8) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            loop {
                let request = read_frame(&mut stream).await;
                let reply = Frame {
                    dest: request.src,
                    src: [0x13, marker, marker, 0x00, 0x00],
                    op1: 0x10,
                    op2: 0x00,
                    data: vec![0x00],
                };
                if stream.write_all(&reply.encode()).await.is_err() {
                    return;
                }
            }
        });
        addr
    }

    #[tokio::test]
    async fn agents_operate_independently_through_manager() {
        let addr_a = spawn_marked_agent(1).await;
        let addr_b = spawn_marked_agent(2).await;

        let manager = std::sync::Arc::new(AgentManager::new());
        manager
            .add_agent("a", addr_a.ip().to_string(), addr_a.port(), None)
            .await
            .unwrap();
        manager
            .add_agent("b", addr_b.ip().to_string(), addr_b.port(), None)
            .await
            .unwrap();

        // Wait for both connections.
        for _ in 0..100 {
            if manager.connection_status().await.connected_agents == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(manager.connection_status().await.connected_agents, 2);

        // Drive both agents concurrently; each answers with its marker.
        let on_a = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.control_lamp(Some("a"), 1, 1, 5, 80).await })
        };
        let on_b = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.control_lamp(Some("b"), 1, 1, 5, 80).await })
        };

        let resp_a = on_a.await.unwrap().unwrap();
        let resp_b = on_b.await.unwrap().unwrap();
        assert_eq!(resp_a.source.master, 1);
        assert_eq!(resp_b.source.master, 2);

        // Default routing targets "a", the first registered agent.
        let resp_default = manager.control_lamp(None, 1, 1, 5, 80).await.unwrap();
        assert_eq!(resp_default.source.master, 1);

        manager.disconnect_all().await;
        assert_eq!(manager.connection_status().await.total_agents, 0);
    }

    #[tokio::test]
    async fn device_name_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_frame(&mut stream).await;
            assert_eq!(request.opcode(), 0xA205);
            assert_eq!(request.dest, [0x13, 0x00, 0x00, 0x00, 0x00]);

            let reply = Frame {
                dest: request.src,
                src: [0x13, 0x01, 0x01, 0x00, 0x00],
                op1: 0x22,
                op2: 0x05,
                data: b"Atrium West\0\0\0".to_vec(),
            };
            stream.write_all(&reply.encode()).await.unwrap();
        });

        let client = client_for(addr).await;
        let resp = client.get_device_name().await.unwrap();
        assert_eq!(
            resp.kind,
            ResponseKind::DeviceName {
                name: "Atrium West".into()
            }
        );
        assert_eq!(resp.source.master, 1);
        client.disconnect().await;
    }
}
