// SPDX-License-Identifier: MIT

use super::*;
use crate::auth::{Capability, Principal};
use crate::protocol::{Envelope, Request, Response};
use tokio::io::AsyncWriteExt;

#[tokio::test]
async fn frames_roundtrip_over_a_duplex_pipe() {
    let (mut client, mut server) = tokio::io::duplex(4096);

    let envelope = Envelope {
        principal: Principal::new("ops", [Capability::Read]),
        request: Request::Ping,
    };
    send(&mut client, &envelope).await.unwrap();

    let received: Envelope = recv_deadline(&mut server, IO_DEADLINE).await.unwrap();
    assert!(matches!(received.request, Request::Ping));

    send_deadline(&mut server, &Response::Ok, IO_DEADLINE)
        .await
        .unwrap();
    let response: Response = recv(&mut client).await.unwrap();
    assert!(matches!(response, Response::Ok));
}

#[tokio::test]
async fn several_frames_on_one_connection_stay_ordered() {
    let (mut client, mut server) = tokio::io::duplex(4096);
    for seq in 0..3u64 {
        send(&mut client, &seq).await.unwrap();
    }
    for expected in 0..3u64 {
        let got: u64 = recv(&mut server).await.unwrap();
        assert_eq!(got, expected);
    }
}

#[tokio::test]
async fn closed_peer_reads_as_closed() {
    let (client, mut server) = tokio::io::duplex(64);
    drop(client);
    assert!(matches!(
        recv::<_, Response>(&mut server).await,
        Err(WireError::Closed)
    ));
}

#[tokio::test]
async fn eof_inside_a_frame_is_also_closed() {
    let (mut client, mut server) = tokio::io::duplex(64);
    // Announce 100 bytes, deliver 3, hang up.
    client.write_all(&100u32.to_be_bytes()).await.unwrap();
    client.write_all(b"abc").await.unwrap();
    drop(client);
    assert!(matches!(
        recv::<_, Response>(&mut server).await,
        Err(WireError::Closed)
    ));
}

#[tokio::test]
async fn oversize_header_is_rejected_before_allocation() {
    let (mut client, mut server) = tokio::io::duplex(64);
    let huge = ((MAX_FRAME_BYTES + 1) as u32).to_be_bytes();
    client.write_all(&huge).await.unwrap();
    assert!(matches!(
        recv::<_, Response>(&mut server).await,
        Err(WireError::Oversize(_))
    ));
}

#[tokio::test]
async fn recv_deadline_fires_on_a_silent_peer() {
    let (_client, mut server) = tokio::io::duplex(64);
    let result: Result<Response, WireError> =
        recv_deadline(&mut server, std::time::Duration::from_millis(20)).await;
    assert!(matches!(result, Err(WireError::Deadline)));
}

#[tokio::test]
async fn garbage_payload_is_malformed() {
    let (mut client, mut server) = tokio::io::duplex(64);
    client.write_all(&8u32.to_be_bytes()).await.unwrap();
    client.write_all(b"not json").await.unwrap();
    assert!(matches!(
        recv::<_, Response>(&mut server).await,
        Err(WireError::Malformed(_))
    ));
}
