//
// Copyright 2026 the seqrpc authors. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Integration tests for the connection lifecycle: timeouts, close
//! idempotence, error broadcast to concurrent callers, and reconnection.

mod common;

use std::time::Duration;

use common::{listen, read_request, serve_echo, write_response};
use seqrpc::codec::{decode, encode};
use seqrpc::{function_id, ErrorKind, RpcClient};

const ECHO: u64 = function_id("echo");
const SLOW: u64 = function_id("slow");

#[tokio::test]
async fn test_call_timeout_closes_connection() {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        // never reply
        let _ = read_request(&mut stream).await;
        let _ = read_request(&mut stream).await;
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let mut client = RpcClient::new(1);
    client.connect(&addr.to_string()).await.unwrap();

    let err = client
        .call_for::<String, _>(Duration::from_millis(50), SLOW, &("x",))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::TimedOut);
    assert!(client.has_closed());

    server.abort();
}

#[tokio::test]
async fn test_timeout_broadcasts_to_concurrent_calls() {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _ = read_request(&mut stream).await;
        let _ = read_request(&mut stream).await;
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let mut client = RpcClient::new(1);
    client.connect(&addr.to_string()).await.unwrap();

    // one short deadline, one long; the short one closes the connection
    // and takes the long one down with it
    let (short, long) = tokio::join!(
        client.call_for::<String, _>(Duration::from_millis(50), SLOW, &("a",)),
        client.call_for::<String, _>(Duration::from_secs(10), SLOW, &("b",)),
    );

    assert_eq!(short.unwrap_err().kind, ErrorKind::TimedOut);
    let long_err = long.unwrap_err();
    assert!(
        matches!(long_err.kind, ErrorKind::TimedOut | ErrorKind::IoError),
        "unexpected broadcast error: {long_err:?}"
    );
    assert!(client.has_closed());

    server.abort();
}

#[tokio::test]
async fn test_server_disconnect_broadcasts_io_error() {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _ = read_request(&mut stream).await.unwrap();
        // drop the connection with the call still pending
    });

    let mut client = RpcClient::new(1);
    client.connect(&addr.to_string()).await.unwrap();

    let err = client.call::<String, _>(ECHO, &("x",)).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::IoError);
    assert!(client.has_closed());
    server.await.unwrap();
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(serve_echo(listener, 1));

    let mut client = RpcClient::new(1);
    client.connect(&addr.to_string()).await.unwrap();
    let _: String = client.call(ECHO, &("hi",)).await.unwrap();

    client.close();
    client.close();
    assert!(client.has_closed());

    let err = client.call::<String, _>(ECHO, &("x",)).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::IoError);

    server.abort();
}

#[tokio::test]
async fn test_closed_client_cannot_connect_again() {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(serve_echo(listener, 2));

    let mut client = RpcClient::new(1);
    client.connect(&addr.to_string()).await.unwrap();
    client.close();

    let err = client.connect(&addr.to_string()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::IoError);

    // reconnect is the sanctioned way back
    client.reconnect(&addr.to_string()).await.unwrap();
    assert!(!client.has_closed());
    let reply: String = client.call(ECHO, &("back",)).await.unwrap();
    assert_eq!(reply, "back");

    drop(client);
    server.abort();
}

#[tokio::test]
async fn test_reconnect_keeps_sequence_numbers_advancing() {
    let (listener, addr) = listen().await;
    let (seq_tx, mut seq_rx) = tokio::sync::mpsc::unbounded_channel();
    let server = tokio::spawn(async move {
        for _ in 0..2 {
            let (mut stream, _) = listener.accept().await.unwrap();
            while let Ok(request) = read_request(&mut stream).await {
                seq_tx.send(request.header.seq_num).unwrap();
                let (text,): (String,) = decode(&request.body).unwrap();
                let body = encode(&text).unwrap();
                write_response(&mut stream, request.header.seq_num, 0, &body, &[])
                    .await
                    .unwrap();
            }
        }
    });

    let mut client = RpcClient::new(1);
    client.connect(&addr.to_string()).await.unwrap();
    let _: String = client.call(ECHO, &("one",)).await.unwrap();
    let _: String = client.call(ECHO, &("two",)).await.unwrap();

    client.reconnect(&addr.to_string()).await.unwrap();
    let _: String = client.call(ECHO, &("three",)).await.unwrap();

    let first = seq_rx.recv().await.unwrap();
    let second = seq_rx.recv().await.unwrap();
    let third = seq_rx.recv().await.unwrap();
    assert!(second > first);
    // the counter survives the reconnect
    assert!(third > second);

    drop(client);
    server.abort();
}

#[tokio::test]
async fn test_reconnect_after_terminal_error() {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(async move {
        // first connection: reply with an unknown request id, a terminal
        // protocol error for the client
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = read_request(&mut stream).await.unwrap();
        let body = encode("zombie").unwrap();
        write_response(&mut stream, request.header.seq_num + 999, 0, &body, &[])
            .await
            .unwrap();
        drop(stream);

        // second connection: behave
        let (mut stream, _) = listener.accept().await.unwrap();
        while let Ok(request) = read_request(&mut stream).await {
            let (text,): (String,) = decode(&request.body).unwrap();
            let body = encode(&text).unwrap();
            write_response(&mut stream, request.header.seq_num, 0, &body, &[])
                .await
                .unwrap();
        }
    });

    let mut client = RpcClient::new(1);
    client.connect(&addr.to_string()).await.unwrap();
    let err = client.call::<String, _>(ECHO, &("x",)).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::IoError);
    assert!(client.has_closed());

    client.reconnect(&addr.to_string()).await.unwrap();
    let reply: String = client.call(ECHO, &("revived",)).await.unwrap();
    assert_eq!(reply, "revived");

    drop(client);
    server.abort();
}

#[tokio::test]
async fn test_connect_timeout_or_failure_transitions_to_closed() {
    // 10.255.255.1 is a blackhole on most networks; some sandboxes reject
    // it outright, so accept either deadline expiry or a refused connect.
    let mut client = RpcClient::new(1);
    let err = client
        .connect_with_timeout("10.255.255.1:81", Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(
        matches!(err.kind, ErrorKind::TimedOut | ErrorKind::NotConnected),
        "unexpected connect error: {err:?}"
    );
    assert!(client.has_closed());
}

#[tokio::test]
async fn test_dropped_ticket_discards_reply() {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(serve_echo(listener, 1));

    let mut client = RpcClient::new(1);
    client.connect(&addr.to_string()).await.unwrap();

    let ticket = client
        .send_request::<String, _>(ECHO, &("ignored",))
        .await
        .unwrap();
    drop(ticket);

    // the discarded reply must not poison the next call
    let reply: String = client.call(ECHO, &("next",)).await.unwrap();
    assert_eq!(reply, "next");

    drop(client);
    server.abort();
}
