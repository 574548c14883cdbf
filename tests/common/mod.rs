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

//! Loopback mock servers speaking the wire protocol.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use seqrpc::codec::{decode, encode};
use seqrpc::protocol::{RequestHeader, ResponseHeader, REQ_HEAD_LEN};

/// One fully read request frame.
#[derive(Debug)]
pub struct ReceivedRequest {
    pub header: RequestHeader,
    pub body: Vec<u8>,
    pub attachment: Vec<u8>,
}

/// Reads one complete request frame off the socket.
pub async fn read_request(stream: &mut TcpStream) -> io::Result<ReceivedRequest> {
    let mut head = [0u8; REQ_HEAD_LEN];
    stream.read_exact(&mut head).await?;
    let header = RequestHeader::decode(&head).expect("malformed request header");

    let mut body = vec![0u8; header.body_length as usize];
    stream.read_exact(&mut body).await?;
    let mut attachment = vec![0u8; header.attach_length as usize];
    stream.read_exact(&mut attachment).await?;

    Ok(ReceivedRequest {
        header,
        body,
        attachment,
    })
}

/// Writes one complete response frame.
pub async fn write_response(
    stream: &mut TcpStream,
    seq_num: u32,
    err_code: u8,
    body: &[u8],
    attachment: &[u8],
) -> io::Result<()> {
    let header = ResponseHeader {
        serialize_type: 0,
        err_code,
        body_length: body.len() as u32,
        seq_num,
        attach_length: attachment.len() as u32,
    };
    stream.write_all(&header.encode()).await?;
    stream.write_all(body).await?;
    stream.write_all(attachment).await?;
    stream.flush().await
}

/// Binds a loopback listener.
pub async fn listen() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Serves `(String,) -> String` echo on `connections` successive
/// connections, echoing the request attachment back as well.
pub async fn serve_echo(listener: TcpListener, connections: usize) {
    for _ in 0..connections {
        let (mut stream, _) = listener.accept().await.unwrap();
        while let Ok(request) = read_request(&mut stream).await {
            let (text,): (String,) = decode(&request.body).unwrap();
            let body = encode(&text).unwrap();
            write_response(
                &mut stream,
                request.header.seq_num,
                0,
                &body,
                &request.attachment,
            )
            .await
            .unwrap();
        }
    }
}
