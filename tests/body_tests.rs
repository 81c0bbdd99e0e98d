//! Body staging against a live server: chunked uploads, spill-to-disk
//! selection, and size-limit enforcement.

mod common;

use std::io::Write;
use std::sync::{Arc, Mutex};

use restling::body::{BodyKind, MemoryBody};
use restling::http::{Method, Request, Response, StandardHeader, StatusCode};

use common::{read_response, TestServer};

fn empty_ok() -> Response {
    let mut response = Response::new(StatusCode::Ok);
    response
        .headers
        .set_std(StandardHeader::ContentLength, "0");
    response
}

fn drain_body(request: &mut Request) -> (BodyKind, Vec<u8>) {
    let body = request.body.as_mut().expect("request body present");
    let mut data = vec![0u8; body.len() as usize];
    let n = body.read_at(0, &mut data).expect("read body");
    data.truncate(n);
    (body.kind(), data)
}

#[test]
fn chunked_upload_decodes_and_spills_to_disk() {
    let seen: Arc<Mutex<Option<(BodyKind, Vec<u8>)>>> = Arc::new(Mutex::new(None));
    let seen_in_handler = seen.clone();

    let server = TestServer::start(move |rest| {
        rest.add_endpoint("/upload", Method::Post, move |mut request, _captures| {
            *seen_in_handler.lock().unwrap() = Some(drain_body(&mut request));
            empty_ok()
        });
    });

    let mut stream = server.connect();
    stream
        .write_all(
            b"POST /upload HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n\
              5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
        )
        .unwrap();
    assert_eq!(read_response(&mut stream).status, 200);

    let (kind, data) = seen.lock().unwrap().take().expect("handler saw the body");
    assert_eq!(kind, BodyKind::FileBacked);
    assert_eq!(data, b"hello world");
    assert_eq!(data.len(), 11);
}

#[test]
fn sized_text_upload_stays_in_memory() {
    let seen: Arc<Mutex<Option<(BodyKind, Vec<u8>)>>> = Arc::new(Mutex::new(None));
    let seen_in_handler = seen.clone();

    let server = TestServer::start(move |rest| {
        rest.add_endpoint("/upload", Method::Post, move |mut request, _captures| {
            *seen_in_handler.lock().unwrap() = Some(drain_body(&mut request));
            empty_ok()
        });
    });

    let mut stream = server.connect();
    stream
        .write_all(
            b"POST /upload HTTP/1.1\r\nHost: x\r\nContent-Type: text/plain\r\nContent-Length: 5\r\n\r\nhello",
        )
        .unwrap();
    assert_eq!(read_response(&mut stream).status, 200);

    let (kind, data) = seen.lock().unwrap().take().expect("handler saw the body");
    assert_eq!(kind, BodyKind::InMemory);
    assert_eq!(data, b"hello");
}

#[test]
fn chunked_body_split_across_many_writes_arrives_whole() {
    let seen: Arc<Mutex<Option<(BodyKind, Vec<u8>)>>> = Arc::new(Mutex::new(None));
    let seen_in_handler = seen.clone();

    let server = TestServer::start(move |rest| {
        rest.add_endpoint("/upload", Method::Post, move |mut request, _captures| {
            *seen_in_handler.lock().unwrap() = Some(drain_body(&mut request));
            empty_ok()
        });
    });

    let payload = "abcdefghij".repeat(50);
    let mut wire = Vec::new();
    for piece in payload.as_bytes().chunks(37) {
        wire.extend_from_slice(format!("{:x}\r\n", piece.len()).as_bytes());
        wire.extend_from_slice(piece);
        wire.extend_from_slice(b"\r\n");
    }
    wire.extend_from_slice(b"0\r\n\r\n");

    let mut stream = server.connect();
    stream
        .write_all(b"POST /upload HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n")
        .unwrap();
    for fragment in wire.chunks(61) {
        stream.write_all(fragment).unwrap();
        stream.flush().unwrap();
    }
    assert_eq!(read_response(&mut stream).status, 200);

    let (_, data) = seen.lock().unwrap().take().expect("handler saw the body");
    assert_eq!(data, payload.as_bytes());
}

#[test]
fn body_over_the_limit_drops_the_connection() {
    let mut config = common::short_timeouts();
    config.max_body_size = 1024;

    let server = TestServer::start_with_config(config, |rest| {
        rest.add_endpoint("/upload", Method::Post, |_request, _captures| empty_ok());
    });

    let response = server.exchange(
        b"POST /upload HTTP/1.1\r\nHost: x\r\nContent-Type: text/plain\r\nContent-Length: 4096\r\n\r\n",
    );
    assert!(
        response.is_empty(),
        "oversize bodies are rejected before any response"
    );
}

#[test]
fn mismatched_chunk_size_drops_the_connection() {
    let server = TestServer::start(|rest| {
        rest.add_endpoint("/upload", Method::Post, |_request, _captures| empty_ok());
    });

    let response = server.exchange(
        b"POST /upload HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello world\r\n0\r\n\r\n",
    );
    assert!(response.is_empty());
}

#[test]
fn unsupported_transfer_encoding_drops_the_connection() {
    let server = TestServer::start(|rest| {
        rest.add_endpoint("/upload", Method::Post, |_request, _captures| empty_ok());
    });

    let response = server
        .exchange(b"POST /upload HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: gzip\r\n\r\ndata");
    assert!(response.is_empty());
}

#[test]
fn file_backed_response_streams_back_to_the_client() {
    let payload = "0123456789".repeat(500);
    let expected = payload.clone();

    let server = TestServer::start(move |rest| {
        let payload = payload.clone();
        rest.add_endpoint("/download", Method::Get, move |_request, _captures| {
            let dir = std::env::temp_dir()
                .join(format!("restling-download-{}", std::process::id()));
            std::fs::create_dir_all(&dir).unwrap();
            let path = dir.join("payload.bin");
            std::fs::write(&path, payload.as_bytes()).unwrap();

            let body = restling::body::FileBody::open(&path).unwrap();
            let mut response = Response::new(StatusCode::Ok);
            response
                .headers
                .set_std(StandardHeader::ContentType, "application/octet-stream");
            response
                .headers
                .set_std(StandardHeader::ContentLength, payload.len().to_string());
            response.body = Some(Box::new(body));
            response
        });
    });

    let mut stream = server.connect();
    stream
        .write_all(b"GET /download HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();
    let response = read_response(&mut stream);
    assert_eq!(response.status, 200);
    assert_eq!(response.body, expected.as_bytes());
}

#[test]
fn handler_supplied_memory_body_roundtrips() {
    let server = TestServer::start(|rest| {
        rest.add_endpoint("/echo", Method::Post, |mut request, _captures| {
            let body = request.body.as_mut().expect("body");
            let mut data = vec![0u8; body.len() as usize];
            body.read_at(0, &mut data).unwrap();

            let mut response = Response::new(StatusCode::Ok);
            response
                .headers
                .set_std(StandardHeader::ContentType, "text/plain");
            response
                .headers
                .set_std(StandardHeader::ContentLength, data.len().to_string());
            response.body = Some(Box::new(MemoryBody::from_bytes(data)));
            response
        });
    });

    let mut stream = server.connect();
    stream
        .write_all(
            b"POST /echo HTTP/1.1\r\nHost: x\r\nContent-Type: text/plain\r\nContent-Length: 12\r\n\r\nhello bodies",
        )
        .unwrap();
    let response = read_response(&mut stream);
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"hello bodies");
}
