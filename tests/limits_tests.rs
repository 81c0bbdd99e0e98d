//! Size-limit enforcement observed from outside the server.

mod common;

use std::io::{Read, Write};

use restling::http::{Method, Response, StandardHeader, StatusCode};

use common::TestServer;

fn empty_ok() -> Response {
    let mut response = Response::new(StatusCode::Ok);
    response
        .headers
        .set_std(StandardHeader::ContentLength, "0");
    response
}

#[test]
fn oversize_header_section_is_rejected_and_counted() {
    let server = TestServer::start(|rest| {
        rest.add_endpoint("/x", Method::Get, |_request, _captures| empty_ok());
    });

    // One 20 KiB header line; the receiver must stop accumulating at the
    // 16 KiB cap and close without responding.
    let mut request = b"GET /x HTTP/1.1\r\nX-Huge: ".to_vec();
    request.extend(std::iter::repeat(b'a').take(20 * 1024));
    request.extend_from_slice(b"\r\n\r\n");

    let mut stream = server.connect();
    stream.write_all(&request).unwrap();
    let mut response = Vec::new();
    let _ = stream.read_to_end(&mut response);
    assert!(response.is_empty(), "no response precedes the close");

    server.settle();
    let stats = server.core.stats();
    assert_eq!(stats.total_requests, 0, "the exchange never completed");
    assert!(
        stats.total_bytes_received >= 16 * 1024,
        "the rejected bytes still count: {}",
        stats.total_bytes_received
    );
}

#[test]
fn headers_under_the_cap_pass_through_growth_doublings() {
    let server = TestServer::start(|rest| {
        rest.add_endpoint("/x", Method::Get, |_request, _captures| empty_ok());
    });

    // ~8 KiB of headers forces several buffer doublings without tripping
    // the 16 KiB cap.
    let mut request = b"GET /x HTTP/1.1\r\nHost: x\r\n".to_vec();
    for i in 0..100 {
        request.extend_from_slice(format!("X-Filler-{i}: {}\r\n", "v".repeat(64)).as_bytes());
    }
    request.extend_from_slice(b"\r\n");

    let mut stream = server.connect();
    stream.write_all(&request).unwrap();
    let response = common::read_response(&mut stream);
    assert_eq!(response.status, 200);
}

#[test]
fn oversize_single_header_value_is_rejected() {
    let server = TestServer::start(|rest| {
        rest.add_endpoint("/x", Method::Get, |_request, _captures| empty_ok());
    });

    // 9 KiB value: under the section cap, over the per-value cap.
    let mut request = b"GET /x HTTP/1.1\r\nX-Big: ".to_vec();
    request.extend(std::iter::repeat(b'v').take(9 * 1024));
    request.extend_from_slice(b"\r\n\r\n");

    let mut stream = server.connect();
    stream.write_all(&request).unwrap();
    let mut response = Vec::new();
    let _ = stream.read_to_end(&mut response);
    assert!(response.is_empty());
}

#[test]
fn idle_connection_closes_with_zero_iterations() {
    let server = TestServer::start(|rest| {
        rest.add_endpoint("/x", Method::Get, |_request, _captures| empty_ok());
    });

    // Connect and send nothing; the idle timeout must close the socket.
    let mut stream = server.connect();
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).unwrap();
    assert!(buf.is_empty());

    server.settle();
    let stats = server.core.stats();
    assert_eq!(stats.total_requests, 0);
    assert_eq!(stats.total_bytes_received, 0);
    assert_eq!(stats.active_sessions, 0);
}
