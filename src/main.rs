use std::io;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use restling::body::MemoryBody;
use restling::config::ServerConfig;
use restling::http::{Method, Response, StandardHeader, StatusCode};
use restling::router::RestServer;

#[derive(Parser, Debug)]
#[command(name = "restling", about = "RESTful HTTP/1.1 server")]
struct Args {
    /// Address to bind, e.g. 0.0.0.0:8080
    #[arg(long, default_value = "0.0.0.0:8080")]
    addr: String,

    /// Value of the Server response header
    #[arg(long, default_value = "restling")]
    name: String,
}

fn text_response(status: StatusCode, body: &str) -> Response {
    let mut response = Response::new(status);
    response
        .headers
        .set_std(StandardHeader::ContentType, "text/plain");
    response
        .headers
        .set_std(StandardHeader::ContentLength, body.len().to_string());
    response.body = Some(Box::new(MemoryBody::from_bytes(body.as_bytes().to_vec())));
    response
}

fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut server = RestServer::bind(&args.addr, args.name, ServerConfig::from_env())?;

    server.add_endpoint("/health", Method::Get, |_request, _captures| {
        text_response(StatusCode::Ok, "ok\n")
    });
    server.add_endpoint("/echo/{word}", Method::Get, |_request, captures| {
        text_response(StatusCode::Ok, &format!("{}\n", captures[0]))
    });

    println!("Serving on {}", args.addr);
    server.start();
    Ok(())
}
