pub mod headers;
pub mod message;

pub use headers::{Headers, StandardHeader};
pub use message::{Message, Method, Request, Response, StatusCode, ALL_METHODS, HTTP_VERSION};
