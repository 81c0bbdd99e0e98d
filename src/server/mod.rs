mod acceptor;
mod core;

pub use self::acceptor::Acceptor;
pub use self::core::{RequestHandler, ResponseHandler, Server, ServerStats};

pub(crate) use self::core::unix_timestamp;
