mod core;
mod trie;

pub use self::core::RestServer;
pub use self::trie::{CaptureVec, EndpointHandler, MAX_INLINE_CAPTURES};
