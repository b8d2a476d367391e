//! RFC 6242 message framing: the legacy unchunked hello exchange and the
//! RFC 6242 §4.1 chunked framing used for everything after it.

pub mod chunked;
pub mod hello;

pub use chunked::{ChunkedReader, ChunkedWriter};
pub use hello::{read_hello, write_hello, LEGACY_TERMINATOR};
