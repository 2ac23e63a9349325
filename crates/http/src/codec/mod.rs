//! Incremental HTTP/1.1 codecs.
//!
//! All decoders implement [`tokio_util::codec::Decoder`] and are driven
//! manually by the connection against a pooled buffer; they tolerate input
//! split at any byte boundary.

mod body_decoder;
mod head_decoder;
mod request_decoder;
mod response_encoder;

pub use body_decoder::PayloadDecoder;
pub use head_decoder::HeadDecoder;
pub use request_decoder::RequestDecoder;
pub use response_encoder::ResponseEncoder;
