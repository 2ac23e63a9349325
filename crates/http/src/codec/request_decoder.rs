//! Full request decoder: head phase, then body phase.
//!
//! The connection feeds arbitrarily sized reads into one buffer and drains
//! messages out of this decoder. State lives in `payload_decoder`:
//! `None` means the next bytes belong to a request head, `Some` means a body
//! is being read. The terminal [`PayloadItem::Eof`] flips the decoder back to
//! the head phase, ready for the next request on a keep-alive connection.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::codec::body_decoder::PayloadDecoder;
use crate::codec::head_decoder::HeadDecoder;
use crate::protocol::{Message, ParseError, PayloadItem};

#[derive(Debug)]
pub struct RequestDecoder {
    head_decoder: HeadDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl RequestDecoder {
    pub fn new(max_header_bytes: usize, max_url_bytes: usize) -> Self {
        Self { head_decoder: HeadDecoder::new(max_header_bytes, max_url_bytes), payload_decoder: None }
    }

    /// True when the decoder is between messages (waiting for a head).
    pub fn is_idle(&self) -> bool {
        self.payload_decoder.is_none()
    }
}

impl Decoder for RequestDecoder {
    type Item = Message;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let message = match payload_decoder.decode(src)? {
                Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
                Some(item @ PayloadItem::Eof) => {
                    // message complete, back to the head phase
                    self.payload_decoder.take();
                    Some(Message::Payload(item))
                }
                None => None,
            };
            return Ok(message);
        }

        let message = match self.head_decoder.decode(src)? {
            Some((head, payload_size)) => {
                self.payload_decoder = Some(payload_size.into());
                Some(Message::Head(head))
            }
            None => None,
        };

        Ok(message)
    }
}
