//! Protocol types shared by the codecs, the connection and the router.

mod context;
mod error;
mod headers;
mod message;

pub use context::{Context, Request, Response};
pub use error::{HttpError, ParseError, SendError};
pub use headers::HeaderContainer;
pub use message::{Message, PayloadItem, PayloadSize, RequestHead};
