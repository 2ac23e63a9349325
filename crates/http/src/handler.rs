//! The seam between the protocol engine and the application router.

use crate::protocol::Context;

/// Resolves a fully-read request into a response.
///
/// Implementations are shared across worker threads and invoked synchronously
/// from the connection once a message is complete. They must always leave a
/// response in the context; protocol-level errors never reach them.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, ctx: &mut Context);
}

/// Wraps a plain closure as a [`Dispatcher`]. Mostly useful in tests and
/// minimal setups that do not need routing.
pub fn dispatcher_fn<F>(f: F) -> DispatcherFn<F>
where
    F: Fn(&mut Context) + Send + Sync,
{
    DispatcherFn { f }
}

#[derive(Debug)]
pub struct DispatcherFn<F> {
    f: F,
}

impl<F> Dispatcher for DispatcherFn<F>
where
    F: Fn(&mut Context) + Send + Sync,
{
    fn dispatch(&self, ctx: &mut Context) {
        (self.f)(ctx);
    }
}
