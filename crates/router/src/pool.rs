//! Free list of request contexts.
//!
//! Any idle context can serve any request, so the pool is a plain stack behind a mutex; checkout
//! and checkin are the only synchronized operations. The free list grows to the peak number of
//! concurrent requests, bounded by `max_idle`.

use crate::context::Context;
use crate::request::RequestHead;
use crate::response::ResponseWriter;
use parking_lot::Mutex;

#[derive(Debug)]
pub(crate) struct ContextPool {
    free: Mutex<Vec<Box<Context>>>,
    max_idle: usize,
}

impl ContextPool {
    pub(crate) fn new(max_idle: usize) -> Self {
        Self { free: Mutex::new(Vec::new()), max_idle }
    }

    /// Takes an idle context, or allocates one, and resets it for `request`.
    pub(crate) fn checkout(&self, request: RequestHead, out: Box<dyn ResponseWriter>) -> Box<Context> {
        let idle = self.free.lock().pop();
        let mut ctx = idle.unwrap_or_else(|| Box::new(Context::new()));
        ctx.reset(request, out);
        ctx
    }

    /// Returns a finished context. It is dropped instead when the pool is full.
    pub(crate) fn checkin(&self, mut ctx: Box<Context>) {
        ctx.recycle();

        let mut free = self.free.lock();
        if free.len() < self.max_idle {
            free.push(ctx);
        }
    }

    #[cfg(test)]
    pub(crate) fn idle(&self) -> usize {
        self.free.lock().len()
    }
}
