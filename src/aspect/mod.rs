//! Aspects: paired interception around request handlers.
//!
//! An aspect contributes a pre-service and a post-service step to the
//! pipeline. For a dispatched request the pre steps run in registration
//! order, then the handler, then the post steps in reverse order, so each
//! aspect wraps everything registered after it. The fallback (no-route)
//! path runs no aspects at all.

mod metrics;

pub use metrics::MetricsAspect;

use crate::task::Task;

/// One pre/post interception pair.
///
/// Both steps default to no-ops, so an aspect may hook only one side.
pub trait Aspect: Send + Sync {
    /// Runs before the handler, in registration order.
    fn pre_service(&self, _task: &mut Task) {}

    /// Runs after the handler, in reverse registration order.
    fn post_service(&self, _task: &mut Task) {}
}

/// Adapter turning a pair of closures into an [`Aspect`].
pub struct FnAspect<Pre, Post> {
    pre: Pre,
    post: Post,
}

impl<Pre, Post> FnAspect<Pre, Post>
where
    Pre: Fn(&mut Task) + Send + Sync,
    Post: Fn(&mut Task) + Send + Sync,
{
    pub fn new(pre: Pre, post: Post) -> Self {
        Self { pre, post }
    }
}

impl<Pre, Post> Aspect for FnAspect<Pre, Post>
where
    Pre: Fn(&mut Task) + Send + Sync,
    Post: Fn(&mut Task) + Send + Sync,
{
    fn pre_service(&self, task: &mut Task) {
        (self.pre)(task)
    }

    fn post_service(&self, task: &mut Task) {
        (self.post)(task)
    }
}
