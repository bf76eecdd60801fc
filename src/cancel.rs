//! Cooperative cancellation shared by every stage of a query pipeline.
//!
//! A `CancelToken` is cheap to clone and forms a tree: cancelling a token
//! cancels all of its children. Each token also exposes a `done()`
//! channel that becomes ready once it is cancelled, so blocking hand-offs
//! can `select!` on it instead of polling a flag.
//!
//! Tokens belong to a *scope*. A scope collects the first failure reported
//! by any stage below it and cancels its root token when that happens, so
//! one broken stage stops the whole query and the caller gets the error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, after, bounded, select};
use tracing::debug;

use crate::error::TagbooruError;

struct Scope {
    failure: Mutex<Option<TagbooruError>>,
    root: Weak<Inner>,
}

struct Inner {
    cancelled: AtomicBool,
    // dropping the sender disconnects `done`, which wakes every selector
    trigger: Mutex<Option<Sender<()>>>,
    done: Receiver<()>,
    children: Mutex<Vec<Weak<Inner>>>,
    scope: Arc<Scope>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    fn new(scope: Arc<Scope>) -> Self {
        let (trigger, done) = bounded(0);
        Self {
            cancelled: AtomicBool::new(false),
            trigger: Mutex::new(Some(trigger)),
            done,
            children: Mutex::new(Vec::new()),
            scope,
        }
    }

    fn new_root() -> Arc<Self> {
        Arc::new_cyclic(|root| {
            Self::new(Arc::new(Scope {
                failure: Mutex::new(None),
                root: root.clone(),
            }))
        })
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        lock(&self.trigger).take();
        let children = std::mem::take(&mut *lock(&self.children));
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

#[derive(Clone)]
pub struct CancelToken(Arc<Inner>);

impl CancelToken {
    /// A fresh token heading its own failure scope.
    pub fn new() -> Self {
        Self(Inner::new_root())
    }

    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::SeqCst)
    }

    /// Ready (disconnected) once this token is cancelled.
    pub fn done(&self) -> &Receiver<()> {
        &self.0.done
    }

    /// Make `child` follow this token's cancellation. Used both for new
    /// children and for adopting the tokens of already running inputs.
    pub fn attach(&self, child: &CancelToken) {
        {
            let mut children = lock(&self.0.children);
            children.retain(|weak| weak.strong_count() > 0);
            children.push(Arc::downgrade(&child.0));
        }
        // cancel() flags before draining the children, so either it saw
        // the push above or the flag is visible here
        if self.is_cancelled() {
            child.cancel();
        }
    }

    /// A token cancelled together with this one, in the same scope.
    pub fn child(&self) -> Self {
        let child = Self(Arc::new(Inner::new(Arc::clone(&self.0.scope))));
        self.attach(&child);
        child
    }

    /// A child token heading a new failure scope.
    pub fn scope(&self) -> Self {
        let scoped = Self(Inner::new_root());
        self.attach(&scoped);
        scoped
    }

    /// Record `error` as the scope's failure (first one wins) and cancel
    /// the scope.
    pub fn fail(&self, error: TagbooruError) {
        let scope = &self.0.scope;
        {
            let mut failure = lock(&scope.failure);
            if failure.is_none() {
                debug!(error = %error, "pipeline failure");
                *failure = Some(error);
            }
        }
        match scope.root.upgrade() {
            Some(root) => root.cancel(),
            None => self.cancel(),
        }
    }

    pub fn take_failure(&self) -> Option<TagbooruError> {
        lock(&self.0.scope.failure).take()
    }

    /// Fail the scope with `Timeout` unless this token is cancelled first.
    pub fn cancel_after(&self, timeout: Duration) {
        let token = self.clone();
        let spawned = thread::Builder::new()
            .name("tagbooru-deadline".into())
            .spawn(move || {
                select! {
                    recv(token.done()) -> _ => {},
                    recv(after(timeout)) -> _ => token.fail(TagbooruError::Timeout),
                }
            });
        if let Err(e) = spawned {
            self.fail(TagbooruError::Invariant(format!(
                "cannot start deadline watchdog: {e}"
            )));
        }
    }

    /// Cancels this token when the guard goes out of scope.
    pub fn drop_guard(&self) -> CancelGuard {
        CancelGuard(self.clone())
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

pub struct CancelGuard(CancelToken);

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn cancelling_a_parent_cancels_children() {
        let parent = CancelToken::new();
        let child = parent.child();
        let grandchild = child.child();
        parent.cancel();
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
        assert!(grandchild.done().recv().is_err());
    }

    #[test]
    fn children_of_cancelled_tokens_start_cancelled() {
        let parent = CancelToken::new();
        parent.cancel();
        assert!(parent.child().is_cancelled());
    }

    #[test]
    fn cancelling_a_child_leaves_the_parent() {
        let parent = CancelToken::new();
        parent.child().cancel();
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn failure_cancels_the_scope_root() {
        let caller = CancelToken::new();
        let scope = caller.scope();
        let stage = scope.child().child();
        stage.fail(TagbooruError::Invariant("first".into()));
        stage.fail(TagbooruError::Invariant("second".into()));
        assert!(scope.is_cancelled());
        assert!(!caller.is_cancelled());
        assert!(matches!(
            scope.take_failure(),
            Some(TagbooruError::Invariant(message)) if message == "first"
        ));
        assert!(caller.take_failure().is_none());
    }

    #[test]
    fn deadline_reports_timeout() {
        let token = CancelToken::new();
        let started = Instant::now();
        token.cancel_after(Duration::from_millis(20));
        let _ = token.done().recv();
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert!(matches!(token.take_failure(), Some(TagbooruError::Timeout)));
    }

    #[test]
    fn guard_cancels_on_drop() {
        let token = CancelToken::new();
        {
            let _guard = token.drop_guard();
        }
        assert!(token.is_cancelled());
    }
}
