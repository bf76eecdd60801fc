//! Lazy, cancellable, ordered sequences of posts.
//!
//! Every stage of a query pipeline runs on its own thread and hands posts
//! to its consumer through a zero-capacity (rendezvous) channel, so each
//! stage holds at most one post in flight. The consumer end is a
//! [`PostStream`]; dropping it cancels the stage, which in turn drops and
//! cancels the stage's own inputs.

use std::thread;

use crossbeam_channel::{Receiver, Sender, bounded, select};
use tracing::warn;

use crate::cancel::CancelToken;
use crate::construct::Post;
use crate::error::{Result, TagbooruError};

pub struct PostStream {
    receiver: Receiver<Post>,
    token: CancelToken,
}

impl PostStream {
    /// A stream that is already exhausted.
    pub fn empty() -> Self {
        let (_, receiver) = bounded(0);
        Self {
            receiver,
            token: CancelToken::new(),
        }
    }

    /// Stream an in-memory sequence, which must already be in stream order.
    pub fn from_posts(parent: &CancelToken, posts: Vec<Post>) -> Self {
        spawn(parent, "posts", move |emitter| {
            for post in posts {
                if !emitter.emit(post) {
                    break;
                }
            }
            Ok(())
        })
    }

    /// The token of the stage producing this stream.
    pub fn token(&self) -> &CancelToken {
        &self.token
    }
}

impl Iterator for PostStream {
    type Item = Post;

    /// `None` once the producer is exhausted or the stage is cancelled.
    fn next(&mut self) -> Option<Post> {
        if self.token.is_cancelled() {
            return None;
        }
        let done = self.token.done();
        select! {
            recv(self.receiver) -> post => post.ok(),
            recv(done) -> _ => None,
        }
    }
}

impl Drop for PostStream {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Producer end handed to a stage body.
pub struct Emitter {
    sender: Sender<Post>,
    token: CancelToken,
}

impl Emitter {
    /// Hand `post` to the consumer. `false` means nobody will read any
    /// more and the stage should return.
    pub fn emit(&self, post: Post) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        let done = self.token.done();
        select! {
            send(self.sender, post) -> sent => sent.is_ok(),
            recv(done) -> _ => false,
        }
    }

    /// Forward the rest of `source` unchanged.
    pub fn forward(&self, source: &mut PostStream) {
        for post in source {
            if !self.emit(post) {
                return;
            }
        }
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }
}

/// Start a stage with no upstream stages.
pub fn spawn<F>(parent: &CancelToken, stage: &str, body: F) -> PostStream
where
    F: FnOnce(&Emitter) -> Result<()> + Send + 'static,
{
    spawn_with(parent, stage, Vec::new(), move |emitter, _| body(emitter))
}

/// Start a stage reading from `inputs`. The inputs' tokens are attached to
/// the stage token, so cancelling the stage cancels every input at once.
/// A body error is reported to the query's failure scope unless the stage
/// was already cancelled.
pub fn spawn_with<F>(
    parent: &CancelToken,
    stage: &str,
    inputs: Vec<PostStream>,
    body: F,
) -> PostStream
where
    F: FnOnce(&Emitter, Vec<PostStream>) -> Result<()> + Send + 'static,
{
    let token = parent.child();
    for input in &inputs {
        token.attach(input.token());
    }
    let (sender, receiver) = bounded(0);
    let emitter = Emitter {
        sender,
        token: token.clone(),
    };
    let name = format!("tagbooru-{stage}");
    let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
        if let Err(e) = body(&emitter, inputs) {
            if !emitter.token.is_cancelled() {
                warn!(error = %e, stage = %thread::current().name().unwrap_or_default(), "stage failed");
                emitter.token.fail(e);
            }
        }
    });
    if let Err(e) = spawned {
        token.fail(TagbooruError::Invariant(format!("cannot start {name}: {e}")));
    }
    PostStream { receiver, token }
}
