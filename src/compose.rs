//! Set algebra over ordered post streams.
//!
//! Every input must already be in stream order (see [`Post::order`]); every
//! output is produced in that same order. Posts are matched by identity:
//! two heads are "the same post" when `order` reports `Equal`.

use std::cmp::Ordering;

use crate::cancel::CancelToken;
use crate::construct::Post;
use crate::stream::{PostStream, spawn_with};

/// Drop the first `count` posts and forward the rest.
pub fn skip(token: &CancelToken, source: PostStream, count: u64) -> PostStream {
    if count == 0 {
        return source;
    }
    spawn_with(token, "skip", vec![source], move |emitter, mut inputs| {
        let mut source = inputs.remove(0);
        for _ in 0..count {
            if source.next().is_none() {
                return Ok(());
            }
        }
        emitter.forward(&mut source);
        Ok(())
    })
}

/// Forward at most `count` posts. The source is dropped, and with it every
/// stage feeding it is cancelled, as soon as the quota is reached.
pub fn limit(token: &CancelToken, source: PostStream, count: u64) -> PostStream {
    if count == 0 {
        return PostStream::empty();
    }
    spawn_with(token, "limit", vec![source], move |emitter, mut inputs| {
        let source = inputs.remove(0);
        for post in source.take(usize::try_from(count).unwrap_or(usize::MAX)) {
            if !emitter.emit(post) {
                break;
            }
        }
        Ok(())
    })
}

/// Posts present in every source. Zig-zag scan: every head that precedes
/// the furthest head is advanced until all heads agree; stops as soon as
/// any source runs out.
pub fn intersection(token: &CancelToken, sources: Vec<PostStream>) -> PostStream {
    match sources.len() {
        0 => return PostStream::empty(),
        1 => return sources.into_iter().next().unwrap_or_else(PostStream::empty),
        _ => {}
    }
    spawn_with(token, "and", sources, |emitter, mut sources| {
        let mut heads = Vec::with_capacity(sources.len());
        for source in sources.iter_mut() {
            match source.next() {
                Some(post) => heads.push(post),
                None => return Ok(()),
            }
        }

        loop {
            let mut furthest = 0;
            for i in 1..heads.len() {
                if heads[furthest].precedes(&heads[i])? {
                    furthest = i;
                }
            }

            let mut aligned = true;
            for i in 0..heads.len() {
                if heads[i].precedes(&heads[furthest])? {
                    aligned = false;
                    match sources[i].next() {
                        Some(post) => heads[i] = post,
                        None => return Ok(()),
                    }
                }
            }
            if !aligned {
                continue;
            }

            if !emitter.emit(heads[0].clone()) {
                return Ok(());
            }
            for (head, source) in heads.iter_mut().zip(sources.iter_mut()) {
                match source.next() {
                    Some(post) => *head = post,
                    None => return Ok(()),
                }
            }
        }
    })
}

/// Posts present in any source, each emitted once.
pub fn union(token: &CancelToken, sources: Vec<PostStream>) -> PostStream {
    match sources.len() {
        0 => return PostStream::empty(),
        1 => return sources.into_iter().next().unwrap_or_else(PostStream::empty),
        _ => {}
    }
    spawn_with(token, "or", sources, |emitter, mut sources| {
        let mut heads: Vec<Option<Post>> = sources.iter_mut().map(|s| s.next()).collect();

        loop {
            let mut first: Option<usize> = None;
            for (i, head) in heads.iter().enumerate() {
                let Some(post) = head else { continue };
                let earlier = match first.and_then(|f| heads[f].as_ref()) {
                    Some(current) => post.precedes(current)?,
                    None => true,
                };
                if earlier {
                    first = Some(i);
                }
            }
            let Some(first) = first else {
                return Ok(());
            };
            let Some(post) = heads[first].clone() else {
                return Ok(());
            };

            for (head, source) in heads.iter_mut().zip(sources.iter_mut()) {
                let same = match head {
                    Some(candidate) => candidate.order(&post)? == Ordering::Equal,
                    None => false,
                };
                if same {
                    *head = source.next();
                }
            }

            if !emitter.emit(post) {
                return Ok(());
            }
        }
    })
}

/// Posts of `universe` that are not in `subset`. `subset` must contain only
/// posts of `universe`, in the same order; posts of `subset` that are not
/// found are passed over rather than reported.
pub fn complement(token: &CancelToken, subset: PostStream, universe: PostStream) -> PostStream {
    spawn_with(token, "not", vec![subset, universe], |emitter, mut inputs| {
        let mut universe = inputs.remove(1);
        let mut subset = inputs.remove(0);
        let mut excluded = subset.next();

        for post in &mut universe {
            while let Some(candidate) = &excluded {
                if candidate.precedes(&post)? {
                    excluded = subset.next();
                } else {
                    break;
                }
            }
            if let Some(candidate) = &excluded {
                if candidate.order(&post)? == Ordering::Equal {
                    excluded = subset.next();
                    continue;
                }
            }
            if !emitter.emit(post) {
                return Ok(());
            }
        }
        Ok(())
    })
}

/// Number of posts left in `source`.
pub fn count(source: PostStream) -> u64 {
    source.fold(0, |n, _| n + 1)
}
