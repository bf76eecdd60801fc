use std::time::Duration;

use chrono::DateTime;
use crossbeam_channel::bounded;

use tagbooru::TagbooruError;
use tagbooru::cancel::CancelToken;
use tagbooru::compose::{complement, count, intersection, limit, skip, union};
use tagbooru::construct::{Post, PostId};
use tagbooru::stream::{PostStream, spawn};

// Post `id` is one second newer than post `id - 1`, so higher ids come first.
fn post(id: PostId) -> Post {
    Post::new(id, DateTime::from_timestamp(1_600_000_000 + id, 0).unwrap(), format!("{id}.png"))
}

fn stream(token: &CancelToken, ids: &[PostId]) -> PostStream {
    let mut ids = ids.to_vec();
    ids.sort_unstable_by(|a, b| b.cmp(a));
    PostStream::from_posts(token, ids.into_iter().map(post).collect())
}

fn ids(stream: PostStream) -> Vec<PostId> {
    stream.map(|p| p.id).collect()
}

fn assert_strictly_ordered(ids: &[PostId]) {
    for pair in ids.windows(2) {
        assert!(pair[0] > pair[1], "out of order: {ids:?}");
    }
}

#[test]
fn intersection_keeps_common_posts() {
    let token = CancelToken::new();
    let result = ids(intersection(
        &token,
        vec![
            stream(&token, &[1, 2, 3, 5, 8, 13]),
            stream(&token, &[2, 3, 4, 8, 9, 13, 14]),
            stream(&token, &[3, 8, 13, 21]),
        ],
    ));
    assert_strictly_ordered(&result);
    assert_eq!(result, vec![13, 8, 3]);
}

#[test]
fn intersection_stops_at_the_first_exhausted_input() {
    let token = CancelToken::new();
    let result = ids(intersection(
        &token,
        vec![stream(&token, &[1, 2, 3]), stream(&token, &[])],
    ));
    assert!(result.is_empty());
}

#[test]
fn exhausted_intersection_input_stops_the_others() {
    let token = CancelToken::new();
    let (finished, exited) = bounded(1);
    let endless = spawn(&token, "endless", move |emitter| {
        let mut id = 1_000_000;
        while emitter.emit(post(id)) {
            id -= 1;
        }
        let _ = finished.send(());
        Ok(())
    });
    let mut result = intersection(&token, vec![stream(&token, &[]), endless]);
    assert!(result.next().is_none());
    exited
        .recv_timeout(Duration::from_secs(5))
        .expect("input still running after another input ran dry");
    drop(result);
}

#[test]
fn union_emits_each_post_once() {
    let token = CancelToken::new();
    let result = ids(union(
        &token,
        vec![
            stream(&token, &[1, 4, 7]),
            stream(&token, &[2, 4, 8]),
            stream(&token, &[]),
            stream(&token, &[4, 7, 9]),
        ],
    ));
    assert_strictly_ordered(&result);
    assert_eq!(result, vec![9, 8, 7, 4, 2, 1]);
}

#[test]
fn complement_removes_the_subset() {
    let token = CancelToken::new();
    let result = ids(complement(
        &token,
        stream(&token, &[2, 5, 6]),
        stream(&token, &[1, 2, 3, 4, 5, 6, 7]),
    ));
    assert_strictly_ordered(&result);
    assert_eq!(result, vec![7, 4, 3, 1]);

    let rest = ids(complement(&token, stream(&token, &[]), stream(&token, &[1, 2])));
    assert_eq!(rest, vec![2, 1]);
}

#[test]
fn zero_and_one_inputs() {
    let token = CancelToken::new();
    assert!(ids(intersection(&token, vec![])).is_empty());
    assert!(ids(union(&token, vec![])).is_empty());
    assert_eq!(ids(union(&token, vec![stream(&token, &[1, 2])])), vec![2, 1]);
    assert_eq!(ids(intersection(&token, vec![stream(&token, &[3])])), vec![3]);
    assert!(ids(PostStream::empty()).is_empty());
}

#[test]
fn skip_then_limit_is_a_slice() {
    let all: Vec<PostId> = (1..=10).collect();
    let ordered: Vec<PostId> = all.iter().rev().copied().collect();
    for n in [0u64, 1, 3, 9, 10, 12] {
        for m in [0u64, 1, 4, 10, 20] {
            let token = CancelToken::new();
            let result = ids(limit(&token, skip(&token, stream(&token, &all), n), m));
            let start = (n as usize).min(ordered.len());
            let end = (start + m as usize).min(ordered.len());
            assert_eq!(result, ordered[start..end].to_vec(), "skip {n} limit {m}");
        }
    }
}

#[test]
fn count_drains_the_stream() {
    let token = CancelToken::new();
    assert_eq!(count(stream(&token, &[1, 2, 3, 4])), 4);
    assert_eq!(count(PostStream::empty()), 0);
}

#[test]
fn limit_stops_an_endless_producer() {
    let token = CancelToken::new();
    let (finished, exited) = bounded(1);
    let endless = spawn(&token, "endless", move |emitter| {
        let mut id = 1_000;
        while emitter.emit(post(id)) {
            id -= 1;
        }
        let _ = finished.send(());
        Ok(())
    });
    assert_eq!(ids(limit(&token, endless, 3)), vec![1000, 999, 998]);
    exited
        .recv_timeout(Duration::from_secs(5))
        .expect("producer still running after limit");
    assert!(!token.is_cancelled());
}

#[test]
fn dropping_a_composite_stops_every_input() {
    let token = CancelToken::new();
    let (finished, exited) = bounded(2);
    let mut inputs = Vec::new();
    for _ in 0..2 {
        let finished = finished.clone();
        inputs.push(spawn(&token, "endless", move |emitter| {
            let mut id = 1_000_000;
            while emitter.emit(post(id)) {
                id -= 1;
            }
            let _ = finished.send(());
            Ok(())
        }));
    }
    let mut merged = union(&token, inputs);
    assert_eq!(merged.next().map(|p| p.id), Some(1_000_000));
    drop(merged);
    for _ in 0..2 {
        exited
            .recv_timeout(Duration::from_secs(5))
            .expect("input still running after its consumer was dropped");
    }
}

#[test]
fn posts_sharing_a_sort_key_fail_the_scope() {
    let caller = CancelToken::new();
    let scope = caller.scope();
    let twin = Post::new(99, post(5).timestamp, "5.png");
    let left = PostStream::from_posts(&scope, vec![post(6), post(5)]);
    let right = PostStream::from_posts(&scope, vec![post(6), twin]);
    let result = ids(intersection(&scope, vec![left, right]));
    assert!(result.len() <= 1);
    assert!(matches!(
        scope.take_failure(),
        Some(TagbooruError::DataCorruption { .. })
    ));
    assert!(scope.is_cancelled());
    assert!(!caller.is_cancelled());
}

#[test]
fn cancelled_streams_end_early() {
    let token = CancelToken::new();
    let mut numbers = stream(&token, &[1, 2, 3]);
    assert_eq!(numbers.next().map(|p| p.id), Some(3));
    token.cancel();
    assert!(numbers.next().is_none());
}
