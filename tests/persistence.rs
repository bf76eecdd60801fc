use chrono::DateTime;

use tagbooru::TagbooruError;
use tagbooru::persist::{Catalog, Persistor};

fn at(seconds: i64) -> DateTime<chrono::Utc> {
    DateTime::from_timestamp(seconds, 0).unwrap()
}

#[test]
fn duplicate_posts_are_rejected() {
    let persistor = Persistor::in_memory().unwrap();
    persistor.new_post("a.png", at(1)).unwrap();
    assert!(matches!(
        persistor.new_post("a.png", at(2)),
        Err(TagbooruError::DuplicatePost(path)) if path == "a.png"
    ));
}

#[test]
fn duplicate_tags_are_rejected() {
    let persistor = Persistor::in_memory().unwrap();
    let id = persistor.new_post("a.png", at(1)).unwrap();
    persistor.tag_post(id, "cat").unwrap();
    assert!(matches!(
        persistor.tag_post(id, "cat"),
        Err(TagbooruError::DuplicateTag { post, tag }) if post == id && tag == "cat"
    ));
}

#[test]
fn mutations_validate_the_post_id() {
    let persistor = Persistor::in_memory().unwrap();
    assert!(matches!(persistor.tag_post(7, "cat"), Err(TagbooruError::InvalidPostId(7))));
    assert!(matches!(persistor.untag_post(7, "cat"), Err(TagbooruError::InvalidPostId(7))));
    assert!(matches!(persistor.post_by_id(7), Err(TagbooruError::InvalidPostId(7))));
    assert!(matches!(persistor.post("nope"), Err(TagbooruError::PostNotFound(_))));

    // the failed tag_post did not leave a tag behind
    let mut names = Vec::new();
    persistor
        .tag_names(&mut |name| {
            names.push(name);
            Ok(())
        })
        .unwrap();
    assert!(names.is_empty());
}

#[test]
fn tags_come_back_sorted() {
    let persistor = Persistor::in_memory().unwrap();
    let id = persistor.new_post("a.png", at(1)).unwrap();
    for tag in ["zebra", "apple", "mango"] {
        persistor.tag_post(id, tag).unwrap();
    }
    let post = persistor.post("a.png").unwrap();
    assert_eq!(post.id, id);
    assert_eq!(post.tags.names(), vec!["apple", "mango", "zebra"]);
    assert_eq!(persistor.post_by_id(id).unwrap(), post);
}

#[test]
fn untagging_removes_only_the_relation() {
    let persistor = Persistor::in_memory().unwrap();
    let a = persistor.new_post("a.png", at(1)).unwrap();
    let b = persistor.new_post("b.png", at(2)).unwrap();
    persistor.tag_post(a, "cat").unwrap();
    persistor.tag_post(b, "cat").unwrap();
    persistor.untag_post(a, "cat").unwrap();
    persistor.untag_post(a, "never-seen").unwrap();

    assert!(persistor.post_tags(a).unwrap().is_empty());
    let mut tagged = Vec::new();
    persistor
        .posts(Some("cat"), &mut |post| {
            tagged.push(post.post);
            Ok(())
        })
        .unwrap();
    assert_eq!(tagged, vec!["b.png"]);

    let mut names = Vec::new();
    persistor
        .tag_names(&mut |name| {
            names.push(name);
            Ok(())
        })
        .unwrap();
    assert_eq!(names, vec!["cat"]);
}

#[test]
fn attach_tags_fills_a_page() {
    let persistor = Persistor::in_memory().unwrap();
    let a = persistor.new_post("a.png", at(1)).unwrap();
    let b = persistor.new_post("b.png", at(2)).unwrap();
    persistor.tag_post(a, "cat").unwrap();
    persistor.tag_post(b, "dog").unwrap();
    persistor.tag_post(b, "cat").unwrap();

    let mut page = Vec::new();
    persistor
        .posts(None, &mut |post| {
            page.push(post);
            Ok(())
        })
        .unwrap();
    assert!(page.iter().all(|post| post.tags.is_empty()));
    persistor.attach_tags(&mut page).unwrap();
    let tags: Vec<Vec<&str>> = page.iter().map(|post| post.tags.names()).collect();
    assert_eq!(tags, vec![vec!["cat", "dog"], vec!["cat"]]);
}

#[test]
fn file_databases_survive_reopening() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("booru.db");
    let path = path.to_str().unwrap();
    {
        let persistor = Persistor::open(path).unwrap();
        let id = persistor.new_post("a.png", at(1)).unwrap();
        persistor.tag_post(id, "cat").unwrap();
        persistor.close().unwrap();
    }
    let persistor = Persistor::open(path).unwrap();
    assert_eq!(persistor.post("a.png").unwrap().tags.names(), vec!["cat"]);
}
