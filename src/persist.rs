// used for persistence
use rusqlite::{Connection, ErrorCode, OptionalExtension, Transaction, params};
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::construct::{Post, PostId, Tag, TagId, Tags};
use crate::error::{Result, TagbooruError};

/// The read side of storage that index generation consumes. Both methods
/// stream rows into `sink` while a single read is open; an error from the
/// sink stops the read and is returned as is.
pub trait Catalog: Send + Sync {
    /// Every distinct tag name, ascending.
    fn tag_names(&self, sink: &mut dyn FnMut(String) -> Result<()>) -> Result<()>;
    /// Every post (`tag == None`) or the posts tagged `tag`, newest first
    /// and path descending within a timestamp.
    fn posts(&self, tag: Option<&str>, sink: &mut dyn FnMut(Post) -> Result<()>) -> Result<()>;
}

const SCHEMA: &str = "
    create table if not exists posts (
        id integer not null primary key autoincrement,
        timestamp timestamp not null,
        post text unique not null
    );
    create table if not exists tags (
        id integer not null primary key autoincrement,
        tag text unique not null
    );
    create table if not exists relations (
        post integer not null references posts(id),
        tag integer not null references tags(id),
        constraint unique_relation primary key (post, tag)
    );
    create index if not exists relations_by_tag on relations (tag, post);
";

const INSERT_POST: &str = "insert into posts (post, timestamp) values (?, ?)";
const INSERT_TAG: &str = "insert into tags (tag) values (?)";
const ASSOCIATE_TAG: &str = "insert into relations (post, tag) values (?, ?)";
const DISSOCIATE_TAG: &str = "delete from relations where post = ? and tag = ?";
const POST_VALID_ID: &str = "select count(*) from posts where id = ?";
const TAG_ID: &str = "select id from tags where tag = ?";
const POST_BY_PATH: &str = "select id, timestamp, post from posts where post = ?";
const POST_BY_ID: &str = "select id, timestamp, post from posts where id = ?";
const POST_TAGS: &str = "
    select tags.id, tags.tag
        from relations
        join tags on relations.tag = tags.id
        where relations.post = ?
        order by tags.tag
";
const ALL_TAG_NAMES: &str = "select tags.tag from tags order by tags.tag";
const TAGGED_POSTS: &str = "
    select posts.id, posts.timestamp, posts.post
        from posts
        join relations on posts.id = relations.post
        join tags on relations.tag = tags.id
        where tags.tag = ?
        order by posts.timestamp desc, posts.post desc
";
const EVERY_POST: &str = "
    select posts.id, posts.timestamp, posts.post
        from posts
        order by posts.timestamp desc, posts.post desc
";

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation)
}

fn post_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Post> {
    let id: PostId = row.get(0)?;
    let timestamp: DateTime<Utc> = row.get(1)?;
    let post: String = row.get(2)?;
    Ok(Post::new(id, timestamp, post))
}

// ------------- Persistence -------------
/// SQLite storage for posts, tags and their relations. The connection is
/// guarded by a mutex and every logical operation runs in its own
/// transaction.
pub struct Persistor {
    db: Mutex<Connection>,
}

impl Persistor {
    pub fn new(connection: Connection) -> Result<Self> {
        connection.execute_batch(SCHEMA)?;
        Ok(Self {
            db: Mutex::new(connection),
        })
    }
    /// Open (or create) the database at `path`; `:memory:` gives a private
    /// in-memory database.
    pub fn open(path: &str) -> Result<Self> {
        debug!(path, "opening database");
        Self::new(Connection::open(path)?)
    }
    pub fn in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }
    pub fn close(self) -> Result<()> {
        let connection = self.db.into_inner().unwrap_or_else(PoisonError::into_inner);
        connection.close().map_err(|(_, e)| e.into())
    }
    fn connection(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn validate_post_id(transaction: &Transaction<'_>, id: PostId) -> Result<()> {
        let count: i64 = transaction
            .prepare_cached(POST_VALID_ID)?
            .query_row(params![id], |r| r.get(0))?;
        if count != 1 {
            return Err(TagbooruError::InvalidPostId(id));
        }
        Ok(())
    }
    fn existing_tag(transaction: &Transaction<'_>, tag: &str) -> Result<Option<TagId>> {
        Ok(transaction
            .prepare_cached(TAG_ID)?
            .query_row(params![tag], |r| r.get(0))
            .optional()?)
    }
    fn get_or_create_tag(transaction: &Transaction<'_>, tag: &str) -> Result<TagId> {
        if let Some(id) = Self::existing_tag(transaction, tag)? {
            return Ok(id);
        }
        transaction.prepare_cached(INSERT_TAG)?.execute(params![tag])?;
        Ok(transaction.last_insert_rowid())
    }
    fn tags_of(transaction: &Transaction<'_>, id: PostId) -> Result<Tags> {
        let mut statement = transaction.prepare_cached(POST_TAGS)?;
        let tags = statement
            .query_map(params![id], |r| Ok(Tag::new(r.get(0)?, r.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Tags::new(tags))
    }
    fn post_where(&self, statement: &str, key: &dyn rusqlite::ToSql) -> Result<Option<Post>> {
        let mut db = self.connection();
        let transaction = db.transaction()?;
        let post = transaction
            .prepare_cached(statement)?
            .query_row([key], post_from_row)
            .optional()?;
        let post = match post {
            Some(mut post) => {
                post.tags = Self::tags_of(&transaction, post.id)?;
                Some(post)
            }
            None => None,
        };
        transaction.commit()?;
        Ok(post)
    }

    pub fn new_post(&self, post: &str, timestamp: DateTime<Utc>) -> Result<PostId> {
        let mut db = self.connection();
        let transaction = db.transaction()?;
        match transaction
            .prepare_cached(INSERT_POST)?
            .execute(params![post, timestamp])
        {
            Ok(_) => (),
            Err(e) if is_constraint_violation(&e) => {
                return Err(TagbooruError::DuplicatePost(post.to_string()));
            }
            Err(e) => return Err(e.into()),
        }
        let id = transaction.last_insert_rowid();
        transaction.commit()?;
        Ok(id)
    }
    pub fn tag_post(&self, id: PostId, tag: &str) -> Result<()> {
        let mut db = self.connection();
        let transaction = db.transaction()?;
        Self::validate_post_id(&transaction, id)?;
        let tag_id = Self::get_or_create_tag(&transaction, tag)?;
        match transaction
            .prepare_cached(ASSOCIATE_TAG)?
            .execute(params![id, tag_id])
        {
            Ok(_) => (),
            Err(e) if is_constraint_violation(&e) => {
                return Err(TagbooruError::DuplicateTag {
                    post: id,
                    tag: tag.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        }
        transaction.commit()?;
        Ok(())
    }
    /// Unknown tags are not created; removing them is a no-op.
    pub fn untag_post(&self, id: PostId, tag: &str) -> Result<()> {
        let mut db = self.connection();
        let transaction = db.transaction()?;
        Self::validate_post_id(&transaction, id)?;
        if let Some(tag_id) = Self::existing_tag(&transaction, tag)? {
            transaction
                .prepare_cached(DISSOCIATE_TAG)?
                .execute(params![id, tag_id])?;
        }
        transaction.commit()?;
        Ok(())
    }
    pub fn post(&self, path: &str) -> Result<Post> {
        self.post_where(POST_BY_PATH, &path)?
            .ok_or_else(|| TagbooruError::PostNotFound(path.to_string()))
    }
    pub fn post_by_id(&self, id: PostId) -> Result<Post> {
        self.post_where(POST_BY_ID, &id)?
            .ok_or(TagbooruError::InvalidPostId(id))
    }
    pub fn post_tags(&self, id: PostId) -> Result<Tags> {
        let mut db = self.connection();
        let transaction = db.transaction()?;
        let tags = Self::tags_of(&transaction, id)?;
        transaction.commit()?;
        Ok(tags)
    }
    /// Fill in the tags of a whole page within one transaction.
    pub fn attach_tags(&self, posts: &mut [Post]) -> Result<()> {
        let mut db = self.connection();
        let transaction = db.transaction()?;
        for post in posts.iter_mut() {
            post.tags = Self::tags_of(&transaction, post.id)?;
        }
        transaction.commit()?;
        Ok(())
    }
}

impl Catalog for Persistor {
    fn tag_names(&self, sink: &mut dyn FnMut(String) -> Result<()>) -> Result<()> {
        let db = self.connection();
        let mut statement = db.prepare_cached(ALL_TAG_NAMES)?;
        let mut rows = statement.query([])?;
        while let Some(row) = rows.next()? {
            sink(row.get(0)?)?;
        }
        Ok(())
    }
    fn posts(&self, tag: Option<&str>, sink: &mut dyn FnMut(Post) -> Result<()>) -> Result<()> {
        let db = self.connection();
        let mut statement = match tag {
            Some(_) => db.prepare_cached(TAGGED_POSTS)?,
            None => db.prepare_cached(EVERY_POST)?,
        };
        let mut rows = match tag {
            Some(tag) => statement.query(params![tag])?,
            None => statement.query([])?,
        };
        while let Some(row) = rows.next()? {
            sink(post_from_row(row)?)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(seconds, 0).unwrap()
    }

    #[test]
    fn timestamps_order_like_posts_do() {
        let persistor = Persistor::in_memory().unwrap();
        persistor.new_post("a", at(100)).unwrap();
        persistor.new_post("b", at(100)).unwrap();
        persistor
            .new_post("c", DateTime::from_timestamp(100, 500_000_000).unwrap())
            .unwrap();
        persistor.new_post("d", at(99)).unwrap();
        let mut posts = Vec::new();
        persistor
            .posts(None, &mut |post| {
                posts.push(post);
                Ok(())
            })
            .unwrap();
        let paths: Vec<&str> = posts.iter().map(|p| p.post.as_str()).collect();
        assert_eq!(paths, vec!["c", "b", "a", "d"]);
        for pair in posts.windows(2) {
            assert!(pair[0].precedes(&pair[1]).unwrap());
        }
    }

    #[test]
    fn sink_errors_stop_the_read() {
        let persistor = Persistor::in_memory().unwrap();
        persistor.new_post("a", at(1)).unwrap();
        persistor.new_post("b", at(2)).unwrap();
        let mut seen = 0;
        let result = persistor.posts(None, &mut |_| {
            seen += 1;
            Err(TagbooruError::Cancelled)
        });
        assert!(matches!(result, Err(TagbooruError::Cancelled)));
        assert_eq!(seen, 1);
    }
}
