use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// custom made ordering for posts
use std::cmp::Ordering;

// used to print out readable forms of a construct
use std::fmt;

use crate::error::{Result, TagbooruError};

// ------------- Identities -------------
pub type PostId = i64;
pub type TagId = i64;

// ------------- Tag -------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub tag: String,
}
impl Tag {
    pub fn new(id: TagId, tag: impl Into<String>) -> Self {
        Self { id, tag: tag.into() }
    }
}
impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.tag)
    }
}

/// Tags of a post, kept sorted by name once handed to a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(Vec<Tag>);
impl Tags {
    pub fn new(mut tags: Vec<Tag>) -> Self {
        tags.sort_unstable_by(|a, b| a.tag.cmp(&b.tag));
        Self(tags)
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|t| t.tag.as_str()).collect()
    }
}
impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.names().join(" "))
    }
}

// ------------- Post -------------
// A post is only ever compared through `order`, never through `Ord`, so
// that two distinct posts sharing a sort key are reported instead of
// silently treated as equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub timestamp: DateTime<Utc>,
    pub post: String,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
}
impl Post {
    pub fn new(id: PostId, timestamp: DateTime<Utc>, post: impl Into<String>) -> Self {
        Self {
            id,
            timestamp,
            post: post.into(),
            tags: Tags::default(),
        }
    }
    /// Position of `self` relative to `other` in the stream order: newest
    /// first, ties broken by path descending. `Less` means `self` is
    /// emitted before `other`. Posts with the same id are `Equal`.
    pub fn order(&self, other: &Post) -> Result<Ordering> {
        if self.id == other.id {
            return Ok(Ordering::Equal);
        }
        match other
            .timestamp
            .cmp(&self.timestamp)
            .then_with(|| other.post.as_bytes().cmp(self.post.as_bytes()))
        {
            Ordering::Equal => Err(TagbooruError::DataCorruption {
                message: format!(
                    "posts {} and {} share timestamp {} and path {}",
                    self.id, other.id, self.timestamp, self.post
                ),
            }),
            ordering => Ok(ordering),
        }
    }
    pub fn precedes(&self, other: &Post) -> Result<bool> {
        Ok(self.order(other)? == Ordering::Less)
    }
}
impl fmt::Display for Post {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} [{}, {}]", self.id, self.timestamp, self.post)
    }
}
