//! On-disk cache of ordered post lists.
//!
//! Each entry is a file of newline-delimited JSON records in the index
//! directory: one per tag (named by the blake3 digest of the tag), one for
//! every post (`all`) and one listing every tag name (`tags`). Entries are
//! generated on first use from the [`Catalog`] and never modified after.
//! A new entry is written to a temporary file and renamed into place, so a
//! reader only ever sees complete entries. Two callers racing on the same
//! missing entry may both generate it; the last rename wins and both
//! versions are complete.

use std::cmp::Ordering;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::construct::Post;
use crate::error::{Result, TagbooruError};
use crate::persist::Catalog;
use crate::stream::{PostStream, spawn};

pub const ALL_POSTS_FILE: &str = "all";
pub const TAG_NAMES_FILE: &str = "tags";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexKey {
    All,
    Tag(String),
}

impl IndexKey {
    pub fn tag(tag: impl Into<String>) -> Self {
        IndexKey::Tag(tag.into())
    }

    /// 64 hex digits for a tag, which can never equal the reserved names.
    pub fn file_name(&self) -> String {
        match self {
            IndexKey::All => ALL_POSTS_FILE.to_string(),
            IndexKey::Tag(tag) => blake3::hash(tag.as_bytes()).to_hex().to_string(),
        }
    }

    fn catalog_tag(&self) -> Option<&str> {
        match self {
            IndexKey::All => None,
            IndexKey::Tag(tag) => Some(tag),
        }
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::All => write!(f, "all posts"),
            IndexKey::Tag(tag) => write!(f, "tag {tag}"),
        }
    }
}

fn generation_failed(index: &str, error: TagbooruError) -> TagbooruError {
    match error {
        TagbooruError::Cancelled => error,
        error => TagbooruError::IndexGeneration {
            index: index.to_string(),
            source: Box::new(error),
        },
    }
}

#[derive(Clone)]
pub struct IndexCache {
    directory: PathBuf,
    catalog: Arc<dyn Catalog>,
}

impl IndexCache {
    /// Creates `directory` if it does not exist yet.
    pub fn new(directory: impl Into<PathBuf>, catalog: Arc<dyn Catalog>) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        Ok(Self { directory, catalog })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn path_for(&self, key: &IndexKey) -> PathBuf {
        self.directory.join(key.file_name())
    }

    pub fn tag_names_path(&self) -> PathBuf {
        self.directory.join(TAG_NAMES_FILE)
    }

    pub fn is_generated(&self, key: &IndexKey) -> bool {
        self.path_for(key).exists()
    }

    pub fn is_tag_name_index_generated(&self) -> bool {
        self.tag_names_path().exists()
    }

    /// No-op when the entry already exists.
    pub fn generate_index(&self, token: &CancelToken, key: &IndexKey) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            return Ok(());
        }
        debug!(index = %key, "generating index");
        let written = self
            .write_entry::<Post, _>(token, &path, |write| {
                self.catalog.posts(key.catalog_tag(), &mut |post| write(&post))
            })
            .map_err(|e| generation_failed(&key.to_string(), e))?;
        debug!(index = %key, posts = written, "generated index");
        Ok(())
    }

    /// The tag-name list is generated once and never refreshed, so tags
    /// added later are not seen by `regex:` until the file is removed.
    pub fn generate_tag_name_index(&self, token: &CancelToken) -> Result<()> {
        let path = self.tag_names_path();
        if path.exists() {
            return Ok(());
        }
        debug!("generating tag name index");
        let written = self
            .write_entry::<String, _>(token, &path, |write| {
                self.catalog.tag_names(&mut |tag| write(&tag))
            })
            .map_err(|e| generation_failed(TAG_NAMES_FILE, e))?;
        debug!(tags = written, "generated tag name index");
        Ok(())
    }

    /// Generate the universal index and the index of every known tag.
    pub fn generate_indexes(&self, token: &CancelToken) -> Result<()> {
        self.generate_index(token, &IndexKey::All)?;
        let mut tags = Vec::new();
        self.catalog.tag_names(&mut |tag| {
            tags.push(tag);
            Ok(())
        })?;
        for tag in &tags {
            self.generate_index(token, &IndexKey::tag(tag.as_str()))?;
        }
        info!(tags = tags.len(), "indexes generated");
        Ok(())
    }

    /// Stream an entry, generating it first if needed. Generation and
    /// decoding failures go to the token's failure scope.
    pub fn stream_for(&self, token: &CancelToken, key: IndexKey) -> PostStream {
        let cache = self.clone();
        spawn(token, "index", move |emitter| {
            cache.generate_index(emitter.token(), &key)?;
            let file = File::open(cache.path_for(&key))?;
            let records =
                serde_json::Deserializer::from_reader(BufReader::new(file)).into_iter::<Post>();
            let mut previous: Option<Post> = None;
            for post in records {
                let post = post?;
                if let Some(previous) = &previous {
                    if !previous.precedes(&post)? {
                        return Err(TagbooruError::DataCorruption {
                            message: format!("index for {key} is out of order at post {}", post.id),
                        });
                    }
                }
                if !emitter.emit(post.clone()) {
                    return Ok(());
                }
                previous = Some(post);
            }
            Ok(())
        })
    }

    /// Posts carrying any of `tags`, merged by a single stage that reads
    /// the entries one at a time. Used instead of a union over one
    /// `stream_for` stage per tag when the tag list is long.
    pub fn stream_for_any(&self, token: &CancelToken, tags: Vec<String>) -> PostStream {
        let cache = self.clone();
        spawn(token, "index-merge", move |emitter| {
            let mut posts: Vec<Post> = Vec::new();
            for tag in tags {
                let key = IndexKey::tag(tag);
                cache.generate_index(emitter.token(), &key)?;
                posts.extend(read_entry::<Post>(&cache.path_for(&key))?);
                if emitter.token().is_cancelled() {
                    return Ok(());
                }
            }
            let mut failure = None;
            posts.sort_by(|a, b| {
                a.order(b).unwrap_or_else(|e| {
                    failure.get_or_insert(e);
                    Ordering::Equal
                })
            });
            if let Some(e) = failure {
                return Err(e);
            }
            posts.dedup_by_key(|post| post.id);
            debug!(posts = posts.len(), "merged tag indexes");
            for post in posts {
                if !emitter.emit(post) {
                    break;
                }
            }
            Ok(())
        })
    }

    /// Every known tag name matching `pattern`, ascending.
    pub fn matching_tag_names(&self, token: &CancelToken, pattern: &Regex) -> Result<Vec<String>> {
        self.generate_tag_name_index(token)?;
        let file = File::open(self.tag_names_path())?;
        let mut matches = Vec::new();
        for tag in serde_json::Deserializer::from_reader(BufReader::new(file)).into_iter::<String>()
        {
            if token.is_cancelled() {
                return Err(TagbooruError::Cancelled);
            }
            let tag = tag?;
            if pattern.is_match(&tag) {
                matches.push(tag);
            }
        }
        Ok(matches)
    }

    /// Write every record `fill` produces to a temporary file, then move it
    /// to `path`. Nothing is left behind on failure.
    fn write_entry<T, F>(&self, token: &CancelToken, path: &Path, fill: F) -> Result<usize>
    where
        T: Serialize,
        F: FnOnce(&mut dyn FnMut(&T) -> Result<()>) -> Result<()>,
    {
        let mut file = NamedTempFile::new_in(&self.directory)?;
        let mut written = 0;
        {
            let mut writer = BufWriter::new(file.as_file_mut());
            fill(&mut |record: &T| {
                if token.is_cancelled() {
                    return Err(TagbooruError::Cancelled);
                }
                serde_json::to_writer(&mut writer, record)?;
                writer.write_all(b"\n")?;
                written += 1;
                Ok(())
            })?;
            writer.flush()?;
        }
        file.as_file().sync_all()?;
        if let Err(e) = file.persist(path) {
            // a concurrent generator got there first
            if !path.exists() {
                return Err(e.error.into());
            }
        }
        Ok(written)
    }
}

/// Decode every record of a cache file; used by tooling and tests.
pub fn read_entry<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path)?;
    serde_json::Deserializer::from_reader(BufReader::new(file))
        .into_iter::<T>()
        .map(|record| record.map_err(TagbooruError::from))
        .collect()
}
