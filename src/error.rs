use thiserror::Error;

use crate::construct::PostId;

#[derive(Error, Debug)]
pub enum TagbooruError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Data corruption: {message}")]
    DataCorruption { message: String },
    #[error("Parse error: unexpected {token} in {context} (offset {offset})")]
    Parse {
        token: String,
        context: &'static str,
        offset: usize,
    },
    #[error("invalid post id {0}")]
    InvalidPostId(PostId),
    #[error("no post at {0}")]
    PostNotFound(String),
    #[error("duplicate post {0}")]
    DuplicatePost(String),
    #[error("duplicate tag {tag} on post {post}")]
    DuplicateTag { post: PostId, tag: String },
    #[error("index generation failed for {index}: {source}")]
    IndexGeneration {
        index: String,
        #[source]
        source: Box<TagbooruError>,
    },
    #[error("regex: {0}")]
    PatternCompile(String),
    #[error("regex: no tags match {0}")]
    PatternNoMatch(String),
    #[error("baseline {0} not found")]
    BaselineNotFound(String),
    #[error("baseline error: {0}")]
    Baseline(String),
    #[error("query cancelled")]
    Cancelled,
    #[error("query timed out")]
    Timeout,
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, TagbooruError>;

// Helper conversions
impl From<rusqlite::Error> for TagbooruError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl From<regex::Error> for TagbooruError {
    fn from(e: regex::Error) -> Self {
        Self::PatternCompile(e.to_string())
    }
}

impl From<serde_json::Error> for TagbooruError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Self::Io(e.into())
        } else {
            Self::DataCorruption {
                message: e.to_string(),
            }
        }
    }
}
