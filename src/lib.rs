//! Tagbooru – tag search over a collection of posts.
//!
//! A *post* is a path with a timestamp and a set of tags. Queries are
//! written in a small language of tags:
//! * `a b` – posts tagged both `a` and `b`.
//! * `a ~b ~c` – posts tagged `a` and at least one of `b` or `c`.
//! * `-a` – posts not tagged `a`.
//! * `(( … ))` – a nested query, usable anywhere a tag is.
//! * `baseline:<name>` – the stored query called `<name>`.
//! * `regex:<pattern>` – any tag whose name matches `<pattern>`.
//!
//! Results always come newest first, ties broken by path descending.
//!
//! ## Modules
//! * [`parse`] with [`lexer`] and [`ast`] – query text to syntax tree.
//! * [`stream`] and [`compose`] – ordered, cancellable post streams and the
//!   set algebra over them, each stage on its own thread.
//! * [`index`] – per-tag post lists cached on disk, generated on demand from
//!   the SQLite storage in [`persist`].
//! * [`evaluate`] – lowering a syntax tree to a stream.
//! * [`booru`] – paged queries and storage operations; [`server`] exposes
//!   them over HTTP.
//!
//! ## Quick Start
//! ```
//! use std::sync::Arc;
//! use chrono::Utc;
//! use tagbooru::{Booru, baseline::BaselineDirectory, persist::Persistor};
//! let index = tempfile::tempdir().unwrap();
//! let persistor = Arc::new(Persistor::in_memory().unwrap());
//! let booru = Booru::new(persistor, index.path(), Arc::new(BaselineDirectory::new("baseline"))).unwrap();
//! let id = booru.new_post("cat.png", Utc::now()).unwrap();
//! booru.tag_post(id, "cat").unwrap();
//! let page = booru.query("cat -dog", 0, 24).unwrap();
//! assert_eq!(page[0].post, "cat.png");
//! ```

pub mod ast;
pub mod baseline;
pub mod booru;
pub mod cancel;
pub mod compose;
pub mod config;
pub mod construct;
pub mod error;
pub mod evaluate;
pub mod index;
pub mod lexer;
pub mod parse;
pub mod persist;
pub mod server;
pub mod stream;

pub use booru::Booru;
pub use cancel::CancelToken;
pub use construct::{Post, PostId, Tag, Tags};
pub use error::{Result, TagbooruError};
pub use parse::parse;
pub use stream::PostStream;
