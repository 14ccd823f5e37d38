//! Panoview Cache Library
//!
//! Tile texture cache for a pannable 360° viewer.
//!
//! A renderer tells the [`TextureStore`] which tiles it draws each frame;
//! the store starts loads for newly visible tiles, keeps recently visible
//! textures in a bounded pool, honors pins, and cancels or unloads the rest.
//! Loads go through a [`TileSource`] (tile to asset) and a
//! [`RenderBackend`] (asset to texture), and their outcome is reported as
//! [`TextureEvent`]s.
//!
//! The crate also provides the containers the store is built on: the
//! hash-bucketed [`Map`] and [`Set`], and the bounded insertion-ordered
//! [`LruSet`] and [`LruMap`].

pub mod config;
pub mod error;
pub mod events;
pub mod item;
pub mod lru;
pub mod map;
pub mod source;
pub mod store;

pub use config::{ConfigError, TextureStoreConfig};
pub use error::{CacheError, CacheResult};
pub use events::{Emitter, EventSink, ListenerId, TextureEvent, TextureEventKind};
pub use item::{LoadStatus, TileItem};
pub use lru::{LruMap, LruSet};
pub use map::{Map, Set, DEFAULT_CAPACITY};
pub use source::{Asset, RenderBackend, Texture, TileSource};
pub use store::{FrameState, TextureStore, TextureStoreStats, TileState};

pub use panoview_scheduler::{CancellationToken, LoadError, LoadFuture, RetryPolicy};
