//! Frame-driven texture store
//!
//! Decides, frame over frame, which tiles must be loading, which stay
//! resident and which are evicted.
//!
//! A renderer brackets each frame with [`TextureStore::start_frame`] and
//! [`TextureStore::end_frame`] and marks every tile it draws in between.
//! Frames may nest; visibility changes are applied all at once when the
//! outermost frame closes:
//!
//! 1. tiles visible last frame but not marked this frame become
//!    "no longer visible";
//! 2. marked tiles found in the previously-visible pool are promoted back;
//! 3. no-longer-visible tiles with a texture enter the previously-visible
//!    pool, the others are unloaded;
//! 4. tiles pushed out of the pool are unloaded unless pinned;
//! 5. marked tiles without an entry start loading;
//! 6. the marked set becomes the visible set.
//!
//! Pinned tiles are never evicted automatically, whatever their visibility.

use std::hash::Hash;
use std::task::{Context, Poll};

use futures::future::{self, Future};
use futures::task::noop_waker;
use log::{debug, trace};
use panoview_scheduler::RetryPolicy;

use crate::config::TextureStoreConfig;
use crate::error::{CacheError, CacheResult};
use crate::events::{Emitter, EventSink, ListenerId, TextureEvent, TextureEventKind};
use crate::item::TileItem;
use crate::lru::LruSet;
use crate::map::{Map, Set};
use crate::source::{RenderBackend, TileSource};

/// Position within the frame protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// No frame is open
    Idle,
    /// A frame was opened and nothing marked yet
    Start,
    /// At least one tile was marked in the open frame
    Mark,
    /// An inner frame was closed; the outer one is still open
    End,
}

/// Snapshot of what the store knows about one tile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileState {
    /// Visible as of the last completed frame
    pub visible: bool,
    /// Held in the previously-visible pool
    pub previously_visible: bool,
    /// An asset is currently retained
    pub has_asset: bool,
    /// A texture is available
    pub has_texture: bool,
    /// Pinned at least once
    pub pinned: bool,
    /// Outstanding pins
    pub pin_count: usize,
}

/// Statistics about texture store activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextureStoreStats {
    /// Loads started
    pub loads_started: u64,
    /// Loads that produced a texture
    pub loads_completed: u64,
    /// Loads cancelled before resolving
    pub loads_cancelled: u64,
    /// Loads that failed
    pub load_errors: u64,
    /// Settled entries unloaded
    pub unloads: u64,
    /// Tiles pushed out of the previously-visible pool
    pub evictions: u64,
    /// Texture invalidations forwarded from dynamic assets
    pub invalidations: u64,

    /// Entries currently cached (loading or loaded)
    pub cached_tiles: usize,
    /// Tiles visible as of the last completed frame
    pub visible_tiles: usize,
    /// Tiles in the previously-visible pool
    pub previously_visible_tiles: usize,
    /// Tiles with outstanding pins
    pub pinned_tiles: usize,
    /// Entries with a load in flight
    pub loading_tiles: usize,
}

impl TextureStoreStats {
    /// Fraction of started loads that produced a texture (0.0 to 1.0)
    pub fn completion_rate(&self) -> f64 {
        if self.loads_started == 0 {
            0.0
        } else {
            self.loads_completed as f64 / self.loads_started as f64
        }
    }
}

/// Emitter plus the counters derived from what it delivers
struct Notifier<T> {
    emitter: Emitter<T>,
    stats: TextureStoreStats,
}

impl<T> EventSink<T> for Notifier<T> {
    fn notify(&mut self, event: TextureEvent<T>) {
        match event.kind() {
            TextureEventKind::StartLoad => self.stats.loads_started += 1,
            TextureEventKind::Load => self.stats.loads_completed += 1,
            TextureEventKind::Unload => self.stats.unloads += 1,
            TextureEventKind::Invalid => self.stats.invalidations += 1,
            TextureEventKind::Cancel => self.stats.loads_cancelled += 1,
            TextureEventKind::Error => self.stats.load_errors += 1,
        }
        self.emitter.emit(&event);
    }
}

type Item<T, S, B> = TileItem<
    <S as TileSource<T>>::Asset,
    <B as RenderBackend<T, <S as TileSource<T>>::Asset>>::Texture,
>;

/// Texture cache driven by the frame protocol
///
/// # Example
///
/// ```
/// use futures::future::{self, FutureExt};
/// use panoview_cache::{
///     Asset, CancellationToken, LoadFuture, RenderBackend, Texture, TextureStore,
///     TextureStoreConfig, TileSource,
/// };
///
/// struct Pixels;
/// impl Asset for Pixels {}
///
/// struct Handle;
/// impl Texture<u32, Pixels> for Handle {
///     fn refresh(&mut self, _tile: &u32, _asset: &Pixels) {}
/// }
///
/// struct Source;
/// impl TileSource<u32> for Source {
///     type Asset = Pixels;
///     fn load_asset(&self, _tile: &u32, _cancel: &CancellationToken) -> LoadFuture<Pixels> {
///         future::ready(Ok(Pixels)).boxed_local()
///     }
/// }
///
/// struct Backend;
/// impl RenderBackend<u32, Pixels> for Backend {
///     type Texture = Handle;
///     fn create_texture(&self, _: &u32, _: &Pixels, _: &CancellationToken) -> LoadFuture<Handle> {
///         future::ready(Ok(Handle)).boxed_local()
///     }
/// }
///
/// let mut store: TextureStore<u32, _, _> =
///     TextureStore::new(Source, Backend, TextureStoreConfig::default()).unwrap();
///
/// store.start_frame().unwrap();
/// store.mark_tile(&7).unwrap();
/// store.end_frame().unwrap();
///
/// store.process_loads();
/// assert!(store.texture(&7).is_some());
/// ```
pub struct TextureStore<T, S, B>
where
    S: TileSource<T>,
    B: RenderBackend<T, S::Asset>,
{
    source: S,
    backend: B,
    config: TextureStoreConfig,
    retry: RetryPolicy,

    item_map: Map<T, Item<T, S, B>>,
    visible: Set<T>,
    previously_visible: LruSet<T>,
    pin_map: Map<T, usize>,
    new_visible: Set<T>,

    frame: FrameState,
    frame_depth: usize,
    next_id: u64,

    notifier: Notifier<T>,
}

impl<T, S, B> TextureStore<T, S, B>
where
    T: Hash + Eq + Clone,
    S: TileSource<T>,
    B: RenderBackend<T, S::Asset>,
{
    /// Create an empty store loading through `source` and `backend`
    ///
    /// # Errors
    /// Returns [`CacheError::InvalidArgument`] if `config` is invalid.
    pub fn new(source: S, backend: B, config: TextureStoreConfig) -> CacheResult<Self> {
        config.validate()?;
        Ok(Self {
            source,
            backend,
            config,
            retry: RetryPolicy::new(config.max_load_attempts),
            item_map: Map::with_capacity(config.map_capacity)?,
            visible: Set::with_capacity(config.map_capacity)?,
            previously_visible: LruSet::new(config.previously_visible_cache_size),
            pin_map: Map::with_capacity(config.map_capacity)?,
            new_visible: Set::with_capacity(config.map_capacity)?,
            frame: FrameState::Idle,
            frame_depth: 0,
            next_id: 0,
            notifier: Notifier {
                emitter: Emitter::new(),
                stats: TextureStoreStats::default(),
            },
        })
    }

    /// The configuration this store was built with
    pub fn config(&self) -> &TextureStoreConfig {
        &self.config
    }

    /// The asset source
    pub fn source(&self) -> &S {
        &self.source
    }

    /// The render backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Register `listener` for events of `kind`
    pub fn add_listener<F>(&mut self, kind: TextureEventKind, listener: F) -> ListenerId
    where
        F: FnMut(&TextureEvent<T>) + 'static,
    {
        self.notifier.emitter.add_listener(kind, listener)
    }

    /// Register `listener` for every event
    pub fn add_listener_all<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&TextureEvent<T>) + 'static,
    {
        self.notifier.emitter.add_listener_all(listener)
    }

    /// Unregister a listener, returning false if it was not registered
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.notifier.emitter.remove_listener(id)
    }

    /// Current position within the frame protocol
    pub fn frame_state(&self) -> FrameState {
        self.frame
    }

    /// Open a frame
    ///
    /// Legal while idle or directly inside another opened frame.
    ///
    /// # Errors
    /// Returns [`CacheError::ProtocolViolation`] in any other state.
    pub fn start_frame(&mut self) -> CacheResult<()> {
        if !matches!(self.frame, FrameState::Idle | FrameState::Start) {
            return Err(self.out_of_order("start_frame"));
        }
        self.frame_depth += 1;
        self.frame = FrameState::Start;
        Ok(())
    }

    /// Mark `tile` as visible in the open frame
    ///
    /// Marking is idempotent. A marked tile holding both an asset and a
    /// texture has its texture refreshed.
    ///
    /// # Errors
    /// Returns [`CacheError::ProtocolViolation`] unless a frame is open and
    /// no inner frame has closed yet.
    pub fn mark_tile(&mut self, tile: &T) -> CacheResult<()> {
        if !matches!(self.frame, FrameState::Start | FrameState::Mark) {
            return Err(self.out_of_order("mark_tile"));
        }
        self.frame = FrameState::Mark;

        if let Some(item) = self.item_map.get_mut(tile) {
            item.refresh(tile);
        }
        if !self.new_visible.contains(tile) {
            self.new_visible.insert(tile.clone());
        }
        Ok(())
    }

    /// Close a frame, reconciling visibility when the outermost one closes
    ///
    /// # Errors
    /// Returns [`CacheError::ProtocolViolation`] if no frame is open.
    pub fn end_frame(&mut self) -> CacheResult<()> {
        if !matches!(
            self.frame,
            FrameState::Start | FrameState::Mark | FrameState::End
        ) {
            return Err(self.out_of_order("end_frame"));
        }
        self.frame = FrameState::End;
        self.frame_depth -= 1;
        if self.frame_depth == 0 {
            self.reconcile()?;
            self.frame = FrameState::Idle;
        }
        Ok(())
    }

    fn out_of_order(&self, operation: &str) -> CacheError {
        CacheError::protocol(format!(
            "{operation} called in {:?} state (frame depth {})",
            self.frame, self.frame_depth
        ))
    }

    fn reconcile(&mut self) -> CacheResult<()> {
        let no_longer_visible: Vec<T> = self
            .visible
            .iter()
            .filter(|tile| !self.new_visible.contains(tile))
            .cloned()
            .collect();

        // Promote before evicting so a returning tile is not dropped
        let mut promoted = 0;
        for tile in self.new_visible.iter() {
            if self.previously_visible.remove(tile).is_some() {
                promoted += 1;
            }
        }

        let mut evicted = Vec::new();
        for tile in &no_longer_visible {
            let has_texture = self
                .item_map
                .get(tile)
                .is_some_and(|item| item.texture().is_some());
            if has_texture {
                if let Some(displaced) = self.previously_visible.insert(tile.clone()) {
                    evicted.push(displaced);
                }
            } else if !self.pin_map.contains_key(tile) {
                self.unload_tile(tile)?;
            }
        }

        if !evicted.is_empty() {
            debug!(
                "{} tile(s) pushed out of the previously-visible pool",
                evicted.len()
            );
        }
        for tile in &evicted {
            self.notifier.stats.evictions += 1;
            if !self.pin_map.contains_key(tile) {
                self.unload_tile(tile)?;
            }
        }

        let to_load: Vec<T> = self
            .new_visible
            .iter()
            .filter(|tile| !self.item_map.contains_key(tile))
            .cloned()
            .collect();
        for tile in &to_load {
            self.load_tile(tile)?;
        }

        std::mem::swap(&mut self.visible, &mut self.new_visible);
        self.new_visible.clear();

        trace!(
            "frame reconciled: {} visible, {} no longer visible, {} promoted, {} evicted, {} new loads",
            self.visible.len(),
            no_longer_visible.len(),
            promoted,
            evicted.len(),
            to_load.len()
        );
        Ok(())
    }

    fn load_tile(&mut self, tile: &T) -> CacheResult<()> {
        if self.item_map.contains_key(tile) {
            return Err(CacheError::protocol("cannot load a tile that is already cached"));
        }
        self.next_id += 1;
        let item = TileItem::start(
            self.next_id,
            tile,
            &self.source,
            self.retry,
            &mut self.notifier,
        );
        self.item_map.insert(tile.clone(), item);
        Ok(())
    }

    fn unload_tile(&mut self, tile: &T) -> CacheResult<()> {
        let item = self
            .item_map
            .remove(tile)
            .ok_or_else(|| CacheError::protocol("cannot unload a tile that is not cached"))?;
        item.destroy(tile, &mut self.notifier);
        Ok(())
    }

    /// Pin `tile`, loading it if it has no entry
    ///
    /// Returns the new pin count.
    pub fn pin(&mut self, tile: &T) -> CacheResult<usize> {
        if !self.item_map.contains_key(tile) {
            self.load_tile(tile)?;
        }
        let count = match self.pin_map.get_mut(tile) {
            Some(count) => {
                *count += 1;
                *count
            }
            None => {
                self.pin_map.insert(tile.clone(), 1);
                1
            }
        };
        Ok(count)
    }

    /// Release one pin on `tile`
    ///
    /// When the last pin is released and the tile is neither visible nor
    /// previously visible, it is unloaded. Returns the remaining pin count.
    ///
    /// # Errors
    /// Returns [`CacheError::ProtocolViolation`] if `tile` is not pinned.
    pub fn unpin(&mut self, tile: &T) -> CacheResult<usize> {
        let count = self
            .pin_map
            .get_mut(tile)
            .ok_or_else(|| CacheError::protocol("cannot unpin a tile that is not pinned"))?;
        *count -= 1;
        let remaining = *count;

        if remaining == 0 {
            self.pin_map.remove(tile);
            if !self.visible.contains(tile) && !self.previously_visible.contains(tile) {
                self.unload_tile(tile)?;
            }
        }
        Ok(remaining)
    }

    /// What the store knows about `tile`
    pub fn query(&self, tile: &T) -> TileState {
        let item = self.item_map.get(tile);
        let pin_count = self.pin_map.get(tile).copied().unwrap_or(0);
        TileState {
            visible: self.visible.contains(tile),
            previously_visible: self.previously_visible.contains(tile),
            has_asset: item.is_some_and(|item| item.asset().is_some()),
            has_texture: item.is_some_and(|item| item.texture().is_some()),
            pinned: pin_count > 0,
            pin_count,
        }
    }

    /// The asset currently retained for `tile`
    pub fn asset(&self, tile: &T) -> Option<&S::Asset> {
        self.item_map.get(tile)?.asset()
    }

    /// The texture for `tile`, once loaded
    pub fn texture(&self, tile: &T) -> Option<&B::Texture> {
        self.item_map.get(tile)?.texture()
    }

    /// Returns true if a load for `tile` is in flight
    pub fn is_loading(&self, tile: &T) -> bool {
        self.item_map.get(tile).is_some_and(|item| item.is_loading())
    }

    /// Number of cached entries, loading or loaded
    pub fn len(&self) -> usize {
        self.item_map.len()
    }

    /// Returns true if no entry is cached
    pub fn is_empty(&self) -> bool {
        self.item_map.is_empty()
    }

    /// Tiles visible as of the last completed frame, in unspecified order
    pub fn visible_tiles(&self) -> impl Iterator<Item = &T> {
        self.visible.iter()
    }

    /// Tiles in the previously-visible pool, oldest first
    pub fn previously_visible_tiles(&self) -> impl Iterator<Item = &T> {
        self.previously_visible.iter()
    }

    /// Pinned tiles with their pin counts, in unspecified order
    pub fn pinned_tiles(&self) -> impl Iterator<Item = (&T, usize)> {
        self.pin_map.iter().map(|(tile, count)| (tile, *count))
    }

    /// Unload every entry, pinned ones included, and forget all tracking
    ///
    /// Tiles marked in a frame that is still open stay marked.
    pub fn clear(&mut self) {
        let entries = self.item_map.drain();
        debug!("clearing texture store ({} entries)", entries.len());
        for (tile, item) in entries {
            item.destroy(&tile, &mut self.notifier);
        }
        self.visible.clear();
        self.previously_visible.clear();
        self.pin_map.clear();
    }

    /// Unload every unpinned entry and reset visibility tracking
    ///
    /// Pinned entries and their pin counts are left untouched.
    pub fn clear_not_pinned(&mut self) {
        let pin_map = &self.pin_map;
        let entries = self
            .item_map
            .remove_where(|tile, _| !pin_map.contains_key(tile));
        debug!("clearing {} unpinned texture store entries", entries.len());
        for (tile, item) in entries {
            item.destroy(&tile, &mut self.notifier);
        }
        self.visible.clear();
        self.previously_visible.clear();
    }

    /// Drive every in-flight load
    ///
    /// Returns `Ready` once no load is in flight. Loaded entries with dynamic
    /// assets forward their pending changes as invalidations.
    pub fn poll_loads(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        let mut pending = false;
        for (tile, item) in self.item_map.iter_mut() {
            let progress = item.poll(cx, tile, &self.source, &self.backend, &mut self.notifier);
            pending |= progress.is_pending();
        }
        if pending {
            Poll::Pending
        } else {
            Poll::Ready(())
        }
    }

    /// Poll every in-flight load once without waiting
    ///
    /// Intended to be called once per rendered frame. Returns the number of
    /// loads still in flight.
    pub fn process_loads(&mut self) -> usize {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let _ = self.poll_loads(&mut cx);
        self.item_map
            .values()
            .filter(|item| item.is_loading())
            .count()
    }

    /// Future resolving once every in-flight load has settled
    pub fn wait_for_loads(&mut self) -> impl Future<Output = ()> + '_ {
        future::poll_fn(move |cx| self.poll_loads(cx))
    }

    /// Activity counters and current occupancy
    pub fn stats(&self) -> TextureStoreStats {
        TextureStoreStats {
            cached_tiles: self.item_map.len(),
            visible_tiles: self.visible.len(),
            previously_visible_tiles: self.previously_visible.len(),
            pinned_tiles: self.pin_map.len(),
            loading_tiles: self
                .item_map
                .values()
                .filter(|item| item.is_loading())
                .count(),
            ..self.notifier.stats
        }
    }

    /// Tear the store down
    ///
    /// Unloads every entry, notifying listeners, then drops the listeners.
    pub fn destroy(mut self) {
        self.clear();
        self.notifier.emitter.clear();
    }
}

impl<T, S, B> Drop for TextureStore<T, S, B>
where
    S: TileSource<T>,
    B: RenderBackend<T, S::Asset>,
{
    fn drop(&mut self) {
        for (_, mut item) in self.item_map.drain() {
            item.release::<T>();
        }
    }
}

impl<T, S, B> std::fmt::Debug for TextureStore<T, S, B>
where
    S: TileSource<T>,
    B: RenderBackend<T, S::Asset>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureStore")
            .field("entries", &self.item_map.len())
            .field("visible", &self.visible.len())
            .field("previously_visible", &self.previously_visible.len())
            .field("pinned", &self.pin_map.len())
            .field("frame", &self.frame)
            .field("frame_depth", &self.frame_depth)
            .finish()
    }
}
