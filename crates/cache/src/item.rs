//! Per-tile load pipeline
//!
//! A [`TileItem`] fetches the asset for one tile, builds a texture from it
//! and keeps whatever it has produced so far. It moves from `Loading` to
//! exactly one of `Loaded`, `Cancelled` or `Errored`, and reports the move
//! through an [`EventSink`]. Progress is made only when the owner polls it.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::LocalBoxStream;
use futures::{ready, Future, StreamExt};
use log::{debug, warn};
use panoview_scheduler::{Cancellable, CancellationToken, LoadError, LoadFuture, RetryPolicy};

use crate::events::{EventSink, TextureEvent};
use crate::source::{Asset, RenderBackend, Texture, TileSource};

/// Where an item's load pipeline stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// Fetching the asset or building the texture
    Loading,
    /// The texture is available
    Loaded,
    /// The load was cancelled before it resolved
    Cancelled,
    /// The load failed
    Errored,
}

enum Stage<A, X> {
    FetchingAsset(Cancellable<LoadFuture<A>>),
    CreatingTexture(Cancellable<LoadFuture<X>>),
    Settled,
}

enum Step<A, X> {
    Asset(Result<A, LoadError>),
    Texture(Result<X, LoadError>),
    Settled,
}

/// Cache entry for one tile
///
/// Holds the asset and texture produced so far. While loading, the item
/// owns the in-flight operations and the token that cancels them; once it
/// settles, neither is held any more.
pub struct TileItem<A, X> {
    id: u64,
    stage: Stage<A, X>,
    status: LoadStatus,
    asset: Option<A>,
    texture: Option<X>,
    changes: Option<LocalBoxStream<'static, ()>>,
    token: CancellationToken,
    retry: RetryPolicy,
    attempts: u32,
}

impl<A: Asset, X> TileItem<A, X> {
    /// Start loading `tile`, emitting a start-load notification
    pub(crate) fn start<T, S>(
        id: u64,
        tile: &T,
        source: &S,
        retry: RetryPolicy,
        events: &mut dyn EventSink<T>,
    ) -> Self
    where
        T: Clone,
        S: TileSource<T, Asset = A>,
    {
        events.notify(TextureEvent::StartLoad(tile.clone()));
        debug!("tile texture #{id}: start load");

        let token = CancellationToken::new();
        let fetch = Cancellable::new(source.load_asset(tile, &token), token.clone());
        Self {
            id,
            stage: Stage::FetchingAsset(fetch),
            status: LoadStatus::Loading,
            asset: None,
            texture: None,
            changes: None,
            token,
            retry,
            attempts: 1,
        }
    }

    /// Diagnostic id, unique within the owning store
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current pipeline status
    pub fn status(&self) -> LoadStatus {
        self.status
    }

    /// Returns true while a load is in flight
    pub fn is_loading(&self) -> bool {
        self.status == LoadStatus::Loading
    }

    /// Number of asset fetches issued so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The asset, while it is retained
    ///
    /// Static assets are released as soon as their texture exists; dynamic
    /// assets are retained for as long as the item lives.
    pub fn asset(&self) -> Option<&A> {
        self.asset.as_ref()
    }

    /// The texture, once loaded
    pub fn texture(&self) -> Option<&X> {
        self.texture.as_ref()
    }

    /// Drive the pipeline forward
    ///
    /// Returns `Ready` once the item has settled. A loaded item with a
    /// dynamic asset forwards pending asset changes as invalidations on
    /// every poll.
    pub(crate) fn poll<T, S, B>(
        &mut self,
        cx: &mut Context<'_>,
        tile: &T,
        source: &S,
        backend: &B,
        events: &mut dyn EventSink<T>,
    ) -> Poll<()>
    where
        T: Clone,
        S: TileSource<T, Asset = A>,
        B: RenderBackend<T, A, Texture = X>,
        X: Texture<T, A>,
    {
        loop {
            let step = match &mut self.stage {
                Stage::FetchingAsset(fetch) => Step::Asset(ready!(Pin::new(fetch).poll(cx))),
                Stage::CreatingTexture(create) => {
                    Step::Texture(ready!(Pin::new(create).poll(cx)))
                }
                Stage::Settled => Step::Settled,
            };

            match step {
                Step::Asset(Ok(asset)) => {
                    let create = backend.create_texture(tile, &asset, &self.token);
                    self.asset = Some(asset);
                    self.stage =
                        Stage::CreatingTexture(Cancellable::new(create, self.token.clone()));
                }
                Step::Asset(Err(err)) if self.retry.should_retry(self.attempts, &err) => {
                    self.attempts += 1;
                    debug!(
                        "tile texture #{}: retrying asset fetch (attempt {}): {err}",
                        self.id, self.attempts
                    );
                    let fetch = source.load_asset(tile, &self.token);
                    self.stage = Stage::FetchingAsset(Cancellable::new(fetch, self.token.clone()));
                }
                Step::Asset(Err(err)) | Step::Texture(Err(err)) => {
                    self.fail(tile, err, events);
                    return Poll::Ready(());
                }
                Step::Texture(Ok(texture)) => {
                    self.finish(tile, texture, events);
                }
                Step::Settled => {
                    self.poll_changes(cx, tile, events);
                    return Poll::Ready(());
                }
            }
        }
    }

    /// Re-upload the texture from the retained asset, if both exist
    pub(crate) fn refresh<T>(&mut self, tile: &T)
    where
        X: Texture<T, A>,
    {
        if let (Some(asset), Some(texture)) = (self.asset.as_ref(), self.texture.as_mut()) {
            texture.refresh(tile, asset);
        }
    }

    /// Tear the item down, notifying how it ended
    ///
    /// A loading item is cancelled and reports a cancellation. A settled item
    /// releases its asset and texture and reports an unload.
    pub(crate) fn destroy<T>(mut self, tile: &T, events: &mut dyn EventSink<T>)
    where
        T: Clone,
        X: Texture<T, A>,
    {
        if self.is_loading() {
            self.token.cancel();
            self.fail(tile, LoadError::Cancelled, events);
            return;
        }
        self.release::<T>();
        debug!("tile texture #{}: unloaded", self.id);
        events.notify(TextureEvent::Unload(tile.clone()));
    }

    /// Tear the item down without notifying anyone
    pub(crate) fn release<T>(&mut self)
    where
        X: Texture<T, A>,
    {
        self.token.cancel();
        self.stage = Stage::Settled;
        self.changes = None;
        if let Some(asset) = self.asset.take() {
            asset.destroy();
        }
        if let Some(texture) = self.texture.take() {
            texture.destroy();
        }
    }

    fn finish<T>(&mut self, tile: &T, texture: X, events: &mut dyn EventSink<T>)
    where
        T: Clone,
    {
        self.texture = Some(texture);
        self.stage = Stage::Settled;
        self.status = LoadStatus::Loaded;

        let dynamic = self.asset.as_ref().is_some_and(|asset| asset.is_dynamic());
        if dynamic {
            self.changes = self.asset.as_ref().and_then(|asset| asset.changes());
        } else if let Some(asset) = self.asset.take() {
            asset.destroy();
        }

        debug!("tile texture #{}: loaded", self.id);
        events.notify(TextureEvent::Load(tile.clone()));
    }

    fn fail<T>(&mut self, tile: &T, err: LoadError, events: &mut dyn EventSink<T>)
    where
        T: Clone,
        X: Texture<T, A>,
    {
        self.release::<T>();
        if err.is_cancelled() {
            self.status = LoadStatus::Cancelled;
            debug!("tile texture #{}: load cancelled", self.id);
            events.notify(TextureEvent::Cancel(tile.clone()));
        } else {
            self.status = LoadStatus::Errored;
            warn!(
                "tile texture #{}: load failed after {} attempt(s): {err}",
                self.id, self.attempts
            );
            events.notify(TextureEvent::Error {
                tile: tile.clone(),
                error: err,
            });
        }
    }

    fn poll_changes<T>(&mut self, cx: &mut Context<'_>, tile: &T, events: &mut dyn EventSink<T>)
    where
        T: Clone,
    {
        let Some(changes) = self.changes.as_mut() else {
            return;
        };
        loop {
            match changes.poll_next_unpin(cx) {
                Poll::Ready(Some(())) => events.notify(TextureEvent::Invalid(tile.clone())),
                Poll::Ready(None) => {
                    self.changes = None;
                    return;
                }
                Poll::Pending => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Emitter, TextureEventKind};
    use futures::channel::{mpsc, oneshot};
    use futures::future::{self, FutureExt};
    use futures::task::noop_waker;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Default)]
    struct Log {
        destroyed_assets: Vec<u32>,
        destroyed_textures: Vec<u32>,
        refreshed: Vec<u32>,
    }

    struct MockAsset {
        id: u32,
        changes: Option<RefCell<Option<mpsc::UnboundedReceiver<()>>>>,
        log: Rc<RefCell<Log>>,
    }

    impl Asset for MockAsset {
        fn is_dynamic(&self) -> bool {
            self.changes.is_some()
        }

        fn changes(&self) -> Option<LocalBoxStream<'static, ()>> {
            let rx = self.changes.as_ref()?.borrow_mut().take()?;
            Some(rx.boxed_local())
        }

        fn destroy(self) {
            self.log.borrow_mut().destroyed_assets.push(self.id);
        }
    }

    struct MockTexture {
        id: u32,
        log: Rc<RefCell<Log>>,
    }

    impl Texture<u32, MockAsset> for MockTexture {
        fn refresh(&mut self, _tile: &u32, asset: &MockAsset) {
            self.log.borrow_mut().refreshed.push(asset.id);
        }

        fn destroy(self) {
            self.log.borrow_mut().destroyed_textures.push(self.id);
        }
    }

    /// Source replaying scripted results, one per fetch
    struct ScriptedSource {
        results: RefCell<VecDeque<LoadFuture<MockAsset>>>,
        fetches: RefCell<u32>,
    }

    impl ScriptedSource {
        fn new(results: Vec<LoadFuture<MockAsset>>) -> Self {
            Self {
                results: RefCell::new(results.into()),
                fetches: RefCell::new(0),
            }
        }
    }

    impl TileSource<u32> for ScriptedSource {
        type Asset = MockAsset;

        fn load_asset(&self, _tile: &u32, _cancel: &CancellationToken) -> LoadFuture<MockAsset> {
            *self.fetches.borrow_mut() += 1;
            self.results
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| future::pending().boxed_local())
        }
    }

    struct ReadyBackend {
        log: Rc<RefCell<Log>>,
        fail: bool,
    }

    impl RenderBackend<u32, MockAsset> for ReadyBackend {
        type Texture = MockTexture;

        fn create_texture(
            &self,
            _tile: &u32,
            asset: &MockAsset,
            _cancel: &CancellationToken,
        ) -> LoadFuture<MockTexture> {
            if self.fail {
                return future::ready(Err(LoadError::Texture("no memory".into()))).boxed_local();
            }
            let texture = MockTexture {
                id: asset.id,
                log: self.log.clone(),
            };
            future::ready(Ok(texture)).boxed_local()
        }
    }

    fn recorder() -> (Emitter<u32>, Rc<RefCell<Vec<TextureEvent<u32>>>>) {
        let mut emitter: Emitter<u32> = Emitter::new();
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        emitter.add_listener_all(move |e| sink.borrow_mut().push(e.clone()));
        (emitter, events)
    }

    fn kinds(events: &Rc<RefCell<Vec<TextureEvent<u32>>>>) -> Vec<TextureEventKind> {
        events.borrow().iter().map(|e| e.kind()).collect()
    }

    fn static_asset(id: u32, log: &Rc<RefCell<Log>>) -> LoadFuture<MockAsset> {
        let asset = MockAsset {
            id,
            changes: None,
            log: log.clone(),
        };
        future::ready(Ok(asset)).boxed_local()
    }

    type Item = TileItem<MockAsset, MockTexture>;

    const TILE: u32 = 7;

    fn drive(
        item: &mut Item,
        source: &ScriptedSource,
        backend: &ReadyBackend,
        events: &mut Emitter<u32>,
    ) -> Poll<()> {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        item.poll(&mut cx, &TILE, source, backend, events)
    }

    #[test]
    fn test_static_asset_released_after_texture_created() {
        let log = Rc::new(RefCell::new(Log::default()));
        let source = ScriptedSource::new(vec![static_asset(1, &log)]);
        let backend = ReadyBackend { log: log.clone(), fail: false };
        let (mut emitter, events) = recorder();

        let mut item = Item::start(1, &TILE, &source, RetryPolicy::never(), &mut emitter);
        assert!(item.is_loading());
        assert_eq!(kinds(&events), vec![TextureEventKind::StartLoad]);

        assert!(drive(&mut item, &source, &backend, &mut emitter).is_ready());
        assert_eq!(item.status(), LoadStatus::Loaded);
        assert!(item.texture().is_some());
        assert!(item.asset().is_none());
        assert_eq!(log.borrow().destroyed_assets, vec![1]);
        assert_eq!(
            kinds(&events),
            vec![TextureEventKind::StartLoad, TextureEventKind::Load]
        );

        item.destroy(&TILE, &mut emitter);
        assert_eq!(log.borrow().destroyed_textures, vec![1]);
        assert_eq!(events.borrow().last(), Some(&TextureEvent::Unload(7)));
    }

    #[test]
    fn test_cancel_while_fetching() {
        let log = Rc::new(RefCell::new(Log::default()));
        let (_tx, rx) = oneshot::channel::<MockAsset>();
        let pending = rx.map(|r| r.map_err(|_| LoadError::Cancelled)).boxed_local();
        let source = ScriptedSource::new(vec![pending]);
        let backend = ReadyBackend { log: log.clone(), fail: false };
        let (mut emitter, events) = recorder();

        let mut item = Item::start(1, &TILE, &source, RetryPolicy::never(), &mut emitter);
        assert!(drive(&mut item, &source, &backend, &mut emitter).is_pending());

        item.destroy(&TILE, &mut emitter);
        assert_eq!(
            kinds(&events),
            vec![TextureEventKind::StartLoad, TextureEventKind::Cancel]
        );
        assert!(log.borrow().destroyed_assets.is_empty());
    }

    #[test]
    fn test_cancel_while_creating_texture_destroys_partial_asset() {
        let log = Rc::new(RefCell::new(Log::default()));
        let source = ScriptedSource::new(vec![static_asset(4, &log)]);
        let (mut emitter, events) = recorder();

        struct StalledBackend;
        impl RenderBackend<u32, MockAsset> for StalledBackend {
            type Texture = MockTexture;
            fn create_texture(
                &self,
                _tile: &u32,
                _asset: &MockAsset,
                _cancel: &CancellationToken,
            ) -> LoadFuture<MockTexture> {
                future::pending().boxed_local()
            }
        }

        let mut item = Item::start(1, &TILE, &source, RetryPolicy::never(), &mut emitter);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        assert!(item
            .poll(&mut cx, &TILE, &source, &StalledBackend, &mut emitter)
            .is_pending());
        assert!(item.asset().is_some());
        assert!(item.is_loading());

        item.destroy(&TILE, &mut emitter);
        assert_eq!(log.borrow().destroyed_assets, vec![4]);
        assert_eq!(events.borrow().last(), Some(&TextureEvent::Cancel(7)));
    }

    #[test]
    fn test_retries_network_errors() {
        let log = Rc::new(RefCell::new(Log::default()));
        let source = ScriptedSource::new(vec![
            future::ready(Err(LoadError::Network("reset".into()))).boxed_local(),
            future::ready(Err(LoadError::Network("reset".into()))).boxed_local(),
            static_asset(2, &log),
        ]);
        let backend = ReadyBackend { log: log.clone(), fail: false };
        let (mut emitter, events) = recorder();

        let mut item = Item::start(1, &TILE, &source, RetryPolicy::new(3), &mut emitter);
        assert!(drive(&mut item, &source, &backend, &mut emitter).is_ready());

        assert_eq!(item.status(), LoadStatus::Loaded);
        assert_eq!(item.attempts(), 3);
        assert_eq!(*source.fetches.borrow(), 3);
        assert_eq!(
            kinds(&events),
            vec![TextureEventKind::StartLoad, TextureEventKind::Load]
        );
    }

    #[test]
    fn test_error_after_attempts_exhausted() {
        let log = Rc::new(RefCell::new(Log::default()));
        let source = ScriptedSource::new(vec![
            future::ready(Err(LoadError::Network("down".into()))).boxed_local(),
            future::ready(Err(LoadError::Network("still down".into()))).boxed_local(),
        ]);
        let backend = ReadyBackend { log, fail: false };
        let (mut emitter, events) = recorder();

        let mut item = Item::start(1, &TILE, &source, RetryPolicy::new(2), &mut emitter);
        assert!(drive(&mut item, &source, &backend, &mut emitter).is_ready());

        assert_eq!(item.status(), LoadStatus::Errored);
        assert_eq!(
            events.borrow().last(),
            Some(&TextureEvent::Error {
                tile: 7,
                error: LoadError::Network("still down".into())
            })
        );

        // A failed item still unloads exactly once
        item.destroy(&TILE, &mut emitter);
        assert_eq!(events.borrow().last(), Some(&TextureEvent::Unload(7)));
    }

    #[test]
    fn test_texture_failure_destroys_asset() {
        let log = Rc::new(RefCell::new(Log::default()));
        let source = ScriptedSource::new(vec![static_asset(3, &log)]);
        let backend = ReadyBackend { log: log.clone(), fail: true };
        let (mut emitter, events) = recorder();

        let mut item = Item::start(1, &TILE, &source, RetryPolicy::new(5), &mut emitter);
        assert!(drive(&mut item, &source, &backend, &mut emitter).is_ready());

        assert_eq!(item.status(), LoadStatus::Errored);
        assert!(item.asset().is_none());
        assert_eq!(log.borrow().destroyed_assets, vec![3]);
        assert_eq!(*source.fetches.borrow(), 1);
        assert_eq!(kinds(&events).last(), Some(&TextureEventKind::Error));
    }

    #[test]
    fn test_dynamic_asset_forwards_changes() {
        let log = Rc::new(RefCell::new(Log::default()));
        let (tx, rx) = mpsc::unbounded();
        let asset = MockAsset {
            id: 9,
            changes: Some(RefCell::new(Some(rx))),
            log: log.clone(),
        };
        let source = ScriptedSource::new(vec![future::ready(Ok(asset)).boxed_local()]);
        let backend = ReadyBackend { log: log.clone(), fail: false };
        let (mut emitter, events) = recorder();

        let mut item = Item::start(1, &TILE, &source, RetryPolicy::never(), &mut emitter);
        assert!(drive(&mut item, &source, &backend, &mut emitter).is_ready());
        assert!(item.asset().is_some());

        tx.unbounded_send(()).unwrap();
        tx.unbounded_send(()).unwrap();
        assert!(drive(&mut item, &source, &backend, &mut emitter).is_ready());
        let invalidations = kinds(&events)
            .into_iter()
            .filter(|k| *k == TextureEventKind::Invalid)
            .count();
        assert_eq!(invalidations, 2);

        item.refresh(&TILE);
        assert_eq!(log.borrow().refreshed, vec![9]);

        item.destroy(&TILE, &mut emitter);
        assert_eq!(log.borrow().destroyed_assets, vec![9]);
        assert_eq!(log.borrow().destroyed_textures, vec![9]);
        // Unsubscribed: the sender sees a closed channel
        assert!(tx.unbounded_send(()).is_err());
    }

    #[test]
    fn test_refresh_skipped_for_static_asset() {
        let log = Rc::new(RefCell::new(Log::default()));
        let source = ScriptedSource::new(vec![static_asset(1, &log)]);
        let backend = ReadyBackend { log: log.clone(), fail: false };
        let (mut emitter, _events) = recorder();

        let mut item = Item::start(1, &TILE, &source, RetryPolicy::never(), &mut emitter);
        let _ = drive(&mut item, &source, &backend, &mut emitter);
        item.refresh(&TILE);
        assert!(log.borrow().refreshed.is_empty());
    }
}
