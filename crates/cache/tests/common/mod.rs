//! Scripted collaborators for texture store tests

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use futures::channel::{mpsc, oneshot};
use futures::future::{self, FutureExt};
use futures::stream::{LocalBoxStream, StreamExt};
use panoview_cache::{
    Asset, CancellationToken, LoadError, LoadFuture, RenderBackend, Texture, TextureEvent,
    TextureEventKind, TextureStore, TextureStoreConfig, TileSource,
};

pub type Tile = u32;
pub type Store = TextureStore<Tile, TestSource, TestBackend>;

#[derive(Default)]
pub struct HarnessState {
    /// Hold asset loads until `resolve` is called
    pub manual: bool,
    pub pending: HashMap<Tile, oneshot::Sender<Result<TestAsset, LoadError>>>,
    /// Tiles whose asset load fails with a non-retryable error
    pub failing: HashSet<Tile>,
    /// Tiles failing with a network error this many more times
    pub flaky: HashMap<Tile, u32>,
    /// Tiles whose assets change over time
    pub dynamic: HashSet<Tile>,
    pub change_senders: HashMap<Tile, mpsc::UnboundedSender<()>>,

    pub fetches: Vec<Tile>,
    pub destroyed_assets: Vec<Tile>,
    pub destroyed_textures: Vec<Tile>,
    pub refreshed: Vec<Tile>,
}

#[derive(Clone, Default)]
pub struct Harness {
    pub state: Rc<RefCell<HarnessState>>,
}

impl Harness {
    pub fn manual() -> Self {
        let harness = Self::default();
        harness.state.borrow_mut().manual = true;
        harness
    }

    pub fn store(&self, config: TextureStoreConfig) -> Store {
        TextureStore::new(TestSource(self.clone()), TestBackend(self.clone()), config)
            .expect("valid config")
    }

    fn asset(&self, tile: Tile) -> TestAsset {
        let changes = if self.state.borrow().dynamic.contains(&tile) {
            let (tx, rx) = mpsc::unbounded();
            self.state.borrow_mut().change_senders.insert(tile, tx);
            Some(RefCell::new(Some(rx)))
        } else {
            None
        };
        TestAsset {
            tile,
            changes,
            harness: self.clone(),
        }
    }

    /// Complete the held asset load of `tile`; false if none is held
    pub fn resolve(&self, tile: Tile) -> bool {
        let sender = self.state.borrow_mut().pending.remove(&tile);
        match sender {
            Some(tx) => tx.send(Ok(self.asset(tile))).is_ok(),
            None => false,
        }
    }

    /// Signal a change of the dynamic asset of `tile`
    pub fn change(&self, tile: Tile) -> bool {
        self.state
            .borrow()
            .change_senders
            .get(&tile)
            .is_some_and(|tx| tx.unbounded_send(()).is_ok())
    }

    pub fn fetch_count(&self, tile: Tile) -> usize {
        self.state
            .borrow()
            .fetches
            .iter()
            .filter(|t| **t == tile)
            .count()
    }
}

pub struct TestAsset {
    pub tile: Tile,
    changes: Option<RefCell<Option<mpsc::UnboundedReceiver<()>>>>,
    harness: Harness,
}

impl Asset for TestAsset {
    fn is_dynamic(&self) -> bool {
        self.changes.is_some()
    }

    fn changes(&self) -> Option<LocalBoxStream<'static, ()>> {
        let rx = self.changes.as_ref()?.borrow_mut().take()?;
        Some(rx.boxed_local())
    }

    fn destroy(self) {
        self.harness
            .state
            .borrow_mut()
            .destroyed_assets
            .push(self.tile);
    }
}

pub struct TestTexture {
    pub tile: Tile,
    harness: Harness,
}

impl Texture<Tile, TestAsset> for TestTexture {
    fn refresh(&mut self, tile: &Tile, _asset: &TestAsset) {
        self.harness.state.borrow_mut().refreshed.push(*tile);
    }

    fn destroy(self) {
        self.harness
            .state
            .borrow_mut()
            .destroyed_textures
            .push(self.tile);
    }
}

pub struct TestSource(pub Harness);

impl TileSource<Tile> for TestSource {
    type Asset = TestAsset;

    fn load_asset(&self, tile: &Tile, _cancel: &CancellationToken) -> LoadFuture<TestAsset> {
        let tile = *tile;
        let harness = &self.0;
        let mut state = harness.state.borrow_mut();
        state.fetches.push(tile);

        if state.failing.contains(&tile) {
            return future::ready(Err(LoadError::Asset(format!("tile {tile} is corrupt"))))
                .boxed_local();
        }
        if let Some(remaining) = state.flaky.get_mut(&tile) {
            if *remaining > 0 {
                *remaining -= 1;
                return future::ready(Err(LoadError::Network("connection reset".into())))
                    .boxed_local();
            }
        }
        if state.manual {
            let (tx, rx) = oneshot::channel();
            state.pending.insert(tile, tx);
            return rx
                .map(|result| result.unwrap_or(Err(LoadError::Cancelled)))
                .boxed_local();
        }

        drop(state);
        future::ready(Ok(harness.asset(tile))).boxed_local()
    }
}

pub struct TestBackend(pub Harness);

impl RenderBackend<Tile, TestAsset> for TestBackend {
    type Texture = TestTexture;

    fn create_texture(
        &self,
        tile: &Tile,
        _asset: &TestAsset,
        _cancel: &CancellationToken,
    ) -> LoadFuture<TestTexture> {
        let texture = TestTexture {
            tile: *tile,
            harness: self.0.clone(),
        };
        future::ready(Ok(texture)).boxed_local()
    }
}

pub type EventLog = Rc<RefCell<Vec<TextureEvent<Tile>>>>;

pub fn record(store: &mut Store) -> EventLog {
    let log: EventLog = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    store.add_listener_all(move |event| sink.borrow_mut().push(event.clone()));
    log
}

pub fn count(log: &EventLog, kind: TextureEventKind, tile: Tile) -> usize {
    log.borrow()
        .iter()
        .filter(|e| e.kind() == kind && *e.tile() == tile)
        .count()
}

/// Run one complete frame marking `tiles`
pub fn frame(store: &mut Store, tiles: &[Tile]) {
    store.start_frame().unwrap();
    for tile in tiles {
        store.mark_tile(tile).unwrap();
    }
    store.end_frame().unwrap();
}
