//! Collaborators the texture store loads through
//!
//! A [`TileSource`] turns a tile into pixel data (an [`Asset`]), and a
//! [`RenderBackend`] turns an asset into something drawable (a
//! [`Texture`]). Both hand back a [`LoadFuture`] and receive the
//! [`CancellationToken`] of the load so long-running work can stop early.

use futures::stream::LocalBoxStream;
use panoview_scheduler::{CancellationToken, LoadFuture};

/// Decoded pixel data backing a tile
pub trait Asset {
    /// Returns true if the pixel data changes over time (e.g. video)
    fn is_dynamic(&self) -> bool {
        false
    }

    /// Subscribe to change notifications of a dynamic asset
    ///
    /// Each item on the stream signals one change. Dropping the stream
    /// unsubscribes.
    fn changes(&self) -> Option<LocalBoxStream<'static, ()>> {
        None
    }

    /// Release the asset's resources
    fn destroy(self)
    where
        Self: Sized,
    {
    }
}

/// Renderer-native handle built from an asset
pub trait Texture<T, A> {
    /// Re-upload the asset's current pixels
    fn refresh(&mut self, tile: &T, asset: &A);

    /// Release the texture's resources
    fn destroy(self)
    where
        Self: Sized,
    {
    }
}

/// Produces the asset for a tile
pub trait TileSource<T> {
    type Asset: Asset;

    /// Start fetching and decoding the asset for `tile`
    fn load_asset(&self, tile: &T, cancel: &CancellationToken) -> LoadFuture<Self::Asset>;
}

/// Builds textures from assets
pub trait RenderBackend<T, A> {
    type Texture: Texture<T, A>;

    /// Start building the texture for `tile` from `asset`
    fn create_texture(
        &self,
        tile: &T,
        asset: &A,
        cancel: &CancellationToken,
    ) -> LoadFuture<Self::Texture>;
}
