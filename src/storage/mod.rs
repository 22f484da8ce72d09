//! Profile and series storage behind injectable traits.
//!
//! The pipeline holds `Arc<dyn ProfileStore>` and `Arc<dyn SeriesSource>`;
//! there is no process-wide profile state.

pub mod persistence;
mod sled_profiles;

pub use persistence::{
    InMemoryProfileStore, InMemorySeriesSource, ProfileStore, SeriesSource, SourceError,
    StoreError,
};
pub use sled_profiles::SledProfileStore;
