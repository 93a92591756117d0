//! In-memory implementations of the raster, vector, driver and warp engine abstractions.

mod memdataset;
mod memdriver;
mod memquery;
mod memvector;
mod nearestneighbour;

pub use memdataset::{MemBand, MemDataset};
pub use memdriver::{MemDriver, MemRegistry};
pub use memvector::{MemLayer, MemVectorSource};
pub use nearestneighbour::NearestNeighbourEngine;
