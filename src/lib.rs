//! Raster warping toolkit: re-exports the [`geowarp`] library.

#[doc(inline)]
pub use geowarp::*;
