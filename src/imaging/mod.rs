//! Image decoding, resampling and size-constrained JPEG encoding.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::load_from_memory` |
//! | **Decode AVIF** | `avif-parse` (container) + `rav1d` (AV1) |
//! | **Rasterize → JPEG** | bilinear `resize_exact` + `JpegEncoder` |
//! | **Fit to budget** | [`fit_to_budget`] loop over quality, then size |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension and quality math (unit testable)
//! - **Parameters**: Data structures describing one encode pass
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: The fitting loop combining calculations + backend

pub mod avif;
pub mod backend;
pub mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use operations::{FitConfig, TARGET_MAX_BLOB_BYTES, fit_to_budget};
pub use params::{EncodeParams, Quality};
pub use rust_backend::RustBackend;
