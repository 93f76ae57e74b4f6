//! Request parsing and transform orchestration.
//!
//! - [`request`]: turns a route path into typed [`TransformParams`]
//! - [`geometry`]: crop rectangle, scale factor and quality window rules
//! - [`pipeline`]: runs load, crop, scale and re-encode on source bytes

pub mod geometry;
pub mod pipeline;
pub mod request;

pub use geometry::{resolve_crop, resolve_scale, CropRect, QualityWindow};
pub use pipeline::{run_transform, OutputStrategy, TransformOutput};
pub use request::{TransformParams, TransformRequest, PATH_ELEMENTS, UNSPECIFIED};
