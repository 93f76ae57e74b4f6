//! Transport-neutral service core.
//!
//! Adapters build an [`ImageRequest`], call [`ImageHandler::handle`] and
//! translate the returned [`ImageResponse`] into their native reply.

mod image_service;
mod neutral;

pub use image_service::{ImageService, PLACEHOLDER_CACHE_CONTROL, PLACEHOLDER_DISPOSITION};
pub use neutral::{ImageHandler, ImageRequest, ImageResponse, Referer};
