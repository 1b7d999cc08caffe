//! Application services: the render pipeline and oEmbed resolution.

pub mod error;
pub mod oembed;
pub mod render;
