//! GPU-resident textures
//!
//! [`TextureRegistry`] owns the images, [`UploadScheduler`] moves staged pixels
//! onto the GPU and runs the deletion sweep.

pub mod format;
pub mod registry;
pub mod upload;

pub use format::{PixelFormat, PixelView};
pub use registry::{TextureFlags, TextureHandle, TextureRegistry, TextureResource};
pub use upload::UploadScheduler;
