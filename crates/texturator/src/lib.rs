//! Content-addressed, deduplicating texture conversion pipeline for
//! glTF → USD model conversion.
//!
//! The pipeline runs in two phases. During *planning* the material builder
//! calls [`Texturator::add`] / [`Texturator::add_spec_to_metal`] for each
//! textured material input and immediately receives a stable output filename
//! derived from source identity and processing parameters; each novel name
//! enqueues a job. During *execution* ([`Texturator::end`]) a global scale is
//! chosen to fit the decompressed-size budget, output directories are
//! prepared, and jobs run sequentially, each producing one or two files.
//!
//! Missing sources never fail planning: the returned name falls back to a
//! generated constant-color texture selected by [`args::Fallback`].

pub mod args;
mod budget;
mod destinations;
mod executor;
pub mod gltf_cache;
pub mod jobs;
pub mod passes;
pub mod pipeline;
pub mod settings;
mod sources;
mod utils;

pub use {
    args::{AlphaMode, Args, Fallback, Usage},
    gltf_cache::{DirImageCache, GltfImageCache, ImageId, MemImageCache, MimeType, SourceOrigin},
    pipeline::Texturator,
    settings::{ConvertSettings, ImageResizeSettings},
};
