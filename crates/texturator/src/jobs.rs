//! Planned work items. A job is either a single op or a spec/diff pair
//! (two sources fused into up to two outputs); the pair is a tagged variant
//! rather than cross-references between op records.

use {
    crate::{args::Args, gltf_cache::ImageId, passes::PassMask},
    std::path::PathBuf,
};

/// A planned per-image transformation. `image_id` points at the source
/// registry entry the executor reads pixels from; for the constant side of a
/// spec/diff pair it is repointed at the partner's source.
#[derive(Debug, Clone)]
pub struct Op {
    pub image_id: ImageId,
    pub args: Args,
    pub dst_path: PathBuf,
    pub pass_mask: PassMask,
    pub resize_width: u32,
    pub resize_height: u32,
    /// First reference to this destination name; only new ops write output.
    pub is_new: bool,
    /// No passes apply and the payload type is unchanged; copy bytes as-is.
    pub direct_copy: bool,
    /// Direct copy actually needs a copy (the source is not already at the
    /// destination path).
    pub need_copy: bool,
    /// Source absent; the executor synthesizes a white image of the partner
    /// side's dimensions.
    pub is_constant: bool,
}

impl Op {
    pub fn new(image_id: ImageId, args: Args) -> Self {
        Self {
            image_id,
            args,
            dst_path: PathBuf::new(),
            pass_mask: PassMask::EMPTY,
            resize_width: 0,
            resize_height: 0,
            is_new: false,
            direct_copy: false,
            need_copy: false,
            is_constant: false,
        }
    }

    /// Whether execution will touch the destination path.
    pub fn writes_output(&self) -> bool {
        !self.direct_copy || self.need_copy
    }
}

#[derive(Debug, Clone)]
pub enum Job {
    Add(Op),
    AddSpecToMetal { spec: Op, diff: Op },
}

impl Job {
    pub fn ops(&self) -> impl Iterator<Item = &Op> {
        match self {
            Self::Add(op) => std::slice::from_ref(op).iter().chain(&[]),
            Self::AddSpecToMetal { spec, diff } => std::slice::from_ref(spec).iter().chain(std::slice::from_ref(diff)),
        }
    }

    pub fn ops_mut(&mut self) -> impl Iterator<Item = &mut Op> {
        match self {
            Self::Add(op) => std::slice::from_mut(op).iter_mut().chain(&mut []),
            Self::AddSpecToMetal { spec, diff } => std::slice::from_mut(spec).iter_mut().chain(std::slice::from_mut(diff)),
        }
    }
}
