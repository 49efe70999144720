//! The ordered pass set. Bit order is the canonical execution order: passes
//! always run lowest bit first.

use {itertools::Itertools, std::ops::BitOr};

#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct PassMask(u32);

impl PassMask {
    pub const EMPTY: Self = Self(0);
    pub const REMOVE_ALPHA: Self = Self(1 << 0);
    pub const ADD_ALPHA: Self = Self(1 << 1);
    pub const COLOR_SPACE: Self = Self(1 << 2);
    pub const NORMALIZE_NORMALS: Self = Self(1 << 3);
    pub const ALPHA_CUTOFF: Self = Self(1 << 4);
    pub const SCALE_BIAS: Self = Self(1 << 5);
    pub const SPEC_TO_METAL: Self = Self(1 << 6);
    pub const RESIZE: Self = Self(1 << 7);

    /// Passes that run in the linear float domain.
    pub const FLOAT: Self = Self(Self::COLOR_SPACE.0 | Self::SCALE_BIAS.0 | Self::SPEC_TO_METAL.0 | Self::RESIZE.0);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for PassMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::fmt::Debug for PassMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        static NAMES: [(PassMask, &str); 8] = [
            (PassMask::REMOVE_ALPHA, "remove_alpha"),
            (PassMask::ADD_ALPHA, "add_alpha"),
            (PassMask::COLOR_SPACE, "color_space"),
            (PassMask::NORMALIZE_NORMALS, "normalize_normals"),
            (PassMask::ALPHA_CUTOFF, "alpha_cutoff"),
            (PassMask::SCALE_BIAS, "scale_bias"),
            (PassMask::SPEC_TO_METAL, "spec_to_metal"),
            (PassMask::RESIZE, "resize"),
        ];
        if self.is_empty() {
            return write!(f, "(none)");
        }
        write!(
            f,
            "{}",
            NAMES
                .iter()
                .filter(|(mask, _)| self.contains(*mask))
                .map(|(_, name)| name)
                .join("|")
        )
    }
}
