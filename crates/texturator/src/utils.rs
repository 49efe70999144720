use {
    anyhow::{Context, Result},
    std::path::{Path, PathBuf},
};

/// Create the directory chain for `path`'s parent, returning the directories
/// that did not exist before (deepest last) so the host can clean them up.
pub(crate) fn create_dir_for_file(path: &Path) -> Result<Vec<PathBuf>> {
    let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) else {
        return Ok(Vec::new());
    };
    let mut created = Vec::new();
    let mut missing = parent;
    while !missing.exists() {
        created.push(missing.to_owned());
        match missing.parent() {
            Some(next) if !next.as_os_str().is_empty() => missing = next,
            _ => break,
        }
    }
    created.reverse();
    std::fs::create_dir_all(parent)
        .with_context(|| format!("creating directory for [{}]", parent.display()))
        .map(|_| created)
}

#[extension_traits::extension(pub(crate) trait PathIdentityExt)]
impl<T: AsRef<Path>> T {
    /// Path equality through canonicalization, falling back to literal
    /// comparison for paths that do not (yet) exist.
    fn is_same_file_as(&self, other: &Path) -> bool {
        match (self.as_ref().canonicalize(), other.canonicalize()) {
            (Ok(a), Ok(b)) => a == b,
            _ => self.as_ref() == other,
        }
    }
}
