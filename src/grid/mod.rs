//! Interpolation-grid artifacts and the merge/results engine.

pub mod engine;
pub mod results;

pub use engine::GridEngine;
pub use results::{extract_scale_envelope, ConvolutionResult, NINE_POINTS};

use std::path::{Path, PathBuf};

use crate::error::GridError;

/// Maximum LZ4 high-compression level.
const MAX_COMPRESSION: u32 = 12;

/// An on-disk interpolation-grid artifact with its metadata annex.
///
/// Owned by the grid engine while being merged and annotated, handed to the
/// postprocess stage for compression.
#[derive(Debug, Clone)]
pub struct Grid {
    pub name: String,
    pub path: PathBuf,
}

impl Grid {
    /// The grid artifact `<name>.pineappl` inside `dest`.
    pub fn new(name: impl Into<String>, dest: &Path) -> Self {
        let name = name.into();
        let path = dest.join(format!("{name}.pineappl"));
        Self { name, path }
    }

    /// Temporary sibling used for atomic rewrite swaps.
    pub fn tmp_path(&self) -> PathBuf {
        self.path.with_file_name(format!("{}.pineappl.tmp", self.name))
    }

    /// Final compressed artifact path.
    pub fn compressed_path(&self) -> PathBuf {
        self.path.with_file_name(format!("{}.pineappl.lz4", self.name))
    }

    /// Promotes the temporary sibling to the grid path.
    pub fn promote_tmp(&self) -> Result<(), GridError> {
        std::fs::rename(self.tmp_path(), &self.path)?;
        Ok(())
    }
}

/// Compresses the grid at maximum level into its `.lz4` sibling and removes
/// the uncompressed original.
pub fn compress(grid: &Grid) -> Result<PathBuf, GridError> {
    let compressed = grid.compressed_path();

    let mut reader = std::fs::File::open(&grid.path)?;
    let writer = std::fs::File::create(&compressed)?;
    let mut encoder = lz4::EncoderBuilder::new()
        .level(MAX_COMPRESSION)
        .build(writer)?;
    std::io::copy(&mut reader, &mut encoder)?;
    let (_, result) = encoder.finish();
    result?;

    std::fs::remove_file(&grid.path)?;
    Ok(compressed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_paths() {
        let grid = Grid::new("LHCB_Z", Path::new("/data/LHCB_Z-20260823"));
        assert_eq!(
            grid.path,
            PathBuf::from("/data/LHCB_Z-20260823/LHCB_Z.pineappl")
        );
        assert_eq!(
            grid.tmp_path(),
            PathBuf::from("/data/LHCB_Z-20260823/LHCB_Z.pineappl.tmp")
        );
        assert_eq!(
            grid.compressed_path(),
            PathBuf::from("/data/LHCB_Z-20260823/LHCB_Z.pineappl.lz4")
        );
    }

    #[test]
    fn test_compress_replaces_original() {
        let dir = tempfile::tempdir().unwrap();
        let grid = Grid::new("SET", dir.path());
        std::fs::write(&grid.path, b"binary grid payload").unwrap();

        let compressed = compress(&grid).unwrap();
        assert!(compressed.exists());
        assert!(!grid.path.exists());
        assert!(std::fs::metadata(&compressed).unwrap().len() > 0);
    }
}
