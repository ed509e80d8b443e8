// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use bytesize::ByteSize;
use camino::Utf8Path;
use walkdir::WalkDir;

/// Returns the total size of the files under `path`, in bytes.
pub(crate) fn dir_size(path: &Utf8Path) -> Result<u64, walkdir::Error> {
    let mut size = 0;
    for entry in WalkDir::new(path) {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            size += entry.metadata()?.len();
        }
    }
    Ok(size)
}

/// Formats the growth from `before` to `after` in decimal SI units, for example `1.5 kB`.
pub(crate) fn display_growth(before: u64, after: u64) -> String {
    ByteSize(after.saturating_sub(before)).display().si().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use pretty_assertions::assert_eq;

    #[test]
    fn dir_size_counts_nested_files() {
        let dir = Utf8TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.json"), [0u8; 100]).unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/b.json"), [0u8; 23]).unwrap();

        assert_eq!(dir_size(dir.path()).unwrap(), 123);
        assert!(dir_size(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn growth() {
        assert_eq!(display_growth(0, 999), "999 B");
        assert_eq!(display_growth(500, 2_000), "1.5 kB");
        assert_eq!(display_growth(2_000, 500), "0 B");
    }
}
