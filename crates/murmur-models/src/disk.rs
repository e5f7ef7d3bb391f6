//! Disk space queries for the install volume

use std::path::{Path, PathBuf};

use sysinfo::Disks;
use walkdir::WalkDir;

use crate::error::ModelError;

/// Free bytes on the volume hosting `path`.
///
/// `path` does not need to exist yet; its nearest existing ancestor decides
/// the volume. An inaccessible path or an unknown volume is an error, never 0.
pub fn free_space(path: &Path) -> Result<u64, ModelError> {
    let target = nearest_existing(path).ok_or_else(|| ModelError::DiskSpace {
        path: path.to_path_buf(),
        message: "no existing ancestor".to_string(),
    })?;
    let target = std::fs::canonicalize(&target).map_err(|e| ModelError::DiskSpace {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|disk| target.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space())
        .ok_or_else(|| ModelError::DiskSpace {
            path: path.to_path_buf(),
            message: "no mounted volume contains this path".to_string(),
        })
}

/// Total size of regular files below `dir`; 0 if it does not exist
pub fn directory_size(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.len())
        .sum()
}

fn nearest_existing(path: &Path) -> Option<PathBuf> {
    let mut candidate = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };

    while !candidate.exists() {
        if !candidate.pop() {
            return None;
        }
    }
    Some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_size() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("speech/a")).unwrap();
        std::fs::write(dir.path().join("speech/a/model.bin"), vec![0u8; 1000]).unwrap();
        std::fs::write(dir.path().join("registry.json"), b"{}").unwrap();

        assert_eq!(directory_size(dir.path()), 1002);
        assert_eq!(directory_size(&dir.path().join("missing")), 0);
    }

    #[test]
    fn test_nearest_existing_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        let deep = dir.path().join("a/b/c");
        assert_eq!(nearest_existing(&deep), Some(dir.path().to_path_buf()));
    }

    #[cfg(unix)]
    #[test]
    fn test_free_space_for_missing_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        match free_space(&dir.path().join("not/yet/created")) {
            Ok(_) => {}
            // Minimal containers may expose no mount table at all
            Err(ModelError::DiskSpace { .. }) => {}
            Err(other) => panic!("unexpected error {:?}", other),
        }
    }
}
