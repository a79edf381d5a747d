//! Directory walk feeding the work queue.

use eyre::{bail, Result};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::probe;

/// Walk `root` without following symlinks and hand every eligible file to
/// `visit`. Returns the number of paths visited.
///
/// Each directory is listed completely before any of its entries is yielded
/// (walkdir buffers a directory when a sort order is set). Workers only rename
/// files that have already been yielded, so a listing never observes those
/// renames and no path is produced twice.
pub fn enumerate_eligible<F>(root: &Path, mut visit: F) -> Result<u64>
where
    F: FnMut(PathBuf) -> Result<()>,
{
    if !root.exists() {
        bail!("enumeration root does not exist: {}", root.display());
    }

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    let mut visited = 0u64;
    for next in walker {
        let entry = match next {
            Ok(e) => e,
            Err(err) => {
                if err.depth() == 0 {
                    return Err(err.into());
                }
                log::warn!("skipping unreadable entry: {err}");
                continue;
            }
        };

        if entry.depth() == 0 || entry.file_type().is_dir() {
            continue;
        }

        let path = entry.into_path();
        if !probe::is_eligible(&path) {
            log::debug!("not eligible: {}", path.display());
            continue;
        }

        visit(path)?;
        visited += 1;
    }

    Ok(visited)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn collect(root: &Path) -> Vec<PathBuf> {
        let mut out = Vec::new();
        enumerate_eligible(root, |p| {
            out.push(p);
            Ok(())
        })
        .expect("enumerate");
        out
    }

    #[test]
    fn yields_nested_eligible_files_only() {
        let temp = tempfile::tempdir().expect("tempdir");
        let base = temp.path();
        fs::create_dir_all(base.join("a/b")).expect("mkdir");
        fs::write(base.join("top.txt"), b"1").expect("write");
        fs::write(base.join("a/b/deep.txt"), b"2").expect("write");
        fs::write(base.join("a/empty.txt"), b"").expect("write");
        fs::write(base.join("a/top.txt.zfs-recompress"), b"stale").expect("write");

        let mut found = collect(base);
        found.sort();

        assert_eq!(found, vec![base.join("a/b/deep.txt"), base.join("top.txt")]);
    }

    #[cfg(unix)]
    #[test]
    fn does_not_follow_or_yield_symlinks() {
        use std::os::unix::fs::symlink;

        let temp = tempfile::tempdir().expect("tempdir");
        let outside = tempfile::tempdir().expect("tempdir");
        fs::write(outside.path().join("elsewhere.txt"), b"x").expect("write");
        fs::write(temp.path().join("real.txt"), b"y").expect("write");
        symlink(temp.path().join("real.txt"), temp.path().join("link.txt")).expect("symlink");
        symlink(outside.path(), temp.path().join("linked_dir")).expect("symlink");

        assert_eq!(collect(temp.path()), vec![temp.path().join("real.txt")]);
    }

    #[test]
    fn missing_root_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(enumerate_eligible(&temp.path().join("nope"), |_| Ok(())).is_err());
    }

    #[test]
    fn visitor_error_stops_the_walk() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("a"), b"1").expect("write");
        fs::write(temp.path().join("b"), b"1").expect("write");

        let result = enumerate_eligible(temp.path(), |_| bail!("queue closed"));
        assert!(result.is_err());
    }
}
