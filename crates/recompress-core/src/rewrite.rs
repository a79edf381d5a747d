//! Copy, verify and atomically replace a single file in place.
//!
//! The file is streamed into a freshly created sibling working copy carrying
//! the same owner, group, extended attributes, permission bits and timestamps. The source is then re-checked; if its
//! identity, length or mtime moved while the copy was running the working copy
//! is discarded. Otherwise it is renamed over the original, which readers
//! observe as an atomic swap. The working copy is removed on every exit path.

use std::fs::{self, File, Metadata, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

use filetime::FileTime;

use crate::buffer::BufferSizer;
use crate::errors::RewriteError;
use crate::probe::{self, FileIdentity};

/// Result of a rewrite attempt that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// The file was replaced by a byte-identical copy.
    Rewritten { bytes: u64 },
    /// The path was no longer eligible; nothing was touched.
    Skipped,
}

/// Environment seams for the rewrite protocol.
pub trait RewriteHooks: Send + Sync {
    /// Free space available for staging a working copy next to `path`.
    fn available_space(&self, path: &Path) -> io::Result<u64> {
        probe::free_space(path)
    }

    /// Called after the working copy is complete and before the source is re-checked.
    fn copy_finished(&self, _src: &Path, _working: &Path) {}
}

/// Hooks backed by the real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHooks;

impl RewriteHooks for SystemHooks {}

/// Rewrite `path` using the real filesystem probes.
pub fn rewrite_in_place(path: &Path) -> Result<RewriteOutcome, RewriteError> {
    rewrite_with(path, &BufferSizer::default(), &SystemHooks)
}

pub fn rewrite_with(
    path: &Path,
    sizer: &BufferSizer,
    hooks: &dyn RewriteHooks,
) -> Result<RewriteOutcome, RewriteError> {
    if probe::has_working_suffix(path) {
        return Ok(RewriteOutcome::Skipped);
    }
    let size = probe::size_of(path);
    if size == 0 {
        return Ok(RewriteOutcome::Skipped);
    }

    let available = hooks
        .available_space(path)
        .map_err(|err| RewriteError::io("query free space", path, err))?;
    if size > available {
        return Err(RewriteError::InsufficientSpace {
            path: path.to_path_buf(),
            needed: size,
            available,
        });
    }

    let snapshot = match probe::identity_of(path) {
        Ok(id) => id,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(RewriteOutcome::Skipped),
        Err(err) => return Err(RewriteError::io("stat", path, err)),
    };

    let (reader, source_md) = open_source(path, &snapshot)?;
    let working = probe::working_path(path);
    let writer = create_working_copy(path, &working)?;
    let _cleanup = WorkingCopy { path: &working };

    let bytes = fill_working_copy(path, reader, &source_md, writer, sizer)?;
    hooks.copy_finished(path, &working);

    let current = match probe::identity_of(path) {
        Ok(id) => id,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(RewriteError::ChangedDuringCopy {
                path: path.to_path_buf(),
            })
        }
        Err(err) => return Err(RewriteError::io("stat", path, err)),
    };
    if !unchanged(&snapshot, &current) {
        return Err(RewriteError::ChangedDuringCopy {
            path: path.to_path_buf(),
        });
    }

    fs::rename(&working, path).map_err(|err| RewriteError::io("rename", path, err))?;
    Ok(RewriteOutcome::Rewritten { bytes })
}

fn unchanged(before: &FileIdentity, after: &FileIdentity) -> bool {
    before.same_object(after) && before.modified == after.modified && before.len == after.len
}

/// Removes the working copy when dropped. A missing file is not an error.
struct WorkingCopy<'a> {
    path: &'a Path,
}

impl Drop for WorkingCopy<'_> {
    fn drop(&mut self) {
        match fs::remove_file(self.path) {
            Ok(()) => log::debug!("discarded working copy {}", self.path.display()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => log::debug!("remove {} failed: {}", self.path.display(), err),
        }
    }
}

/// Open the source and make sure the handle refers to the snapshotted object.
fn open_source(src: &Path, snapshot: &FileIdentity) -> Result<(File, Metadata), RewriteError> {
    let reader = File::open(src).map_err(|err| RewriteError::io("open", src, err))?;
    let md = reader
        .metadata()
        .map_err(|err| RewriteError::io("stat", src, err))?;
    if !FileIdentity::from_metadata(&md).same_object(snapshot) {
        return Err(RewriteError::ChangedDuringCopy {
            path: src.to_path_buf(),
        });
    }
    Ok((reader, md))
}

/// Create the working copy. An existing file at that path is never opened.
fn create_working_copy(src: &Path, working: &Path) -> Result<File, RewriteError> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(working)
        .map_err(|err| match err.kind() {
            io::ErrorKind::AlreadyExists => RewriteError::WorkingPathOccupied {
                path: src.to_path_buf(),
                working: working.to_path_buf(),
            },
            _ => RewriteError::io("create working copy", src, err),
        })
}

/// Stream `reader` into `writer` with an explicit read/write loop, then
/// carry the source metadata over. Consumes the handle so it is closed before
/// the rename.
///
/// `copy_file_range` and reflinks are avoided on purpose: on block-cloning
/// filesystems they would share the old blocks instead of writing new ones.
fn fill_working_copy(
    src: &Path,
    mut reader: File,
    source_md: &Metadata,
    mut writer: File,
    sizer: &BufferSizer,
) -> Result<u64, RewriteError> {
    let mut buf = vec![0u8; sizer.calculate_buffer_size(source_md.len())];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(RewriteError::io("read", src, err)),
        };
        writer
            .write_all(&buf[..n])
            .map_err(|err| RewriteError::io("write working copy", src, err))?;
        total += n as u64;
    }
    writer
        .sync_all()
        .map_err(|err| RewriteError::io("sync working copy", src, err))?;

    apply_metadata(src, source_md, &reader, &writer)?;
    Ok(total)
}

/// Owner and group first: chown may clear set-id bits and file capabilities,
/// which the xattrs and mode restore. Xattrs go on before the mode so a
/// read-only source still accepts them.
fn apply_metadata(
    src: &Path,
    md: &Metadata,
    source: &File,
    dst: &File,
) -> Result<(), RewriteError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        use std::os::unix::io::AsRawFd;

        let rc = unsafe { libc::fchown(dst.as_raw_fd(), md.uid(), md.gid()) };
        if rc != 0 {
            return Err(RewriteError::io(
                "chown working copy",
                src,
                io::Error::last_os_error(),
            ));
        }
        copy_xattrs(src, source, dst)?;
    }
    #[cfg(not(unix))]
    let _ = source;

    dst.set_permissions(md.permissions())
        .map_err(|err| RewriteError::io("chmod working copy", src, err))?;

    let atime = FileTime::from_last_access_time(md);
    let mtime = FileTime::from_last_modification_time(md);
    filetime::set_file_handle_times(dst, Some(atime), Some(mtime))
        .map_err(|err| RewriteError::io("set times on working copy", src, err))?;
    Ok(())
}

/// Copy extended attributes between open handles.
///
/// A filesystem without xattr support has nothing to copy. Attributes this
/// process may not read or write (`security.*`, `trusted.*` as non-root) are
/// left behind, matching what `cp --preserve=xattr` tolerates.
#[cfg(unix)]
fn copy_xattrs(src: &Path, source: &File, dst: &File) -> Result<(), RewriteError> {
    use xattr::FileExt;

    let names = match source.list_xattr() {
        Ok(names) => names,
        Err(err) if xattr_unavailable(&err) => return Ok(()),
        Err(err) => return Err(RewriteError::io("list xattrs", src, err)),
    };
    for name in names {
        let value = match source.get_xattr(&name) {
            Ok(Some(value)) => value,
            Ok(None) => continue,
            Err(err) if xattr_unavailable(&err) => continue,
            Err(err) => return Err(RewriteError::io("read xattr", src, err)),
        };
        match dst.set_xattr(&name, &value) {
            Ok(()) => {}
            Err(err) if xattr_unavailable(&err) => {
                log::debug!(
                    "{}: xattr {} not copied: {}",
                    src.display(),
                    name.to_string_lossy(),
                    err
                );
            }
            Err(err) => return Err(RewriteError::io("write xattr", src, err)),
        }
    }
    Ok(())
}

#[cfg(unix)]
fn xattr_unavailable(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::PermissionDenied
        || matches!(
            err.raw_os_error(),
            Some(code) if code == libc::ENOTSUP || code == libc::EOPNOTSUPP || code == libc::EINVAL
        )
}
