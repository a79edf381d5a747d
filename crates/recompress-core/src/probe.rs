//! Stateless filesystem probes: eligibility, size, identity and free space.

use std::ffi::OsString;
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::WORKING_SUFFIX;

/// Whether `path` names the temporary copy of some other file.
pub fn has_working_suffix(path: &Path) -> bool {
    path.as_os_str()
        .as_encoded_bytes()
        .ends_with(WORKING_SUFFIX.as_bytes())
}

/// Sibling path used to stage the rewritten copy of `path`.
pub fn working_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(WORKING_SUFFIX);
    PathBuf::from(name)
}

/// Byte length of a regular file. Symlinks, non-regular entries and paths that
/// cannot be stat'ed (including ones that vanished) report 0.
pub fn size_of(path: &Path) -> u64 {
    match fs::symlink_metadata(path) {
        Ok(md) if md.file_type().is_file() => md.len(),
        Ok(_) => 0,
        Err(err) => {
            log::debug!("stat {} failed: {}", path.display(), err);
            0
        }
    }
}

/// A regular, non-symlink file with content that is not itself a working copy.
pub fn is_eligible(path: &Path) -> bool {
    eligible_size(path).is_some()
}

/// Size of `path` if it is eligible, from a single stat.
pub fn eligible_size(path: &Path) -> Option<u64> {
    if has_working_suffix(path) {
        return None;
    }
    Some(size_of(path)).filter(|size| *size > 0)
}

/// Snapshot of the storage object behind a path at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileIdentity {
    pub dev: u64,
    pub ino: u64,
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl FileIdentity {
    pub fn from_metadata(md: &Metadata) -> Self {
        #[cfg(unix)]
        let (dev, ino) = {
            use std::os::unix::fs::MetadataExt;
            (md.dev(), md.ino())
        };
        #[cfg(not(unix))]
        let (dev, ino) = (0, 0);

        Self {
            dev,
            ino,
            len: md.len(),
            modified: md.modified().ok(),
        }
    }

    /// Same device and inode, regardless of content or timestamps.
    pub fn same_object(&self, other: &FileIdentity) -> bool {
        self.dev == other.dev && self.ino == other.ino
    }
}

/// Identity of the entry at `path` itself, without following symlinks.
pub fn identity_of(path: &Path) -> io::Result<FileIdentity> {
    fs::symlink_metadata(path).map(|md| FileIdentity::from_metadata(&md))
}

/// Bytes available to unprivileged writers on the filesystem holding `path`.
#[cfg(unix)]
#[allow(clippy::unnecessary_cast)]
pub fn free_space(path: &Path) -> io::Result<u64> {
    use std::ffi::CString;

    let c_path = CString::new(path.as_os_str().as_encoded_bytes())
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
    let mut stats: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stats) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok((stats.f_bavail as u64).saturating_mul(stats.f_frsize as u64))
}

/// Bytes available on the disk whose mount point is the longest prefix of `path`.
#[cfg(not(unix))]
pub fn free_space(path: &Path) -> io::Result<u64> {
    use sysinfo::Disks;

    let canonical = fs::canonicalize(path)?;
    let disks = Disks::new_with_refreshed_list();

    let mut best_match = None;
    let mut best_len = 0usize;
    for disk in disks.iter() {
        let mount = disk.mount_point();
        if canonical.starts_with(mount) {
            let depth = mount.components().count();
            if depth >= best_len {
                best_len = depth;
                best_match = Some(disk.available_space());
            }
        }
    }

    best_match.ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no filesystem information available for {}", path.display()),
        )
    })
}
