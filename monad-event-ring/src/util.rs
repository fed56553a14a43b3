// Copyright (C) 2025 Category Labs, Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Utility functions that are useful in most event ring programs.

use std::{ffi::CString, io, os::unix::ffi::OsStrExt, path::Path};

use crate::error::{bail, EventRingError};

// linux/magic.h; not exported by the libc crate.
const HUGETLBFS_MAGIC: i64 = 0x958458f6;

/// Returns whether `path` lives on a hugetlbfs mount, in which case its
/// mappings should be created with `MAP_HUGETLB`.
pub fn path_supports_hugetlb(path: impl AsRef<Path>) -> Result<bool, EventRingError> {
    let path = path.as_ref();
    let c_path = match CString::new(path.as_os_str().as_bytes()) {
        Ok(p) => p,
        Err(_) => {
            return bail(EventRingError::BadFile {
                name: path.display().to_string(),
                reason: "path contains an embedded nul".to_owned(),
            })
        }
    };
    let mut fs_stat = std::mem::MaybeUninit::<libc::statfs>::uninit();
    if unsafe { libc::statfs(c_path.as_ptr(), fs_stat.as_mut_ptr()) } == -1 {
        return bail(EventRingError::Io {
            name: path.display().to_string(),
            op: "statfs(2)",
            source: io::Error::last_os_error(),
        });
    }
    let fs_stat = unsafe { fs_stat.assume_init() };
    Ok(fs_stat.f_type as i64 == HUGETLBFS_MAGIC)
}

/// Find the pids of all processes that have opened the file behind `fd` with
/// write access. This is a slow and somewhat brittle operation (it scans the
/// file descriptor tables of all accessible processes in proc(5)), and is
/// typically used to create a [`ProcessExitMonitor`] for each discovered
/// process. For event rings, the intention is to detect when the writing
/// process has died.
pub fn find_fd_writer_pids(fd: libc::c_int) -> Result<Vec<libc::pid_t>, EventRingError> {
    let mut target = std::mem::MaybeUninit::<libc::stat>::uninit();
    if unsafe { libc::fstat(fd, target.as_mut_ptr()) } == -1 {
        return bail(EventRingError::Io {
            name: format!("fd {fd}"),
            op: "fstat(2)",
            source: io::Error::last_os_error(),
        });
    }
    let target = unsafe { target.assume_init() };

    let mut pids = Vec::new();
    let proc_entries = match std::fs::read_dir("/proc") {
        Ok(entries) => entries,
        Err(source) => {
            return bail(EventRingError::Io {
                name: "/proc".to_owned(),
                op: "readdir(3)",
                source,
            })
        }
    };
    for proc_entry in proc_entries.flatten() {
        let Ok(pid) = proc_entry.file_name().to_string_lossy().parse::<libc::pid_t>() else {
            continue;
        };
        let fd_dir = proc_entry.path().join("fd");
        // Descriptor tables of inaccessible processes are silently skipped.
        let Ok(fd_entries) = std::fs::read_dir(&fd_dir) else {
            continue;
        };
        for fd_entry in fd_entries.flatten() {
            let Ok(meta) = std::fs::metadata(fd_entry.path()) else {
                continue;
            };
            use std::os::unix::fs::MetadataExt;
            if meta.dev() != target.st_dev || meta.ino() != target.st_ino {
                continue;
            }
            if fd_opened_for_writing(pid, &fd_entry.file_name().to_string_lossy()) {
                pids.push(pid);
                break;
            }
        }
    }
    pids.sort_unstable();
    pids.dedup();
    Ok(pids)
}

/// Parses the open flags out of /proc/<pid>/fdinfo/<fd>.
fn fd_opened_for_writing(pid: libc::pid_t, fd_name: &str) -> bool {
    let Ok(fdinfo) = std::fs::read_to_string(format!("/proc/{pid}/fdinfo/{fd_name}")) else {
        return false;
    };
    for line in fdinfo.lines() {
        if let Some(flags) = line.strip_prefix("flags:") {
            let Ok(flags) = libc::c_int::from_str_radix(flags.trim(), 8) else {
                return false;
            };
            let accmode = flags & libc::O_ACCMODE;
            return accmode == libc::O_WRONLY || accmode == libc::O_RDWR;
        }
    }
    false
}

/// A utility that uses the Linux pidfd facility (see pidfd_open(2)) to
/// monitor when a process exits.
#[derive(Debug)]
pub struct ProcessExitMonitor {
    /// The process being monitored.
    pub pid: libc::pid_t,
    pidfd: libc::c_int,
}

impl ProcessExitMonitor {
    /// Opens a pidfd for `pid`.
    pub fn new(pid: libc::pid_t) -> Result<ProcessExitMonitor, EventRingError> {
        let pidfd = unsafe { libc::syscall(libc::SYS_pidfd_open, pid, 0) as libc::c_int };
        if pidfd == -1 {
            return bail(EventRingError::Io {
                name: format!("pid {pid}"),
                op: "pidfd_open(2)",
                source: io::Error::last_os_error(),
            });
        }
        Ok(ProcessExitMonitor { pid, pidfd })
    }

    /// Polls the pidfd without blocking; true once the process has exited.
    pub fn has_exited(&self) -> bool {
        let mut pfd = libc::pollfd {
            fd: self.pidfd,
            events: libc::POLLIN,
            revents: 0,
        };
        let r = unsafe { libc::poll(&mut pfd, 1, 0) };
        r == -1 || (pfd.revents & libc::POLLIN) == libc::POLLIN
    }
}

impl Drop for ProcessExitMonitor {
    fn drop(&mut self) {
        unsafe { libc::close(self.pidfd) };
    }
}

/// Locates the single process holding the ring file behind `fd` open for
/// writing and returns a monitor for it; fails when there are zero or
/// multiple writers, both of which indicate a misconfigured deployment of a
/// single-producer ring.
pub fn monitor_single_event_ring_file_writer(
    fd: libc::c_int,
    error_name: &str,
) -> Result<ProcessExitMonitor, EventRingError> {
    let writer_pids = find_fd_writer_pids(fd)?;
    let writer_pid = match writer_pids.len() {
        0 => {
            return bail(EventRingError::BadFile {
                name: error_name.to_owned(),
                reason: "could not find any process opening the ring for writing".to_owned(),
            })
        }
        1 => writer_pids[0],
        _ => {
            tracing::warn!(
                name = %error_name,
                pids = ?writer_pids,
                "multiple processes write to single-producer event ring"
            );
            return bail(EventRingError::BadFile {
                name: error_name.to_owned(),
                reason: format!("found multiple processes opening the ring for writing: {writer_pids:?}"),
            });
        }
    };
    ProcessExitMonitor::new(writer_pid)
}
