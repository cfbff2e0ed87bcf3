//! Network namespace management
//!
//! Provides:
//! - Creation and deletion of named, persistent namespaces under /run/netns
//! - Handles on namespace files and the calling thread's own namespace
//! - Scoped namespace switching with guaranteed restoration
//!
//! Namespace membership is a per-OS-thread kernel attribute. Every helper
//! here operates on the calling thread, and callers are expected to stay on
//! one thread for the whole sequence; the synchronous channel API in
//! `crate::netlink` upholds that.

use std::fs::{self, File};
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::mount::{self, MntFlags, MsFlags};
use nix::sched::{self, CloneFlags};
use nix::unistd::gettid;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Where named namespaces are bind-mounted, following iproute2 convention
pub const NETNS_DIR: &str = "/run/netns";

fn ns_path(name: &str) -> PathBuf {
    Path::new(NETNS_DIR).join(name)
}

/// Namespace file for the calling OS thread
fn self_ns_path() -> String {
    format!("/proc/self/task/{}/ns/net", gettid())
}

/// Owned handle on a network namespace file.
///
/// The underlying descriptor is released on drop.
#[derive(Debug)]
pub struct NsHandle(File);

impl AsFd for NsHandle {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

impl AsRawFd for NsHandle {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

/// Handle on the namespace currently active for the calling thread.
pub fn current() -> Result<NsHandle> {
    Ok(NsHandle(File::open(self_ns_path())?))
}

/// Handle on a named namespace.
pub fn get(name: &str) -> Result<NsHandle> {
    match File::open(ns_path(name)) {
        Ok(f) => Ok(NsHandle(f)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(Error::NamespaceNotFound(name.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// True if a namespace with this name is registered.
pub fn exists(name: &str) -> bool {
    ns_path(name).exists()
}

/// Create a named, persistent namespace.
///
/// Follows the iproute2 recipe: register a mount point under /run/netns,
/// unshare the calling thread's network namespace, bind-mount the fresh
/// namespace onto the mount point, then switch the thread back to the
/// namespace it started in. The switch-back runs even when the bind mount
/// fails; if the switch-back itself fails the thread is stranded and
/// [`Error::NamespaceContextLost`] is returned.
pub fn add(name: &str) -> Result<NsHandle> {
    if exists(name) {
        return Err(Error::NamespaceExists(name.to_string()));
    }
    fs::create_dir_all(NETNS_DIR)?;
    let mount_point = ns_path(name);
    drop(File::create(&mount_point)?);

    let original = current()?;
    if let Err(e) = sched::unshare(CloneFlags::CLONE_NEWNET) {
        let _ = fs::remove_file(&mount_point);
        return Err(Error::Sys {
            op: "unshare",
            source: e,
        });
    }
    let mounted = mount::mount(
        Some(self_ns_path().as_str()),
        &mount_point,
        None::<&str>,
        MsFlags::MS_BIND,
        None::<&str>,
    );
    // Back to the original namespace no matter how the mount went.
    sched::setns(original.as_fd(), CloneFlags::CLONE_NEWNET)
        .map_err(|source| Error::NamespaceContextLost { source })?;
    if let Err(e) = mounted {
        let _ = fs::remove_file(&mount_point);
        return Err(Error::Sys {
            op: "mount",
            source: e,
        });
    }
    debug!(ns = name, "namespace created");
    get(name)
}

/// Create a named namespace unless it already exists.
pub fn ensure(name: &str) -> Result<NsHandle> {
    match add(name) {
        Ok(h) => Ok(h),
        Err(e) if e.is_already_exists() => {
            debug!(ns = name, "namespace already present");
            get(name)
        }
        Err(e) => Err(e),
    }
}

/// Delete a named namespace. Interfaces inside it fall back to the kernel's
/// cleanup; veth peers living outside survive and must be removed separately.
pub fn delete(name: &str) -> Result<()> {
    let mount_point = ns_path(name);
    if !mount_point.exists() {
        return Err(Error::NamespaceNotFound(name.to_string()));
    }
    // Detach-unmount; EINVAL just means nothing was mounted on the stub.
    if let Err(e) = mount::umount2(&mount_point, MntFlags::MNT_DETACH) {
        if e != Errno::EINVAL && e != Errno::ENOENT {
            return Err(Error::Sys {
                op: "umount",
                source: e,
            });
        }
    }
    fs::remove_file(&mount_point)?;
    debug!(ns = name, "namespace deleted");
    Ok(())
}

/// Switch the calling thread into the given namespace.
pub fn set(handle: &NsHandle) -> Result<()> {
    sched::setns(handle.as_fd(), CloneFlags::CLONE_NEWNET).map_err(|source| Error::Sys {
        op: "setns",
        source,
    })
}

/// Switch the calling thread into the named namespace.
pub fn set_by_name(name: &str) -> Result<()> {
    set(&get(name)?)
}

/// Scoped namespace switch.
///
/// Captures the calling thread's namespace on entry; [`NetnsGuard::exit`]
/// restores it and reports failure as [`Error::NamespaceContextLost`]. If
/// the guard is dropped without an explicit exit, restoration still runs
/// best-effort.
pub struct NetnsGuard {
    original: NsHandle,
    active: bool,
}

impl NetnsGuard {
    /// Capture the current namespace and enter the named one.
    pub fn enter(name: &str) -> Result<Self> {
        let target = get(name)?;
        Self::enter_handle(&target)
    }

    /// Capture the current namespace and enter the one behind `target`.
    pub fn enter_handle(target: &NsHandle) -> Result<Self> {
        let original = current()?;
        set(target)?;
        Ok(Self {
            original,
            active: true,
        })
    }

    /// Restore the namespace captured at entry.
    pub fn exit(mut self) -> Result<()> {
        self.active = false;
        sched::setns(self.original.as_fd(), CloneFlags::CLONE_NEWNET)
            .map_err(|source| Error::NamespaceContextLost { source })
    }
}

impl Drop for NetnsGuard {
    fn drop(&mut self) {
        if self.active {
            if let Err(e) = sched::setns(self.original.as_fd(), CloneFlags::CLONE_NEWNET) {
                warn!(error = %e, "failed to restore network namespace on drop");
            }
        }
    }
}

/// Run a closure inside the named namespace, restoring the caller's
/// namespace on every exit path.
///
/// When both the closure and the restoration fail, the closure's error is
/// returned as the cause and the context loss is logged; a restoration
/// failure alone surfaces as [`Error::NamespaceContextLost`].
pub fn with_netns<T, F>(name: &str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let guard = NetnsGuard::enter(name)?;
    let outcome = f();
    match (outcome, guard.exit()) {
        (Ok(value), Ok(())) => Ok(value),
        (Err(e), Ok(())) => Err(e),
        (Ok(_), Err(lost)) => Err(lost),
        (Err(e), Err(lost)) => {
            warn!(ns = name, error = %lost, "namespace restore failed while handling an earlier error");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ns_paths() {
        assert_eq!(ns_path("ns1"), PathBuf::from("/run/netns/ns1"));
        assert!(self_ns_path().starts_with("/proc/self/task/"));
        assert!(self_ns_path().ends_with("/ns/net"));
    }

    #[test]
    fn test_missing_namespace_is_classified() {
        let err = get("netrig-test-definitely-missing").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_with_netns_missing_namespace_never_runs_closure() {
        let mut ran = false;
        let err = with_netns("netrig-test-definitely-missing", || {
            ran = true;
            Ok(())
        })
        .unwrap_err();
        assert!(err.is_not_found());
        assert!(!ran);
    }

    #[test]
    #[ignore = "requires root and CAP_NET_ADMIN"]
    fn test_add_and_delete_roundtrip() {
        let name = "netrig-test-ns";
        let before = std::fs::read_link(self_ns_path()).unwrap();
        add(name).unwrap();
        assert!(exists(name));
        // creating again must classify as already-exists
        assert!(add(name).unwrap_err().is_already_exists());
        delete(name).unwrap();
        assert!(!exists(name));
        // the caller's namespace is untouched
        let after = std::fs::read_link(self_ns_path()).unwrap();
        assert_eq!(before, after);
    }
}
