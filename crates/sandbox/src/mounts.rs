// SPDX-License-Identifier: MIT

//! Sandbox filesystem materialization.
//!
//! The mount *plan* is computed as data so ordering and targets are
//! testable anywhere; applying it (tmpfs, bind, readonly remount) is
//! Linux-only and lives behind `apply` / `unwind`.

use std::path::{Path, PathBuf};

use joblet_core::{normalize_within_root, DirUpload, MountSpec, Upload};

use crate::adapter::VolumeMount;

/// Directory inside the sandbox where uploaded files land.
pub const UPLOADS_DIR: &str = "work/uploads";
/// Directory inside the sandbox where uploaded directory trees land.
pub const UPLOAD_DIRS_DIR: &str = "work/uploaddirs";

/// One planned mount operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedMount {
    /// tmpfs at the sandbox root.
    RootTmpfs { target: PathBuf, size_bytes: u64 },
    /// Bind `source` onto `target`, remounting read-only when asked.
    Bind {
        source: PathBuf,
        target: PathBuf,
        readonly: bool,
    },
    /// Sized tmpfs for a memory volume.
    Tmpfs { target: PathBuf, size_bytes: u64 },
}

impl PlannedMount {
    pub fn target(&self) -> &Path {
        match self {
            PlannedMount::RootTmpfs { target, .. }
            | PlannedMount::Bind { target, .. }
            | PlannedMount::Tmpfs { target, .. } => target,
        }
    }
}

/// Default size of the sandbox root tmpfs.
const ROOT_TMPFS_BYTES: u64 = 256 * 1024 * 1024;

/// Compute the ordered mount plan for a runtime-backed sandbox.
///
/// Mount sources are re-normalized here even though the registry already
/// validated them; the plan must not trust that the manifest it is handed
/// was ever registered.
pub fn plan_mounts(
    rootfs: &Path,
    runtime_dir: &Path,
    manifest_mounts: &[MountSpec],
    volumes: &[VolumeMount],
) -> Result<Vec<PlannedMount>, String> {
    let mut plan = vec![PlannedMount::RootTmpfs {
        target: rootfs.to_path_buf(),
        size_bytes: ROOT_TMPFS_BYTES,
    }];

    for mount in manifest_mounts {
        let source_rel = normalize_within_root(&mount.source)
            .ok_or_else(|| format!("mount source escapes runtime root: {}", mount.source))?;
        let target_rel = mount.target.trim_start_matches('/');
        if target_rel.is_empty() {
            return Err(format!("mount target must not be /: {}", mount.target));
        }
        plan.push(PlannedMount::Bind {
            source: runtime_dir.join(source_rel),
            target: rootfs.join(target_rel),
            readonly: mount.readonly,
        });
    }

    for volume in volumes {
        let target_rel = volume.target.trim_start_matches('/');
        let target = rootfs.join(target_rel);
        match &volume.host_dir {
            Some(host_dir) => plan.push(PlannedMount::Bind {
                source: host_dir.clone(),
                target,
                readonly: false,
            }),
            None => plan.push(PlannedMount::Tmpfs {
                target,
                size_bytes: volume.size_bytes,
            }),
        }
    }

    Ok(plan)
}

/// Write uploaded blobs under the work tree. Zero-byte files are fine.
pub fn write_uploads(
    work_root: &Path,
    uploads: &[Upload],
    upload_dirs: &[DirUpload],
) -> std::io::Result<()> {
    let files_dir = work_root.join(UPLOADS_DIR);
    for upload in uploads {
        write_upload(&files_dir, upload)?;
    }
    let dirs_dir = work_root.join(UPLOAD_DIRS_DIR);
    for dir in upload_dirs {
        let base = dirs_dir.join(&dir.name);
        for file in &dir.files {
            write_upload(&base, file)?;
        }
    }
    Ok(())
}

fn write_upload(base: &Path, upload: &Upload) -> std::io::Result<()> {
    let rel = normalize_within_root(&upload.name).ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("upload name escapes upload dir: {}", upload.name),
        )
    })?;
    let path = base.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, &upload.content)?;
    #[cfg(unix)]
    if let Some(mode) = upload.mode {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))?;
    }
    Ok(())
}

/// Apply one planned mount. Linux-only.
#[cfg(target_os = "linux")]
pub fn apply(mount: &PlannedMount) -> Result<(), String> {
    use nix::mount::{mount as sys_mount, MsFlags};

    std::fs::create_dir_all(mount.target())
        .map_err(|e| format!("mkdir {}: {e}", mount.target().display()))?;

    match mount {
        PlannedMount::RootTmpfs { target, size_bytes } => sys_mount(
            Some("tmpfs"),
            target,
            Some("tmpfs"),
            MsFlags::MS_NOSUID | MsFlags::MS_NODEV,
            Some(format!("size={size_bytes},mode=755").as_str()),
        )
        .map_err(|e| format!("mount tmpfs {}: {e}", target.display())),
        PlannedMount::Tmpfs { target, size_bytes } => sys_mount(
            Some("tmpfs"),
            target,
            Some("tmpfs"),
            MsFlags::MS_NOSUID | MsFlags::MS_NODEV,
            Some(format!("size={size_bytes}").as_str()),
        )
        .map_err(|e| format!("mount tmpfs {}: {e}", target.display())),
        PlannedMount::Bind {
            source,
            target,
            readonly,
        } => {
            if source.is_file() {
                // Bind-mounting a file needs an existing file target.
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| format!("mkdir {}: {e}", parent.display()))?;
                }
                let _ = std::fs::remove_dir(target);
                if !target.exists() {
                    std::fs::write(target, b"")
                        .map_err(|e| format!("touch {}: {e}", target.display()))?;
                }
            }
            sys_mount(
                Some(source),
                target,
                None::<&str>,
                MsFlags::MS_BIND | MsFlags::MS_REC,
                None::<&str>,
            )
            .map_err(|e| format!("bind mount {}: {e}", target.display()))?;
            if *readonly {
                sys_mount(
                    None::<&str>,
                    target,
                    None::<&str>,
                    MsFlags::MS_BIND
                        | MsFlags::MS_REMOUNT
                        | MsFlags::MS_RDONLY
                        | MsFlags::MS_REC,
                    None::<&str>,
                )
                .map_err(|e| format!("remount ro {}: {e}", target.display()))?;
            }
            Ok(())
        }
    }
}

/// Unmount a target, detaching lazily so teardown never wedges on a busy
/// mount. Best-effort.
#[cfg(target_os = "linux")]
pub fn unmount(target: &Path) {
    use nix::mount::{umount2, MntFlags};
    if let Err(e) = umount2(target, MntFlags::MNT_DETACH) {
        tracing::debug!(target = %target.display(), error = %e, "umount failed");
    }
}

#[cfg(test)]
#[path = "mounts_tests.rs"]
mod tests;
