//! Filesystem utility functions
//!
//! Recursive copying that never dereferences symlinks, symlink-aware removal,
//! and the stage-then-rename replacement used for snapshots and activation.

use anyhow::{Context, Result, bail};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Recursively calculate the total size of a directory in bytes
///
/// Symbolic links are not followed.
pub fn dir_size(path: &Path) -> io::Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_file() {
            total += entry.metadata()?.len();
        } else if file_type.is_dir() {
            total += dir_size(&entry.path())?;
        }
    }
    Ok(total)
}

/// Recursively copy a directory and all its contents to a new location
///
/// Symlinks are recreated pointing at the same target, never followed. File
/// and directory permission bits are carried over.
///
/// # Errors
/// Fails on the first I/O error; whatever was copied before it stays in place.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    copy_dir_filtered(src, dst, |_| false)
}

/// Like [`copy_dir_recursive`], but entries whose path relative to `src`
/// satisfies `skip` are left out (with everything below them).
pub fn copy_dir_filtered<F>(src: &Path, dst: &Path, skip: F) -> Result<()>
where
    F: Fn(&Path) -> bool,
{
    let root_meta = fs::metadata(src)
        .with_context(|| format!("Source directory does not exist: {}", src.display()))?;
    if !root_meta.is_dir() {
        bail!("Source is not a directory: {}", src.display());
    }

    fs::create_dir_all(dst)
        .with_context(|| format!("Failed to create destination directory: {}", dst.display()))?;

    // Directory modes are applied last so read-only directories can still be filled.
    let mut dir_modes = vec![(dst.to_path_buf(), root_meta.permissions())];

    let walker = WalkDir::new(src)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.path().strip_prefix(src).map_or(true, |rel| !skip(rel)));

    for entry in walker {
        let entry =
            entry.with_context(|| format!("Failed to read source directory: {}", src.display()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .context("Walked outside of the source directory")?;
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            let link = fs::read_link(entry.path())
                .with_context(|| format!("Failed to read symlink: {}", entry.path().display()))?;
            make_symlink(&link, &target)?;
        } else if file_type.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create directory: {}", target.display()))?;
            let perms = entry
                .metadata()
                .with_context(|| format!("Failed to stat {}", entry.path().display()))?
                .permissions();
            dir_modes.push((target, perms));
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target).with_context(|| {
                format!(
                    "Failed to copy file: {} -> {}",
                    entry.path().display(),
                    target.display()
                )
            })?;
        } else {
            // Sockets and FIFOs: copying would fail or block.
            warn!(path = %entry.path().display(), "Skipping special file");
        }
    }

    for (dir, perms) in dir_modes.into_iter().rev() {
        fs::set_permissions(&dir, perms)
            .with_context(|| format!("Failed to set permissions on {}", dir.display()))?;
    }

    Ok(())
}

/// Copy a file or a directory tree, following `src` itself if it is a link.
pub fn copy_path(src: &Path, dst: &Path) -> Result<()> {
    let meta = fs::metadata(src).with_context(|| format!("Failed to stat {}", src.display()))?;
    if meta.is_dir() {
        return copy_dir_recursive(src, dst);
    }

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::copy(src, dst)
        .with_context(|| format!("Failed to copy file: {} -> {}", src.display(), dst.display()))?;
    Ok(())
}

/// True if something (including a dangling symlink) exists at `path`.
pub fn path_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Remove whatever is at `path` without following symlinks.
///
/// A missing path is not an error.
pub fn remove_path(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).with_context(|| format!("Failed to stat {}", path.display())),
    };

    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
    .with_context(|| format!("Failed to remove {}", path.display()))
}

/// Create `link` pointing at `target`. The link's directory must already exist.
pub fn make_symlink(target: &Path, link: &Path) -> Result<()> {
    #[cfg(unix)]
    std::os::unix::fs::symlink(target, link).with_context(|| {
        format!(
            "Failed to create symlink from {} to {}",
            link.display(),
            target.display()
        )
    })?;

    #[cfg(windows)]
    {
        let resolved = link.parent().map_or_else(|| target.to_path_buf(), |p| p.join(target));
        if resolved.is_dir() {
            std::os::windows::fs::symlink_dir(target, link)
        } else {
            std::os::windows::fs::symlink_file(target, link)
        }
        .with_context(|| {
            format!(
                "Failed to create symlink from {} to {}",
                link.display(),
                target.display()
            )
        })?;
    }

    Ok(())
}

/// Resolve a link target read from `link` against the link's own directory.
pub fn resolve_link(link: &Path, target: &Path) -> PathBuf {
    if target.is_absolute() {
        target.to_path_buf()
    } else {
        link.parent()
            .map_or_else(|| target.to_path_buf(), |p| p.join(target))
    }
}

/// Remove a directory tree without following symlinks.
///
/// Directories lacking owner write/search permission are opened up first, so
/// read-only trees carried over by [`copy_dir_recursive`] can be removed.
pub fn remove_tree(path: &Path) -> Result<()> {
    if !path_exists(path) {
        return Ok(());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        // Parents are yielded before their contents are read.
        for entry in WalkDir::new(path).follow_links(false).into_iter().flatten() {
            if !entry.file_type().is_dir() {
                continue;
            }
            if let Ok(meta) = entry.metadata() {
                let mut perms = meta.permissions();
                if perms.mode() & 0o700 != 0o700 {
                    perms.set_mode(perms.mode() | 0o700);
                    let _ = fs::set_permissions(entry.path(), perms);
                }
            }
        }
    }

    remove_path(path)
}

/// Whatever used to live at a replaced directory, parked in a hidden sibling.
///
/// Dropping it deletes the contents (symlinks are removed, never followed).
#[derive(Debug)]
pub struct Displaced {
    holder: PathBuf,
}

impl Displaced {
    pub fn path(&self) -> PathBuf {
        self.holder.join("old")
    }

    /// Move the displaced tree to `dest` instead of deleting it.
    pub fn keep_as(self, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        fs::rename(self.path(), dest)
            .with_context(|| format!("Failed to move displaced data to {}", dest.display()))
    }
}

impl Drop for Displaced {
    fn drop(&mut self) {
        if let Err(e) = remove_tree(&self.holder) {
            warn!(
                path = %self.holder.display(),
                error = %format!("{e:#}"),
                "Failed to remove displaced directory"
            );
        }
    }
}

/// Replace the directory at `target` with a freshly built one.
///
/// `fill` populates a temporary sibling of `target`; only once it succeeds is
/// the old directory renamed aside and the new one renamed into place. If
/// `fill` fails, `target` is untouched. If the final rename fails, the old
/// directory is put back.
pub fn replace_dir<F>(target: &Path, fill: F) -> Result<Option<Displaced>>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let parent = target
        .parent()
        .with_context(|| format!("{} has no parent directory", target.display()))?;
    let name = target
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Invalid directory name: {}", target.display()))?;

    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

    let staging = tempfile::Builder::new()
        .prefix(&format!(".{name}.staging-"))
        .tempdir_in(parent)
        .with_context(|| format!("Failed to create staging directory in {}", parent.display()))?;

    fill(staging.path())?;

    let displaced = if path_exists(target) {
        let holder = tempfile::Builder::new()
            .prefix(&format!(".{name}.old-"))
            .tempdir_in(parent)
            .with_context(|| format!("Failed to create holding directory in {}", parent.display()))?;
        let displaced = Displaced {
            holder: holder.keep(),
        };
        fs::rename(target, displaced.path())
            .with_context(|| format!("Failed to move {} aside", target.display()))?;
        Some(displaced)
    } else {
        None
    };

    if let Err(e) = fs::rename(staging.path(), target) {
        if let Some(old) = &displaced {
            let _ = fs::rename(old.path(), target);
        }
        return Err(e).with_context(|| format!("Failed to move new data into {}", target.display()));
    }

    Ok(displaced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn test_copy_preserves_symlinks() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let outside = temp.path().join("outside");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::create_dir_all(&outside).unwrap();
        fs::write(outside.join("data.txt"), "shared").unwrap();
        fs::write(src.join("nested/file.txt"), "hello").unwrap();
        make_symlink(&outside, &src.join("link")).unwrap();

        let dst = temp.path().join("dst");
        copy_dir_recursive(&src, &dst).unwrap();

        assert_eq!(fs::read_to_string(dst.join("nested/file.txt")).unwrap(), "hello");
        let link_meta = fs::symlink_metadata(dst.join("link")).unwrap();
        assert!(link_meta.file_type().is_symlink());
        assert_eq!(fs::read_link(dst.join("link")).unwrap(), outside);
    }

    #[test]
    fn test_copy_preserves_modes() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("ro")).unwrap();
        fs::write(src.join("ro/script.sh"), "#!/bin/sh").unwrap();
        fs::set_permissions(src.join("ro/script.sh"), fs::Permissions::from_mode(0o755)).unwrap();
        fs::set_permissions(src.join("ro"), fs::Permissions::from_mode(0o555)).unwrap();

        let dst = temp.path().join("dst");
        copy_dir_recursive(&src, &dst).unwrap();

        let file_mode = fs::metadata(dst.join("ro/script.sh")).unwrap().permissions().mode();
        let dir_mode = fs::metadata(dst.join("ro")).unwrap().permissions().mode();
        assert_eq!(file_mode & 0o777, 0o755);
        assert_eq!(dir_mode & 0o777, 0o555);

        // Let TempDir clean up.
        fs::set_permissions(src.join("ro"), fs::Permissions::from_mode(0o755)).unwrap();
        fs::set_permissions(dst.join("ro"), fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_copy_filtered_skips_entries() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join(".profile.json"), "{}").unwrap();
        fs::write(src.join("auth.json"), "{}").unwrap();

        let dst = temp.path().join("dst");
        copy_dir_filtered(&src, &dst, |rel| rel == Path::new(".profile.json")).unwrap();

        assert!(dst.join("auth.json").exists());
        assert!(!dst.join(".profile.json").exists());
    }

    #[test]
    fn test_copy_missing_source() {
        let temp = TempDir::new().unwrap();
        let result = copy_dir_recursive(&temp.path().join("nope"), &temp.path().join("dst"));
        assert!(result.is_err());
    }

    #[test]
    fn test_remove_path_does_not_follow_links() {
        let temp = TempDir::new().unwrap();
        let shared = temp.path().join("shared");
        fs::create_dir_all(&shared).unwrap();
        fs::write(shared.join("keep.txt"), "keep").unwrap();
        let link = temp.path().join("link");
        make_symlink(&shared, &link).unwrap();

        remove_path(&link).unwrap();
        remove_path(&temp.path().join("missing")).unwrap();

        assert!(!path_exists(&link));
        assert!(shared.join("keep.txt").exists());
    }

    #[test]
    fn test_replace_dir_swaps_contents() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("live");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("old.txt"), "old").unwrap();

        let displaced = replace_dir(&target, |staging| {
            fs::write(staging.join("new.txt"), "new")?;
            Ok(())
        })
        .unwrap()
        .unwrap();

        assert!(target.join("new.txt").exists());
        assert!(!target.join("old.txt").exists());
        assert!(displaced.path().join("old.txt").exists());

        let kept = temp.path().join("kept");
        displaced.keep_as(&kept).unwrap();
        assert_eq!(fs::read_to_string(kept.join("old.txt")).unwrap(), "old");
    }

    #[test]
    fn test_replace_dir_failed_fill_leaves_target() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("live");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("old.txt"), "old").unwrap();

        let result = replace_dir(&target, |_| bail!("copy failed"));

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(target.join("old.txt")).unwrap(), "old");
        // No staging leftovers next to the target.
        let leftovers = fs::read_dir(temp.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_copy_skips_sockets() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("file.txt"), "data").unwrap();
        let _listener = std::os::unix::net::UnixListener::bind(src.join("ipc.sock")).unwrap();

        let dst = temp.path().join("dst");
        copy_dir_recursive(&src, &dst).unwrap();

        assert_eq!(fs::read_to_string(dst.join("file.txt")).unwrap(), "data");
        assert!(!path_exists(&dst.join("ipc.sock")));
    }

    #[test]
    fn test_make_symlink_requires_parent() {
        let temp = TempDir::new().unwrap();
        let link = temp.path().join("absent/link");

        assert!(make_symlink(temp.path(), &link).is_err());
        assert!(!temp.path().join("absent").exists());
    }

    #[test]
    fn test_dropping_displaced_removes_read_only_tree() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("live");
        fs::create_dir_all(target.join("ro")).unwrap();
        fs::write(target.join("ro/file"), "x").unwrap();
        fs::set_permissions(target.join("ro"), fs::Permissions::from_mode(0o555)).unwrap();

        let displaced = replace_dir(&target, |staging| {
            fs::write(staging.join("new.txt"), "new")?;
            Ok(())
        })
        .unwrap();
        drop(displaced);

        let names: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["live".to_string()]);
        assert!(target.join("new.txt").exists());
    }

    #[test]
    fn test_dir_size() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("a")).unwrap();
        fs::write(temp.path().join("a/one"), [0u8; 10]).unwrap();
        fs::write(temp.path().join("two"), [0u8; 5]).unwrap();
        assert_eq!(dir_size(temp.path()).unwrap(), 15);
    }
}
