use anyhow::{Context, Result, bail};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Replace `path` with `data` in one step.
///
/// The bytes go to a temp file in the destination directory which is
/// then renamed over the target, so readers see either the old or the
/// new content. Existing permissions are carried over.
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    // Preserve original permissions
    let perms = fs::metadata(path).map(|m| m.permissions()).ok();

    let tmp = tempfile::NamedTempFile::new_in(dir)?;
    let mut file = tmp.as_file();
    file.write_all(data)?;
    file.sync_all()?;

    if let Some(perms) = perms {
        fs::set_permissions(tmp.path(), perms)?;
    }

    tmp.persist(path).map_err(|e| e.error)?;

    // fsync parent dir to ensure durability on Unix
    #[cfg(unix)]
    {
        if let Ok(parent_file) = fs::File::open(dir) {
            let _ = parent_file.sync_all();
        }
    }

    Ok(())
}

/// Atomic write that refuses to clobber an existing file unless asked.
pub fn write_output(path: &Path, data: &str, overwrite: bool) -> Result<()> {
    if path.exists() && !overwrite {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    write_atomic(path, data.as_bytes()).with_context(|| format!("writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn creates_parent_directories() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("nested/dir/out.patch");
        write_atomic(&target, b"hello\n").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "hello\n");
    }

    #[test]
    fn refuses_overwrite_without_flag() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("out.patch");
        fs::write(&target, "old").unwrap();

        let err = write_output(&target, "new", false).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(fs::read_to_string(&target).unwrap(), "old");

        write_output(&target, "new", true).unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "new");
    }

    #[cfg(unix)]
    #[test]
    fn keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("run.sh");
        fs::write(&target, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&target, fs::Permissions::from_mode(0o755)).unwrap();

        write_atomic(&target, b"#!/bin/sh\necho hi\n").unwrap();
        let mode = fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
