//! Archive transfer protocol.
//!
//! Files move into and out of a container as single-entry-or-directory tar
//! streams. Every path presented to the sandbox is resolved against the
//! configured working-directory root first; any spelling containing a
//! parent-traversal segment is rejected before an archive is built or
//! uploaded, and inbound archive entries that would escape their destination
//! directory are dropped instead of extracted.

use std::io::Read;
use std::path::{Component, Path, PathBuf};

use tierbox_core::{Error, Result};

/// Resolve `path` against the sandbox working-directory root.
///
/// Absolute and relative spellings are both re-rooted under `root`. Any `..`
/// segment fails with a security error regardless of spelling.
pub fn resolve_path(root: &str, path: &str) -> Result<String> {
    if path.trim().is_empty() {
        return Err(Error::validation("empty path"));
    }
    for segment in path.split(['/', '\\']) {
        if segment == ".." {
            return Err(Error::security(format!(
                "path traversal rejected: '{}'",
                path
            )));
        }
    }
    let cleaned: Vec<&str> = path
        .split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    if cleaned.is_empty() {
        return Err(Error::validation(format!("path resolves to nothing: '{}'", path)));
    }
    Ok(format!("{}/{}", root.trim_end_matches('/'), cleaned.join("/")))
}

/// Split a resolved container path into (parent directory, file name).
pub fn split_parent(resolved: &str) -> Result<(String, String)> {
    match resolved.rsplit_once('/') {
        Some((parent, name)) if !name.is_empty() => {
            let parent = if parent.is_empty() { "/" } else { parent };
            Ok((parent.to_string(), name.to_string()))
        }
        _ => Err(Error::validation(format!("not a file path: '{}'", resolved))),
    }
}

/// Build an in-memory tar archive holding a single file entry.
pub fn pack_file(name: &str, data: &[u8]) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, name, data)?;
    Ok(builder.into_inner()?)
}

/// Build an in-memory tar archive from a host file or directory. A directory
/// is archived under its own name with relative structure preserved, so the
/// uploaded tree is addressable as `<dest>/<name>` inside the container.
/// Blocking; callers offload to the worker pool.
pub fn pack_path(src: &Path) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    let meta = std::fs::metadata(src)
        .map_err(|e| Error::not_found(format!("{}: {}", src.display(), e)))?;
    let name = src
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::validation(format!("invalid file name: {}", src.display())))?;
    if meta.is_dir() {
        builder.append_dir_all(name, src)?;
    } else {
        builder.append_path_with_name(src, name)?;
    }
    Ok(builder.into_inner()?)
}

/// Extract the bytes of the first regular file in `archive`.
pub fn unpack_single(archive: &[u8]) -> Result<Vec<u8>> {
    let mut reader = tar::Archive::new(std::io::Cursor::new(archive));
    for entry in reader.entries()? {
        let mut entry = entry?;
        if entry.header().entry_type().is_file() {
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data)?;
            return Ok(data);
        }
    }
    Err(Error::not_found("archive contains no file entry"))
}

/// Extract `archive` into `dest`, skipping any entry whose destination would
/// escape `dest`. Returns (extracted, skipped) counts. Blocking; callers
/// offload to the worker pool.
pub fn unpack_into(archive: &[u8], dest: &Path) -> Result<(usize, usize)> {
    let mut reader = tar::Archive::new(std::io::Cursor::new(archive));
    let mut extracted = 0usize;
    let mut skipped = 0usize;

    for entry in reader.entries()? {
        let mut entry = entry?;
        let rel = entry.path()?.into_owned();
        match safe_join(dest, &rel) {
            Some(target) => {
                if entry.header().entry_type().is_dir() {
                    std::fs::create_dir_all(&target)?;
                } else if entry.header().entry_type().is_file() {
                    if let Some(parent) = target.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    let mut out = std::fs::File::create(&target)?;
                    std::io::copy(&mut entry, &mut out)?;
                    extracted += 1;
                } else {
                    // symlinks and specials are never materialized on the host
                    tracing::debug!(entry = %rel.display(), "skipping non-regular archive entry");
                    skipped += 1;
                }
            }
            None => {
                tracing::debug!(entry = %rel.display(), "skipping archive entry escaping destination");
                skipped += 1;
            }
        }
    }
    Ok((extracted, skipped))
}

/// Join `rel` onto `dest` only if the result stays inside `dest`.
fn safe_join(dest: &Path, rel: &Path) -> Option<PathBuf> {
    let mut target = dest.to_path_buf();
    for component in rel.components() {
        match component {
            Component::Normal(part) => target.push(part),
            Component::CurDir => {}
            // absolute or traversal segments escape the destination
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative() {
        assert_eq!(resolve_path("/workspace", "a/b.txt").unwrap(), "/workspace/a/b.txt");
    }

    #[test]
    fn test_resolve_absolute_rerooted() {
        assert_eq!(resolve_path("/workspace", "/etc/hosts").unwrap(), "/workspace/etc/hosts");
    }

    #[test]
    fn test_resolve_drops_dot_segments() {
        assert_eq!(resolve_path("/workspace/", "./a/./b").unwrap(), "/workspace/a/b");
    }

    #[test]
    fn test_resolve_rejects_every_traversal_spelling() {
        for path in [
            "../../etc/passwd",
            "a/../b",
            "/abs/../x",
            "..",
            "..\\windows",
            "a\\..\\b",
        ] {
            let err = resolve_path("/workspace", path).unwrap_err();
            assert!(
                matches!(err, Error::Security(_)),
                "'{}' should be a security error, got {:?}",
                path,
                err
            );
        }
    }

    #[test]
    fn test_split_parent() {
        let (parent, name) = split_parent("/workspace/a/b.txt").unwrap();
        assert_eq!(parent, "/workspace/a");
        assert_eq!(name, "b.txt");
    }

    #[test]
    fn test_pack_then_unpack_single() {
        let archive = pack_file("hello.txt", b"hi there").unwrap();
        let data = unpack_single(&archive).unwrap();
        assert_eq!(data, b"hi there");
    }

    #[test]
    fn test_unpack_single_empty_archive() {
        let builder = tar::Builder::new(Vec::new());
        let archive = builder.into_inner().unwrap();
        assert!(matches!(unpack_single(&archive), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_unpack_into_skips_traversal_entries() {
        // archive with one honest entry and one attempting to escape
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in [("good.txt", &b"ok"[..]), ("../evil.txt", &b"bad"[..])] {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            // write the name bytes directly: Builder::append_data refuses
            // to construct entries containing `..`
            header.as_gnu_mut().unwrap().name[..name.len()].copy_from_slice(name.as_bytes());
            header.set_cksum();
            builder.append(&header, data).unwrap();
        }
        let archive = builder.into_inner().unwrap();

        let dest = tempfile::tempdir().unwrap();
        let (extracted, skipped) = unpack_into(&archive, dest.path()).unwrap();
        assert_eq!(extracted, 1);
        assert_eq!(skipped, 1);
        assert!(dest.path().join("good.txt").exists());
        assert!(!dest.path().parent().unwrap().join("evil.txt").exists());
    }

    #[test]
    fn test_pack_path_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("script.py");
        std::fs::write(&file, "print(1)").unwrap();

        let archive = pack_path(&file).unwrap();
        assert_eq!(unpack_single(&archive).unwrap(), b"print(1)");
    }

    #[test]
    fn test_pack_path_directory_preserves_structure() {
        let root = tempfile::tempdir().unwrap();
        let proj = root.path().join("proj");
        std::fs::create_dir_all(proj.join("nested")).unwrap();
        std::fs::write(proj.join("top.txt"), "t").unwrap();
        std::fs::write(proj.join("nested/inner.txt"), "i").unwrap();

        let archive = pack_path(&proj).unwrap();
        let out = tempfile::tempdir().unwrap();
        let (extracted, skipped) = unpack_into(&archive, out.path()).unwrap();
        assert_eq!(skipped, 0);
        assert_eq!(extracted, 2);
        assert!(out.path().join("proj/top.txt").exists());
        assert!(out.path().join("proj/nested/inner.txt").exists());
    }
}
