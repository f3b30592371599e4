//! Tarball extraction and reproducible archive creation.

use super::error::BuildError;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};
use tar::{EntryType, Header, HeaderMode};
use tracing::debug;

/// xz preset used for release archives.
const XZ_LEVEL: u32 = 6;

fn open_decoder(tarball: &Path) -> Result<Box<dyn Read>> {
    let name = tarball
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Invalid path: {}", tarball.display()))?;

    let file = BufReader::new(
        File::open(tarball).with_context(|| format!("Failed to open {}", tarball.display()))?,
    );

    if name.ends_with(".tar.xz") || name.ends_with(".txz") {
        Ok(Box::new(xz2::read::XzDecoder::new(file)))
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Ok(Box::new(flate2::read::GzDecoder::new(file)))
    } else if name.ends_with(".tar") {
        Ok(Box::new(file))
    } else {
        Err(BuildError::UnsupportedArchive(name.to_string()).into())
    }
}

/// Drop the first `strip` components; `None` if nothing is left or the
/// path tries to escape the destination.
fn strip_path(path: &Path, strip: usize) -> Option<PathBuf> {
    let components: Vec<_> = path.components().collect();
    if components.len() <= strip {
        return None;
    }
    let rest = &components[strip..];
    if rest
        .iter()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return None;
    }
    Some(rest.iter().collect())
}

/// Whether `path` resolves under `root` (already canonical). The deepest
/// existing ancestor is resolved, so symlinks planted by earlier entries
/// are followed; a dangling link counts as outside.
fn within(root: &Path, path: &Path) -> bool {
    let mut existing = path;
    while existing.symlink_metadata().is_err() {
        match existing.parent() {
            Some(parent) => existing = parent,
            None => return false,
        }
    }
    existing
        .canonicalize()
        .is_ok_and(|resolved| resolved.starts_with(root))
}

/// Extract `tarball` into `dest`, removing `strip` leading path components.
///
/// Entries that would land outside `dest`, whether through `..` or through
/// a symlink unpacked earlier, are skipped.
pub fn extract(tarball: &Path, dest: &Path, strip: usize) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    let root = dest
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", dest.display()))?;

    let mut archive = tar::Archive::new(open_decoder(tarball)?);
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);

    let entries = archive
        .entries()
        .with_context(|| format!("Failed to read {}", tarball.display()))?;

    for entry in entries {
        let mut entry = entry.with_context(|| format!("Corrupt archive {}", tarball.display()))?;
        let path = entry.path()?.into_owned();

        let Some(stripped) = strip_path(&path, strip) else {
            debug!(entry = %path.display(), "skipping archive entry");
            continue;
        };
        let out = dest.join(&stripped);

        let Some(parent) = out.parent() else {
            continue;
        };
        if !within(&root, parent) {
            debug!(entry = %path.display(), "skipping entry outside destination");
            continue;
        }
        std::fs::create_dir_all(parent)?;

        // Replace, never write through, a link left by an earlier entry.
        if out
            .symlink_metadata()
            .is_ok_and(|meta| meta.file_type().is_symlink())
        {
            std::fs::remove_file(&out)?;
        }

        // Hard links name another member of the same archive.
        if entry.header().entry_type() == EntryType::Link {
            let link = entry
                .link_name()?
                .with_context(|| format!("Hard link without target: {}", path.display()))?
                .into_owned();
            let Some(link) = strip_path(&link, strip).map(|l| dest.join(l)) else {
                continue;
            };
            if !within(&root, &link) {
                debug!(entry = %path.display(), "skipping hard link outside destination");
                continue;
            }
            let _ = std::fs::remove_file(&out);
            std::fs::hard_link(&link, &out)
                .with_context(|| format!("Failed to link {}", out.display()))?;
            continue;
        }

        entry
            .unpack(&out)
            .with_context(|| format!("Failed to extract {}", out.display()))?;
    }

    Ok(())
}

/// Pack `src_dir` into a reproducible `.tar.xz` at `out`.
///
/// Entries are sorted, owned by 0:0 and stamped with `mtime`; every path is
/// placed under `top/`.
pub fn pack_dir(src_dir: &Path, top: &str, out: &Path, mtime: u64) -> Result<()> {
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let part = out.with_extension("xz.part");

    let file = File::create(&part).with_context(|| format!("Failed to create {}", part.display()))?;
    let mut builder = tar::Builder::new(xz2::write::XzEncoder::new(file, XZ_LEVEL));
    builder.follow_symlinks(false);

    for entry in walkdir::WalkDir::new(src_dir)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("Failed to walk {}", src_dir.display()))?;
        let rel = entry.path().strip_prefix(src_dir)?;
        let name = Path::new(top).join(rel);

        let meta = entry
            .path()
            .symlink_metadata()
            .with_context(|| format!("Failed to stat {}", entry.path().display()))?;

        let mut header = Header::new_gnu();
        header.set_metadata_in_mode(&meta, HeaderMode::Deterministic);
        header.set_mtime(mtime);
        header.set_uid(0);
        header.set_gid(0);

        let file_type = meta.file_type();
        if file_type.is_symlink() {
            let target = std::fs::read_link(entry.path())?;
            header.set_size(0);
            builder.append_link(&mut header, &name, &target)?;
        } else if file_type.is_dir() {
            header.set_size(0);
            builder.append_data(&mut header, &name, std::io::empty())?;
        } else {
            let data = File::open(entry.path())
                .with_context(|| format!("Failed to open {}", entry.path().display()))?;
            builder.append_data(&mut header, &name, data)?;
        }
    }

    let encoder = builder.into_inner()?;
    encoder.finish()?;
    std::fs::rename(&part, out)?;
    Ok(())
}
