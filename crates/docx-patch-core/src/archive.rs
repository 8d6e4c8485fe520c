//! Unpacking a document package into a transient workspace and packing the
//! workspace back into a ZIP archive.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;
use walkdir::WalkDir;
use zip::result::{ZipError, ZipResult};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{PatchError, Result};

const WORKSPACE_PREFIX: &str = "docx-patch-";

/// A member of the source package as recorded at unpack time.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveMember {
    /// Name inside the archive (`/` separated, directories end with `/`)
    pub name: String,
    pub is_dir: bool,
    /// Symbolic link entry; never materialized in the workspace
    pub is_symlink: bool,
    pub compression: CompressionMethod,
}

/// Ordered list of the members of a package.
#[derive(Debug, Clone, Default)]
pub struct ArchiveManifest {
    members: Vec<ArchiveMember>,
}

impl ArchiveManifest {
    fn read<R: Read + Seek>(archive: &mut ZipArchive<R>) -> ZipResult<Self> {
        let mut members = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let entry = archive.by_index_raw(i)?;
            members.push(ArchiveMember {
                name: entry.name().to_string(),
                is_dir: entry.is_dir(),
                is_symlink: entry.is_symlink(),
                compression: entry.compression(),
            });
        }
        Ok(Self { members })
    }

    pub fn members(&self) -> &[ArchiveMember] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn positions(&self) -> HashMap<&str, usize> {
        self.members
            .iter()
            .enumerate()
            .map(|(index, m)| (m.name.as_str(), index))
            .collect()
    }
}

/// Where a member's payload comes from when packing.
enum PackSource {
    Directory,
    File(PathBuf),
    /// Copied verbatim from the source archive
    Raw(usize),
}

/// A package extracted into its own uniquely named temporary directory.
///
/// The directory is removed when this value is dropped, whichever way the
/// owning operation exits.
#[derive(Debug)]
pub struct ExtractedArchive {
    source: PathBuf,
    workspace: TempDir,
    manifest: ArchiveManifest,
}

impl ExtractedArchive {
    /// Extract every member of `source` into a fresh workspace under `base_dir`.
    pub fn unpack(source: &Path, base_dir: &Path) -> Result<Self> {
        let file = File::open(source)?;
        let workspace = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(base_dir)?;

        let corrupt = |source_err: ZipError| PatchError::CorruptArchive {
            path: source.to_path_buf(),
            source: source_err,
        };

        let mut archive = ZipArchive::new(file).map_err(corrupt)?;
        let manifest = ArchiveManifest::read(&mut archive).map_err(corrupt)?;
        extract_members(&mut archive, &manifest, workspace.path()).map_err(corrupt)?;

        debug!(
            "Extracted {} members of {:?} into {:?}",
            manifest.len(),
            source,
            workspace.path()
        );

        Ok(Self {
            source: source.to_path_buf(),
            workspace,
            manifest,
        })
    }

    pub fn root(&self) -> &Path {
        self.workspace.path()
    }

    pub fn manifest(&self) -> &ArchiveManifest {
        &self.manifest
    }

    /// Filesystem path of an archive member inside the workspace.
    pub fn part_path(&self, part: &str) -> PathBuf {
        part.split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root().to_path_buf(), |path, segment| path.join(segment))
    }

    /// Write the whole workspace tree as a ZIP archive into `writer`.
    ///
    /// Archive names are relative to the workspace root. Members known from
    /// the source package keep their original order and compression; any
    /// file that appeared in the workspace since unpacking is appended.
    /// Directories are only emitted when the source had an explicit entry
    /// for them. Symlink members are copied raw from the source archive.
    /// Returns the number of members written.
    pub fn pack_into<W: Write + Seek>(&self, writer: W) -> ZipResult<usize> {
        let root = self.root();
        let positions = self.manifest.positions();
        let mut entries: Vec<(usize, String, PackSource)> = Vec::new();

        for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            let file_type = entry.file_type();
            if file_type.is_symlink() {
                continue;
            }
            let relative = entry.path().strip_prefix(root).map_err(io::Error::other)?;
            let mut name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if file_type.is_dir() {
                name.push('/');
            }

            let (order, source) = match positions.get(name.as_str()) {
                Some(&index) if self.manifest.members[index].is_symlink => continue,
                Some(&index) if file_type.is_dir() => (index, PackSource::Directory),
                Some(&index) => (index, PackSource::File(entry.into_path())),
                None if file_type.is_dir() => continue,
                None => (usize::MAX, PackSource::File(entry.into_path())),
            };
            entries.push((order, name, source));
        }
        for (index, member) in self.manifest.members.iter().enumerate() {
            if member.is_symlink {
                entries.push((index, member.name.clone(), PackSource::Raw(index)));
            }
        }
        entries.sort_by_key(|(order, ..)| *order);

        let mut source_archive = None;
        let mut zip = ZipWriter::new(writer);
        for (order, name, source) in &entries {
            let method = match self.manifest.members.get(*order) {
                Some(member) if member.compression == CompressionMethod::Stored => {
                    CompressionMethod::Stored
                }
                _ => CompressionMethod::Deflated,
            };
            let options = SimpleFileOptions::default().compression_method(method);

            match source {
                PackSource::Directory => zip.add_directory(name.as_str(), options)?,
                PackSource::File(path) => {
                    zip.start_file(name.as_str(), options)?;
                    let mut file = File::open(path)?;
                    io::copy(&mut file, &mut zip)?;
                }
                PackSource::Raw(index) => {
                    if source_archive.is_none() {
                        source_archive = Some(ZipArchive::new(File::open(&self.source)?)?);
                    }
                    if let Some(archive) = source_archive.as_mut() {
                        zip.raw_copy_file(archive.by_index_raw(*index)?)?;
                    }
                }
            }
        }
        zip.finish()?;

        Ok(entries.len())
    }
}

/// Write regular members and directories below `root`. Symlink members are
/// skipped, so nothing in the workspace can point outside of it.
fn extract_members<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    manifest: &ArchiveManifest,
    root: &Path,
) -> ZipResult<()> {
    for (index, member) in manifest.members.iter().enumerate() {
        if member.is_symlink {
            debug!("Leaving symlink member {} packed", member.name);
            continue;
        }
        let mut entry = archive.by_index(index)?;
        let relative = entry.enclosed_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("member name escapes the archive root: {}", member.name),
            )
        })?;
        let target = root.join(relative);

        if member.is_dir {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_zip() -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let deflated = SimpleFileOptions::default();
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        zip.start_file("[Content_Types].xml", deflated).unwrap();
        zip.write_all(b"<Types/>").unwrap();
        zip.add_directory("word/", deflated).unwrap();
        zip.start_file("word/document.xml", deflated).unwrap();
        zip.write_all(b"<w:document/>").unwrap();
        zip.start_file("word/media/image1.png", stored).unwrap();
        zip.write_all(&[0x89, b'P', b'N', b'G']).unwrap();
        zip.finish().unwrap().into_inner()
    }

    fn unpack_sample(dir: &Path) -> ExtractedArchive {
        let source = dir.join("sample.docx");
        std::fs::write(&source, sample_zip()).unwrap();
        ExtractedArchive::unpack(&source, dir).unwrap()
    }

    #[test]
    fn test_manifest_keeps_archive_order() {
        let dir = TempDir::new().unwrap();
        let extracted = unpack_sample(dir.path());

        let names: Vec<&str> = extracted
            .manifest()
            .members()
            .iter()
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "[Content_Types].xml",
                "word/",
                "word/document.xml",
                "word/media/image1.png"
            ]
        );
        assert!(extracted.manifest().members()[1].is_dir);
        assert_eq!(
            extracted.manifest().members()[3].compression,
            CompressionMethod::Stored
        );
    }

    #[test]
    fn test_part_path_resolves_inside_workspace() {
        let dir = TempDir::new().unwrap();
        let extracted = unpack_sample(dir.path());

        let body = extracted.part_path("word/document.xml");
        assert!(body.starts_with(extracted.root()));
        assert_eq!(std::fs::read(&body).unwrap(), b"<w:document/>");
    }

    #[test]
    fn test_pack_preserves_members_and_order() {
        let dir = TempDir::new().unwrap();
        let extracted = unpack_sample(dir.path());

        let mut out = Cursor::new(Vec::new());
        let written = extracted.pack_into(&mut out).unwrap();
        assert_eq!(written, 4);

        let mut repacked = ZipArchive::new(Cursor::new(out.into_inner())).unwrap();
        let names: Vec<String> = repacked.file_names().map(str::to_string).collect();
        let expected: Vec<String> = extracted
            .manifest()
            .members()
            .iter()
            .map(|m| m.name.clone())
            .collect();
        assert_eq!(names, expected);

        let mut image = Vec::new();
        repacked
            .by_name("word/media/image1.png")
            .unwrap()
            .read_to_end(&mut image)
            .unwrap();
        assert_eq!(image, vec![0x89, b'P', b'N', b'G']);
        assert_eq!(
            repacked.by_name("word/media/image1.png").unwrap().compression(),
            CompressionMethod::Stored
        );
    }

    #[test]
    fn test_symlink_member_is_copied_not_followed() {
        let dir = TempDir::new().unwrap();
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        zip.start_file("word/document.xml", options).unwrap();
        zip.write_all(b"<w:document/>").unwrap();
        zip.add_symlink("word/linked.xml", "/etc/hostname", options)
            .unwrap();
        zip.start_file("word/styles.xml", options).unwrap();
        zip.write_all(b"<w:styles/>").unwrap();
        let source = dir.path().join("linked.docx");
        std::fs::write(&source, zip.finish().unwrap().into_inner()).unwrap();

        let extracted = ExtractedArchive::unpack(&source, dir.path()).unwrap();
        assert!(extracted.manifest().members()[1].is_symlink);
        let on_disk = extracted.part_path("word/linked.xml");
        assert!(std::fs::symlink_metadata(&on_disk).is_err());

        let mut out = Cursor::new(Vec::new());
        assert_eq!(extracted.pack_into(&mut out).unwrap(), 3);

        let mut repacked = ZipArchive::new(Cursor::new(out.into_inner())).unwrap();
        let names: Vec<&str> = repacked.file_names().collect();
        assert_eq!(
            names,
            vec!["word/document.xml", "word/linked.xml", "word/styles.xml"]
        );
        let mut link = repacked.by_name("word/linked.xml").unwrap();
        assert!(link.is_symlink());
        let mut target = String::new();
        link.read_to_string(&mut target).unwrap();
        assert_eq!(target, "/etc/hostname");
    }

    #[test]
    fn test_workspace_removed_on_drop() {
        let dir = TempDir::new().unwrap();
        let extracted = unpack_sample(dir.path());
        let root = extracted.root().to_path_buf();
        assert!(root.exists());

        drop(extracted);
        assert!(!root.exists());
    }

    #[test]
    fn test_unpack_rejects_non_archive() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("not-a-zip.docx");
        std::fs::write(&source, b"plain text, no zip here").unwrap();

        let err = ExtractedArchive::unpack(&source, dir.path()).unwrap_err();
        assert!(matches!(err, PatchError::CorruptArchive { .. }));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(WORKSPACE_PREFIX))
            .collect();
        assert!(leftovers.is_empty());
    }
}
