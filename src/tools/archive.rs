//! Archivers
//!
//! [`JarTool`] drives the JDK `jar` tool; [`TarArchiver`] writes `.tar` or
//! `.tar.gz` archives natively. Both name entries relative to the root they
//! were listed under, so packaging the same file set twice never yields
//! duplicate entries.

use crate::error::{GristError, GristResult};
use crate::stage::{ArchiveMode, FileSet};
use crate::tools::Archiver;
use async_trait::async_trait;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;
use uuid::Uuid;

/// Flatten a file set into (entry name, source file) pairs
fn entry_names(dest: &Path, files: &FileSet) -> GristResult<Vec<(String, PathBuf, PathBuf)>> {
    let mut names = Vec::new();
    for (root, members) in files {
        for file in members {
            let relative = file.strip_prefix(root).unwrap_or(file);
            if relative.is_absolute() {
                return Err(packaging_failure(
                    dest,
                    format!("{} is not under {}", file.display(), root.display()),
                ));
            }
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            names.push((name, root.clone(), root.join(relative)));
        }
    }
    Ok(names)
}

fn packaging_failure(archive: &Path, reason: impl ToString) -> GristError {
    GristError::PackagingFailure {
        archive: archive.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// The JDK `jar` tool
#[derive(Debug, Clone)]
pub struct JarTool {
    jar: String,
}

impl JarTool {
    pub fn new(jar: impl Into<String>) -> Self {
        Self { jar: jar.into() }
    }
}

#[async_trait]
impl Archiver for JarTool {
    async fn archive(&self, mode: ArchiveMode, dest: &Path, files: &FileSet) -> GristResult<PathBuf> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| packaging_failure(dest, e))?;
        }

        let update = mode == ArchiveMode::CreateOrUpdate && dest.is_file();
        let mut command = Command::new(&self.jar);
        command.arg(if update { "uf" } else { "cf" }).arg(dest);
        for (name, root, _) in entry_names(dest, files)? {
            command.arg("-C").arg(root).arg(name);
        }

        debug!("Executing: {:?}", command.as_std());
        let output = command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| GristError::command_failed(&self.jar, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(packaging_failure(
                dest,
                format!(
                    "{} exited with {}: {}",
                    self.jar,
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            ));
        }

        Ok(dest.to_path_buf())
    }

    fn extension(&self) -> &'static str {
        "jar"
    }
}

/// Native tar writer, optionally gzip-compressed
#[derive(Debug, Clone, Copy)]
pub struct TarArchiver {
    gzip: bool,
}

/// One entry of the archive being written
enum Member {
    /// Carried over from the existing archive
    Kept { header: tar::Header, data: Vec<u8> },
    /// Read from disk
    File(PathBuf),
}

impl TarArchiver {
    pub fn new(gzip: bool) -> Self {
        Self { gzip }
    }

    /// Regular-file entries of an existing archive, by name
    fn read_existing(&self, dest: &Path) -> std::io::Result<BTreeMap<String, Member>> {
        let file = File::open(dest)?;
        let reader: Box<dyn Read> = if self.gzip {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };

        let mut members = BTreeMap::new();
        let mut archive = tar::Archive::new(reader);
        for entry in archive.entries()? {
            let mut entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let name = entry.path()?.to_string_lossy().to_string();
            let header = entry.header().clone();
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            members.insert(name, Member::Kept { header, data });
        }
        Ok(members)
    }

    fn write_blocking(
        &self,
        mode: ArchiveMode,
        dest: &Path,
        names: Vec<(String, PathBuf, PathBuf)>,
    ) -> std::io::Result<()> {
        let mut members = if mode == ArchiveMode::CreateOrUpdate && dest.is_file() {
            self.read_existing(dest)?
        } else {
            BTreeMap::new()
        };
        for (name, _, path) in names {
            members.insert(name, Member::File(path));
        }

        let tmp = dest.with_file_name(format!(
            ".{}.tmp-{}",
            dest.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            Uuid::new_v4().simple()
        ));

        let written = File::create(&tmp).and_then(|file| {
            if self.gzip {
                write_members(GzEncoder::new(file, Compression::default()), &members)?.finish()?;
            } else {
                write_members(file, &members)?.sync_all()?;
            }
            Ok(())
        });

        if let Err(e) = written.and_then(|()| std::fs::rename(&tmp, dest)) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }
        Ok(())
    }
}

fn write_members<W: Write>(writer: W, members: &BTreeMap<String, Member>) -> std::io::Result<W> {
    let mut builder = tar::Builder::new(writer);
    for (name, member) in members {
        match member {
            Member::Kept { header, data } => {
                let mut header = header.clone();
                builder.append_data(&mut header, name, data.as_slice())?;
            }
            Member::File(path) => builder.append_path_with_name(path, name)?,
        }
    }
    builder.into_inner()
}

#[async_trait]
impl Archiver for TarArchiver {
    async fn archive(&self, mode: ArchiveMode, dest: &Path, files: &FileSet) -> GristResult<PathBuf> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| packaging_failure(dest, e))?;
        }

        let names = entry_names(dest, files)?;
        debug!("Writing {} entries to {}", names.len(), dest.display());

        let archiver = *self;
        let target = dest.to_path_buf();
        tokio::task::spawn_blocking(move || archiver.write_blocking(mode, &target, names))
            .await
            .map_err(|e| GristError::Internal(format!("archive task panicked: {}", e)))?
            .map_err(|e| packaging_failure(dest, e))?;

        Ok(dest.to_path_buf())
    }

    fn extension(&self) -> &'static str {
        if self.gzip {
            "tar.gz"
        } else {
            "tar"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn class_tree(root: &Path, names: &[&str]) -> FileSet {
        let mut set = BTreeSet::new();
        for name in names {
            let path = root.join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, name.as_bytes()).unwrap();
            set.insert(path);
        }
        let mut files = FileSet::new();
        files.insert(root.to_path_buf(), set);
        files
    }

    fn list(archive: &Path, gzip: bool) -> Vec<String> {
        let file = File::open(archive).unwrap();
        let reader: Box<dyn Read> = if gzip {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };
        tar::Archive::new(reader)
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[tokio::test]
    async fn packaging_twice_keeps_one_copy_per_entry() {
        let temp = TempDir::new().unwrap();
        let bin = temp.path().join("bin");
        let files = class_tree(&bin, &["parser/java/JavaLexer.class", "parser/java/JavaParser.class"]);
        let dest = temp.path().join("parse-Java.tar");
        let archiver = TarArchiver::new(false);

        archiver.archive(ArchiveMode::CreateOrUpdate, &dest, &files).await.unwrap();
        archiver.archive(ArchiveMode::CreateOrUpdate, &dest, &files).await.unwrap();

        assert_eq!(
            list(&dest, false),
            vec!["parser/java/JavaLexer.class", "parser/java/JavaParser.class"]
        );
    }

    #[tokio::test]
    async fn update_merges_and_create_replaces() {
        let temp = TempDir::new().unwrap();
        let bin = temp.path().join("bin");
        let first = class_tree(&bin, &["a/A.class"]);
        let second = class_tree(&bin, &["b/B.class"]);
        let dest = temp.path().join("out").join("parse.tar.gz");
        let archiver = TarArchiver::new(true);
        assert_eq!(archiver.extension(), "tar.gz");

        archiver.archive(ArchiveMode::CreateOrUpdate, &dest, &first).await.unwrap();
        archiver.archive(ArchiveMode::CreateOrUpdate, &dest, &second).await.unwrap();
        assert_eq!(list(&dest, true), vec!["a/A.class", "b/B.class"]);

        archiver.archive(ArchiveMode::Create, &dest, &second).await.unwrap();
        assert_eq!(list(&dest, true), vec!["b/B.class"]);
    }

    #[tokio::test]
    async fn file_outside_root_is_packaging_failure() {
        let temp = TempDir::new().unwrap();
        let mut files = FileSet::new();
        files.insert(
            temp.path().join("bin"),
            BTreeSet::from([PathBuf::from("/elsewhere/A.class")]),
        );

        let err = TarArchiver::new(false)
            .archive(ArchiveMode::Create, &temp.path().join("x.tar"), &files)
            .await
            .unwrap_err();
        assert!(matches!(err, GristError::PackagingFailure { .. }));
    }

    #[tokio::test]
    async fn missing_jar_tool_fails_packaging() {
        use crate::origin::Origin;
        use crate::stage::{PackageArchive, PackageInput, Stage, StageKind};
        use std::sync::Arc;

        let temp = TempDir::new().unwrap();
        let files = class_tree(&temp.path().join("bin"), &["A.class"]);
        let jar = Arc::new(JarTool::new("/nonexistent/bin/jar"));

        let err = jar
            .archive(ArchiveMode::Create, &temp.path().join("x.jar"), &files)
            .await
            .unwrap_err();
        assert!(matches!(err, GristError::CommandFailed { .. }));

        let err = PackageArchive::new(jar)
            .build(
                &PackageInput {
                    mode: ArchiveMode::CreateOrUpdate,
                    archive: temp.path().join("x.jar"),
                    files,
                    origin: Origin::none(),
                },
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.stage_failure(), Some(StageKind::PackageArchive));
        assert!(err.to_string().contains("x.jar"));
        assert!(err.hint().unwrap().contains("JDK"));
    }

    #[test]
    fn entry_names_are_relative_with_slashes() {
        let root = PathBuf::from("/work/bin");
        let mut files = FileSet::new();
        files.insert(
            root.clone(),
            BTreeSet::from([root.join("parser").join("java").join("JavaParser.class")]),
        );

        let names = entry_names(Path::new("/work/x.jar"), &files).unwrap();
        assert_eq!(names[0].0, "parser/java/JavaParser.class");
        assert_eq!(names[0].1, root);
    }
}
