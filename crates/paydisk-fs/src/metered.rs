//! The metered filesystem: every operation on a mount charges the mount's
//! uid before or after the backend call, depending on its cost class.
//!
//! Mutations charge up front so an insufficient balance cancels them without
//! leaving garbage; reads charge after so a failed or empty read is free and
//! a readdir costs per entry actually delivered.

use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;

use paydisk_core::{
    is_hex_address, LedgerError, Uid, POINTS_OF_MKDIR, POINTS_OF_RENAME, POINTS_PER_FILE_INFO,
};
use paydisk_store::LedgerDb;

use crate::route::Mount;

/// Open mode for `open_file`. Creation and truncation pass through
/// uncharged; read-only enforcement happens at write time.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub create: bool,
    pub truncate: bool,
    pub append: bool,
}

impl OpenFlags {
    pub fn read_only() -> Self {
        Self {
            read: true,
            ..Default::default()
        }
    }

    pub fn write_create() -> Self {
        Self {
            read: true,
            write: true,
            create: true,
            ..Default::default()
        }
    }
}

/// A directory-rooted backend with per-operation charging.
pub struct MeteredDir {
    root: PathBuf,
    db: Arc<LedgerDb>,
    uid: Uid,
    read_only: bool,
}

impl MeteredDir {
    pub fn new(root: PathBuf, db: Arc<LedgerDb>, uid: Uid, read_only: bool) -> Self {
        Self {
            root,
            db,
            uid,
            read_only,
        }
    }

    pub fn from_mount(mount: Mount, db: Arc<LedgerDb>) -> Self {
        Self::new(mount.root, db, mount.uid, mount.read_only)
    }

    /// Resolve `name` under the mount root, refusing traversal components.
    fn resolve(&self, name: &str) -> Result<PathBuf, LedgerError> {
        let mut path = self.root.clone();
        for part in name.split('/') {
            match part {
                "" | "." => continue,
                ".." => return Err(LedgerError::PermissionDenied),
                p => path.push(p),
            }
        }
        Ok(path)
    }

    pub fn mkdir(&self, name: &str) -> Result<(), LedgerError> {
        if self.read_only {
            return Err(LedgerError::ReadOnlyShare);
        }
        // The root level is reserved for address-named user mounts.
        let bare = name.strip_prefix('/').unwrap_or(name);
        if is_hex_address(name) || is_hex_address(bare) {
            return Err(LedgerError::ReservedName);
        }
        self.db
            .consume(self.uid, POINTS_OF_MKDIR, &format!("Mkdir '{name}'"))?;
        fs::create_dir(self.resolve(name)?)?;
        Ok(())
    }

    pub fn rename(&self, old_name: &str, new_name: &str) -> Result<(), LedgerError> {
        if self.read_only {
            return Err(LedgerError::ReadOnlyShare);
        }
        self.db.consume(
            self.uid,
            POINTS_OF_RENAME,
            &format!("Rename '{old_name}' to '{new_name}'"),
        )?;
        fs::rename(self.resolve(old_name)?, self.resolve(new_name)?)?;
        Ok(())
    }

    /// Charge precedes the backend call on the directory-side stat.
    pub fn stat(&self, name: &str) -> Result<fs::Metadata, LedgerError> {
        self.db
            .consume(self.uid, POINTS_PER_FILE_INFO, &format!("Stat '{name}'"))?;
        Ok(fs::metadata(self.resolve(name)?)?)
    }

    /// Uncharged pass-through; removing something that is not there is fine.
    pub fn remove_all(&self, name: &str) -> Result<(), LedgerError> {
        let path = self.resolve(name)?;
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => Ok(other?),
        }
    }

    /// Open is uncharged; the returned handle meters its own operations.
    pub fn open_file(&self, name: &str, flags: OpenFlags) -> Result<MeteredFile, LedgerError> {
        let path = self.resolve(name)?;
        let inner = if path.is_dir() {
            FileInner::Dir {
                path,
                entries: None,
                cursor: 0,
            }
        } else {
            let mut opts = fs::OpenOptions::new();
            opts.read(flags.read)
                .write(flags.write)
                .create(flags.create)
                .truncate(flags.truncate)
                .append(flags.append);
            FileInner::Regular(opts.open(&path)?)
        };
        Ok(MeteredFile {
            db: Arc::clone(&self.db),
            uid: self.uid,
            name: name.to_string(),
            read_only: self.read_only,
            inner,
        })
    }
}

// ── File handles ─────────────────────────────────────────────────────────────

/// Listing entry returned by `readdir`.
#[derive(Debug, Clone)]
pub struct DirEntryInfo {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

enum FileInner {
    Regular(fs::File),
    Dir {
        path: PathBuf,
        entries: Option<Vec<DirEntryInfo>>,
        cursor: usize,
    },
}

pub struct MeteredFile {
    db: Arc<LedgerDb>,
    uid: Uid,
    name: String,
    read_only: bool,
    inner: FileInner,
}

fn not_a_directory() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory handle")
}

fn is_a_directory() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidInput, "is a directory")
}

impl MeteredFile {
    /// Charged only on success, per kibibyte actually read.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, LedgerError> {
        let FileInner::Regular(file) = &mut self.inner else {
            return Err(is_a_directory().into());
        };
        let n = file.read(buf)?;
        let points = (n as i64 + 1023) / 1024;
        if points > 0 {
            self.db.consume(
                self.uid,
                points,
                &format!("Read '{}' for {} bytes", self.name, n),
            )?;
        }
        Ok(n)
    }

    /// Charged up front, per kibibyte submitted; an insufficient balance
    /// cancels the write before any byte reaches the backend.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, LedgerError> {
        if self.read_only {
            return Err(LedgerError::ReadOnlyShare);
        }
        let points = (buf.len() as i64 + 1023) / 1024;
        if points > 0 {
            self.db.consume(
                self.uid,
                points,
                &format!("Write to '{}' for {} bytes", self.name, buf.len()),
            )?;
        }
        let FileInner::Regular(file) = &mut self.inner else {
            return Err(is_a_directory().into());
        };
        Ok(file.write(buf)?)
    }

    /// Next `count` listing entries (all remaining when `count == 0`);
    /// charged per entry returned, only on success.
    pub fn readdir(&mut self, count: usize) -> Result<Vec<DirEntryInfo>, LedgerError> {
        let FileInner::Dir {
            path,
            entries,
            cursor,
        } = &mut self.inner
        else {
            return Err(not_a_directory().into());
        };

        if entries.is_none() {
            let mut list = Vec::new();
            for entry in fs::read_dir(&*path)? {
                let entry = entry?;
                let meta = entry.metadata()?;
                list.push(DirEntryInfo {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    is_dir: meta.is_dir(),
                    size: meta.len(),
                });
            }
            *entries = Some(list);
        }

        let list = entries.as_ref().expect("entries loaded");
        let remaining = &list[(*cursor).min(list.len())..];
        let take = if count == 0 {
            remaining.len()
        } else {
            count.min(remaining.len())
        };
        let out: Vec<DirEntryInfo> = remaining[..take].to_vec();
        *cursor += take;

        if !out.is_empty() {
            self.db.consume(
                self.uid,
                out.len() as i64 * POINTS_PER_FILE_INFO,
                &format!("Read dir '{}' for {} entries", self.name, out.len()),
            )?;
        }
        Ok(out)
    }

    /// Charged only on success.
    pub fn stat(&self) -> Result<fs::Metadata, LedgerError> {
        let meta = match &self.inner {
            FileInner::Regular(file) => file.metadata()?,
            FileInner::Dir { path, .. } => fs::metadata(path)?,
        };
        self.db.consume(
            self.uid,
            POINTS_PER_FILE_INFO,
            &format!("Stat '{}'", self.name),
        )?;
        Ok(meta)
    }

    /// Uncharged pass-through.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64, LedgerError> {
        let FileInner::Regular(file) = &mut self.inner else {
            return Err(is_a_directory().into());
        };
        Ok(file.seek(pos)?)
    }

    /// Uncharged pass-through.
    pub fn close(self) -> Result<(), LedgerError> {
        Ok(())
    }
}
