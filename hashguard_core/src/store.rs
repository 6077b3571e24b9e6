//! Store management and object I/O.
//!
//! Layout under the root:
//!
//! ```text
//! <root>/
//!   <digest[0..2]>/
//!     <digest><extension>
//! <scratch>/
//!   <sanitized-name>.<random>.part
//! ```
//!
//! The filesystem is the only coordination point between concurrent callers.
//! Relocation out of scratch is a no-clobber rename, so two uploads of the
//! same content can never both land.

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::hash::{self, Algorithm, Digest, DigestWriter};
use crate::sanitize;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Relocation attempts when a concurrent delete removes the shard directory
/// between its creation and the rename.
const RELOCATE_ATTEMPTS: usize = 3;

/// A content-addressed store.
#[derive(Debug)]
pub struct Store {
    config: StoreConfig,
}

/// An object resolved by [`Store::lookup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    digest: String,
    file_name: String,
    path: PathBuf,
}

impl StoredObject {
    /// The digest this object is stored under.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// On-disk file name, `<digest><extension>`; also the suggested download name.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Extension preserved from the upload, with leading dot, or `""`.
    pub fn extension(&self) -> &str {
        &self.file_name[self.digest.len()..]
    }

    /// Open the object for reading.
    pub fn open(&self) -> Result<File> {
        File::open(&self.path).map_err(|e| self.map_gone(e))
    }

    /// Size in bytes.
    pub fn size(&self) -> Result<u64> {
        let metadata = fs::metadata(&self.path).map_err(|e| self.map_gone(e))?;
        Ok(metadata.len())
    }

    /// Read the whole object into memory.
    pub fn read_to_vec(&self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        self.open()?.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Stream the object into `writer`, returning the number of bytes copied.
    pub fn copy_to<W: Write>(&self, mut writer: W) -> Result<u64> {
        let mut file = self.open()?;
        Ok(io::copy(&mut file, &mut writer)?)
    }

    // The object may be deleted between lookup and use.
    fn map_gone(&self, err: io::Error) -> Error {
        if err.kind() == io::ErrorKind::NotFound {
            Error::not_found(&self.digest)
        } else {
            err.into()
        }
    }
}

impl Store {
    /// Create a store handle. Directories are created on first use.
    pub fn new(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Create a store at `root` with default settings.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::new(StoreConfig::new(root))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Get the root directory of the store.
    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Get the scratch directory of the store.
    pub fn scratch(&self) -> &Path {
        &self.config.scratch
    }

    /// Get the algorithm used by this store.
    pub fn algorithm(&self) -> Algorithm {
        self.config.algorithm
    }

    /// Create the root and scratch directories if missing. Idempotent.
    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.config.root)?;
        fs::create_dir_all(&self.config.scratch)?;
        Ok(())
    }

    /// Format check for a caller-supplied digest, without touching the disk.
    pub fn is_well_formed(&self, candidate: &str) -> bool {
        hash::is_well_formed(self.config.algorithm, candidate)
    }

    /// Shard directory for a digest or stored file name: `<root>/<name[0..2]>`.
    ///
    /// `None` if the name is shorter than two characters.
    pub fn shard_dir(&self, name: &str) -> Option<PathBuf> {
        name.get(..2).map(|prefix| self.config.root.join(prefix))
    }

    /// Path a digest is stored at, given the extension it was uploaded with.
    pub fn object_path(&self, digest: &Digest, extension: &str) -> PathBuf {
        self.config
            .root
            .join(digest.shard())
            .join(format!("{}{}", digest, extension))
    }

    /// Compute the digest of a stream without storing it.
    pub fn digest_reader<R: Read>(&self, reader: R) -> Result<Digest> {
        hash::compute_digest_with_buffer(self.config.algorithm, reader, self.config.buffer_size)
    }

    /// Store the content of `reader`, returning its digest.
    ///
    /// `file_name` is the client-supplied name; only its sanitized extension
    /// is kept on the stored object. Fails with `EmptyInput` if the reader
    /// yields nothing and `DuplicateContent` if the digest is already stored.
    /// The scratch file is removed on every failure path.
    pub fn save<R: Read>(&self, file_name: &str, mut reader: R) -> Result<Digest> {
        let name = sanitize::sanitize_file_name(file_name);
        let mut buf = vec![0u8; self.config.buffer_size];

        // Peek before touching the disk.
        let mut n = read_chunk(&mut reader, &mut buf)?;
        if n == 0 {
            debug!(file_name = %name, "Rejected empty upload");
            return Err(Error::EmptyInput);
        }

        self.ensure_directories()?;

        let prefix = format!("{}.", name);
        let mut scratch = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".part")
            .rand_bytes(8)
            .tempfile_in(&self.config.scratch)?;
        debug!(scratch = %scratch.path().display(), "Receiving upload");

        let mut hasher = DigestWriter::new(self.config.algorithm);
        let mut total = 0u64;
        while n > 0 {
            hasher.update(&buf[..n]);
            scratch.write_all(&buf[..n])?;
            total += n as u64;
            n = read_chunk(&mut reader, &mut buf)?;
        }
        scratch.flush()?;
        scratch.as_file().sync_all()?;

        let digest = hasher.finalize();

        // Early exit; the no-clobber rename below is authoritative.
        // The rename only guards this exact target, so concurrent saves of the
        // same bytes under different extensions are not caught there.
        if let Some(existing) = self.find(digest.as_str())? {
            debug!(path = %existing.path.display(), "Content already stored");
            return Err(Error::duplicate_content(digest.as_str()));
        }

        let extension = sanitize::extension(&name);
        let target = self.relocate(scratch, &digest, &extension)?;

        info!(digest = %digest, bytes = total, path = %target.display(), "Stored object");
        Ok(digest)
    }

    /// Move a finished scratch file into its shard without overwriting.
    ///
    /// On failure the shard directory is removed again if nothing else landed in it.
    fn relocate(&self, scratch: NamedTempFile, digest: &Digest, extension: &str) -> Result<PathBuf> {
        let target = self.object_path(digest, extension);
        let shard = self.config.root.join(digest.shard());

        let result = persist_into_shard(scratch, digest, &shard, &target);
        if result.is_err() {
            remove_shard_if_empty(&shard);
        }
        result.map(|()| target)
    }

    /// Resolve a digest to its stored object.
    ///
    /// Malformed digests fail with `InvalidDigest` before any disk access.
    pub fn lookup(&self, candidate: &str) -> Result<StoredObject> {
        hash::validate(self.config.algorithm, candidate)?;
        self.ensure_directories()?;
        self.find(candidate)?
            .ok_or_else(|| Error::not_found(candidate))
    }

    /// Scan the candidate's shard for an entry whose stem equals it exactly.
    fn find(&self, candidate: &str) -> Result<Option<StoredObject>> {
        let Some(shard) = self.shard_dir(candidate) else {
            return Ok(None);
        };

        let entries = match fs::read_dir(&shard) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if Path::new(file_name).file_stem() != Some(OsStr::new(candidate)) {
                continue;
            }
            if !entry.file_type()?.is_file() {
                continue;
            }
            return Ok(Some(StoredObject {
                digest: candidate.to_string(),
                file_name: file_name.to_string(),
                path: entry.path(),
            }));
        }

        Ok(None)
    }

    /// Read a stored object fully into memory.
    pub fn read(&self, candidate: &str) -> Result<Vec<u8>> {
        self.lookup(candidate)?.read_to_vec()
    }

    /// Write a stored object to a writer (for cat command).
    pub fn cat<W: Write>(&self, candidate: &str, writer: W) -> Result<u64> {
        self.lookup(candidate)?.copy_to(writer)
    }

    /// Delete a stored object by file name (`<digest><ext>`) or absolute path.
    ///
    /// Relative names resolve inside the shard named by their first two
    /// characters; absolute paths must point into a shard of this store.
    /// An emptied shard directory is removed as well.
    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.resolve(name)?;
        self.ensure_directories()?;
        self.delete_path(&path, name)
    }

    /// Delete the object stored under a digest.
    pub fn remove(&self, candidate: &str) -> Result<()> {
        let object = self.lookup(candidate)?;
        self.delete_path(&object.path, candidate)
    }

    fn delete_path(&self, path: &Path, name: &str) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(Error::not_found(name)),
            Err(e) if is_busy(&e) => {
                warn!(path = %path.display(), "Object still in use, not deleted");
                return Err(Error::resource_busy(path));
            }
            Err(e) => return Err(e.into()),
        }
        info!(path = %path.display(), "Deleted object");

        if let Some(shard) = path.parent() {
            remove_shard_if_empty(shard);
        }
        Ok(())
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let path = Path::new(name);
        if path.is_absolute() {
            let file_name = path
                .file_name()
                .and_then(OsStr::to_str)
                .ok_or_else(|| Error::invalid_digest(format!("No file name in {}", name)))?;
            let shard = path.parent();
            let root = std::path::absolute(&self.config.root)?;
            let in_store = shard.and_then(Path::parent) == Some(root.as_path())
                && shard.and_then(Path::file_name).and_then(OsStr::to_str)
                    == file_name.get(..2);
            if !in_store {
                return Err(Error::invalid_digest(format!(
                    "{} is not inside the store",
                    name
                )));
            }
            return Ok(path.to_path_buf());
        }

        let mut components = path.components();
        let single = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !single {
            return Err(Error::invalid_digest(format!(
                "{} is not a plain file name",
                name
            )));
        }

        let shard = self
            .shard_dir(name)
            .ok_or_else(|| Error::invalid_digest(format!("{} is too short", name)))?;
        Ok(shard.join(name))
    }
}

/// Rename `scratch` to `target`, creating `shard` first.
fn persist_into_shard(
    mut scratch: NamedTempFile,
    digest: &Digest,
    shard: &Path,
    target: &Path,
) -> Result<()> {
    let mut attempt = 1;
    loop {
        fs::create_dir_all(shard)?;
        match scratch.persist_noclobber(target) {
            Ok(_) => return Ok(()),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                debug!(path = %target.display(), "Lost relocation race");
                return Err(Error::duplicate_content(digest.as_str()));
            }
            Err(e)
                if e.error.kind() == io::ErrorKind::NotFound && attempt < RELOCATE_ATTEMPTS =>
            {
                debug!(shard = %shard.display(), attempt, "Shard vanished, retrying");
                scratch = e.file;
                attempt += 1;
            }
            Err(e) if e.error.kind() == io::ErrorKind::CrossesDevices => {
                debug!(shard = %shard.display(), "Scratch is on another device, copying");
                return copy_across_devices(e.file, digest, shard, target);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Copy `scratch` into a temp file inside `shard`, then rename that into place.
///
/// The final step is still a no-clobber rename within one filesystem.
fn copy_across_devices(
    mut scratch: NamedTempFile,
    digest: &Digest,
    shard: &Path,
    target: &Path,
) -> Result<()> {
    let mut staged = NamedTempFile::new_in(shard)?;
    scratch.seek(SeekFrom::Start(0))?;
    io::copy(&mut scratch, &mut staged)?;
    staged.flush()?;
    staged.as_file().sync_all()?;

    match staged.persist_noclobber(target) {
        Ok(_) => Ok(()),
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
            debug!(path = %target.display(), "Lost relocation race");
            Err(Error::duplicate_content(digest.as_str()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Read into `buf`, retrying on interruption. Returns 0 at end of stream.
fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    loop {
        match reader.read(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Remove a shard directory if it holds nothing.
///
/// Losing a race with a concurrent save (directory repopulated) or delete
/// (directory already gone) is fine.
fn remove_shard_if_empty(shard: &Path) {
    match fs::remove_dir(shard) {
        Ok(()) => debug!(shard = %shard.display(), "Removed empty shard"),
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::DirectoryNotEmpty
                    | io::ErrorKind::NotFound
                    | io::ErrorKind::AlreadyExists
            ) => {}
        Err(e) => warn!(shard = %shard.display(), error = %e, "Failed to remove shard"),
    }
}

/// Whether a removal failed because another handle still holds the file.
fn is_busy(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::ResourceBusy {
        return true;
    }
    // ERROR_SHARING_VIOLATION / access denied while a handle is open.
    #[cfg(windows)]
    {
        matches!(err.raw_os_error(), Some(32))
            || err.kind() == io::ErrorKind::PermissionDenied
    }
    #[cfg(not(windows))]
    {
        false
    }
}
