use std::fs::{self, File};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use bytes::Bytes;
use fs4::FileExt;
use log::warn;
use walkdir::WalkDir;

use super::{ByteRange, ListableStore, NodeKey, NodeName, Store};

/// Store backed by a directory tree, one file per key.
pub struct FileSystemStore {
    base_path: PathBuf,
}

impl FileSystemStore {
    /// Does not check or modify path.
    pub fn new_unchecked(path: PathBuf) -> Self {
        Self { base_path: path }
    }

    /// Canonicalizes path and checks that it is an extant directory.
    pub fn open(path: PathBuf) -> io::Result<Self> {
        let base_path = path.canonicalize()?;
        if fs::metadata(&base_path)?.is_file() {
            Err(io::Error::new(
                ErrorKind::Other,
                "Path exists, but it is a file",
            ))
        } else {
            Ok(Self { base_path })
        }
    }

    /// Creates the base directory, which must not exist yet.
    pub fn create(path: PathBuf, parents: bool) -> io::Result<Self> {
        if path.exists() {
            return Err(io::Error::new(ErrorKind::AlreadyExists, "Already exists"));
        } else if parents {
            fs::create_dir_all(&path)?;
        } else {
            fs::create_dir(&path)?;
        }
        Ok(Self {
            base_path: path.canonicalize()?,
        })
    }

    fn get_path(&self, key: &NodeKey) -> PathBuf {
        let mut p = self.base_path.clone();
        for k in key.as_slice().iter() {
            p.push(k.as_ref());
        }
        p
    }

    /// Shared-locked reader for the key's file.
    ///
    /// Missing files and directories read as absent.
    fn file_reader(&self, key: &NodeKey) -> io::Result<Option<File>> {
        let target = self.get_path(key);
        match File::open(target) {
            Ok(f) => {
                if f.metadata()?.is_dir() {
                    return Ok(None);
                }
                f.lock_shared()?;
                Ok(Some(f))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Store for FileSystemStore {
    fn get(&self, key: &NodeKey) -> io::Result<Option<Bytes>> {
        let Some(mut f) = self.file_reader(key)? else {
            return Ok(None);
        };
        let mut buf = Vec::default();
        f.read_to_end(&mut buf)?;
        Ok(Some(buf.into()))
    }

    fn get_range(&self, key: &NodeKey, range: ByteRange) -> io::Result<Option<Bytes>> {
        let Some(mut f) = self.file_reader(key)? else {
            return Ok(None);
        };
        let len = f.metadata()?.len() as usize;
        let (start, end) = range.to_bounds(len);
        f.seek(SeekFrom::Start(start as u64))?;
        let mut buf = vec![0; end - start];
        f.read_exact(&mut buf)?;
        Ok(Some(buf.into()))
    }

    fn set(&self, key: &NodeKey, value: Bytes) -> io::Result<()> {
        let path = self.get_path(key);
        if !key.is_root() {
            let parent = path.parent().expect("key is filesystem root");
            fs::create_dir_all(parent)?;
        }

        let mut f = fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(path)?;
        f.lock_exclusive()?;
        f.write_all(&value)
    }

    fn set_range(&self, key: &NodeKey, offset: u64, value: Bytes) -> io::Result<()> {
        let path = self.get_path(key);
        let mut f = fs::OpenOptions::new().read(true).write(true).open(path)?;
        f.lock_exclusive()?;
        if f.metadata()?.len() < offset + value.len() as u64 {
            return Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                "object is too short for positional overwrite",
            ));
        }
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(&value)
    }

    fn erase(&self, key: &NodeKey) -> io::Result<()> {
        let path = self.get_path(key);

        match File::open(&path) {
            Ok(f) => {
                f.lock_exclusive()?;
                fs::remove_file(&path)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn exists(&self, key: &NodeKey) -> io::Result<bool> {
        Ok(self.get_path(key).is_file())
    }
}

impl ListableStore for FileSystemStore {
    fn list_dir(&self, prefix: &NodeKey) -> io::Result<(Vec<NodeKey>, Vec<NodeKey>)> {
        // Directories are not prefixes unless there is a file somewhere
        // beneath them, which may be inconsistent with other backends.
        let mut keys = Vec::default();
        let mut prefixes = Vec::default();

        let target = self.get_path(prefix);
        let listing = match fs::read_dir(target) {
            Ok(l) => l,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok((keys, prefixes)),
            Err(e) => return Err(e),
        };
        for maybe_file in listing {
            let file = maybe_file?;
            let fname = file.file_name();
            let Some(name) = fname.to_str() else {
                warn!("Skipping node with non-UTF8 name: {:?}", fname);
                continue;
            };
            let Ok(n) = name.parse::<NodeName>() else {
                continue;
            };
            let mut key = prefix.clone();
            key.push(n);

            if fs::metadata(file.path())?.is_file() {
                keys.push(key);
            } else {
                prefixes.push(key);
            }
        }

        Ok((keys, prefixes))
    }

    fn erase_prefix(&self, prefix: &NodeKey) -> io::Result<()> {
        let path = self.get_path(prefix);

        if path.exists() {
            for entry in WalkDir::new(&path).contents_first(true) {
                let entry = entry?;

                if entry.file_type().is_dir() {
                    fs::remove_dir(entry.path())?;
                } else {
                    let file = File::open(entry.path())?;
                    file.lock_exclusive()?;
                    fs::remove_file(entry.path())?;
                }
            }
        }

        Ok(())
    }
}
