use std::{
    fs::{File, OpenOptions},
    io::{BufRead, BufReader, Seek, SeekFrom, Write},
    path::PathBuf,
};

use thiserror::Error;

#[derive(Error, Debug)]
/// Errors raised by a [`PersistentStore`]
pub enum StoreError {
    #[error("Store I/O error on {name}: {source}")]
    /// A file could not be opened, read or written
    Io {
        /// File name within the store
        name: String,
        /// Underlying error
        source: std::io::Error,
    },
}

/// Flat, line-oriented file store.
///
/// Single writer, single reader, sequential access only.
pub trait PersistentStore {
    /// True if `name` exists
    fn exists(&self, name: &str) -> bool;
    /// First line of `name`, without its terminator; `None` if the file is missing or empty
    fn read_line(&mut self, name: &str) -> Result<Option<String>, StoreError>;
    /// Truncate `name` and write `line` as its only content
    fn write_line(&mut self, name: &str, line: &str) -> Result<(), StoreError>;
    /// Append `line` to `name`, creating it if needed
    fn append_line(&mut self, name: &str, line: &str) -> Result<(), StoreError>;
}

/// [`PersistentStore`] rooted at a directory of the host filesystem
#[derive(Debug, Clone)]
pub struct FsStore {
    root_dir: PathBuf,
}

impl FsStore {
    /// Use `root_dir` for all files, creating it if needed
    pub fn new(root_dir: impl Into<PathBuf>) -> Result<Self, std::io::Error> {
        let root_dir = root_dir.into();
        std::fs::create_dir_all(&root_dir)?;
        Ok(Self { root_dir })
    }

    /// Directory backing the store
    pub fn root_dir(&self) -> &PathBuf {
        &self.root_dir
    }
}

fn io_err(name: &str) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        name: name.to_string(),
        source,
    }
}

impl PersistentStore for FsStore {
    fn exists(&self, name: &str) -> bool {
        self.root_dir.join(name).is_file()
    }

    fn read_line(&mut self, name: &str) -> Result<Option<String>, StoreError> {
        let path = self.root_dir.join(name);
        if !path.is_file() {
            return Ok(None);
        }
        let mut reader = BufReader::new(File::open(path).map_err(io_err(name))?);
        let mut line = String::new();
        if reader.read_line(&mut line).map_err(io_err(name))? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn write_line(&mut self, name: &str, line: &str) -> Result<(), StoreError> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.root_dir.join(name))
            .map_err(io_err(name))?;
        file.seek(SeekFrom::Start(0)).map_err(io_err(name))?;
        writeln!(file, "{line}").map_err(io_err(name))?;
        file.flush().map_err(io_err(name))
    }

    fn append_line(&mut self, name: &str, line: &str) -> Result<(), StoreError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root_dir.join(name))
            .map_err(io_err(name))?;
        writeln!(file, "{line}").map_err(io_err(name))?;
        file.flush().map_err(io_err(name))
    }
}

/// Overwrite the place-name cache with `place`
pub(crate) fn save_place_name<S: PersistentStore>(
    store: &mut S,
    file: &str,
    place: &str,
) -> Result<(), StoreError> {
    store.write_line(file, place)
}

/// Read the cached place name; an empty string means it was never written
pub(crate) fn load_place_name<S: PersistentStore>(
    store: &mut S,
    file: &str,
) -> Result<String, StoreError> {
    if !store.exists(file) {
        return Ok(String::new());
    }
    Ok(store
        .read_line(file)?
        .map(|line| line.trim().to_string())
        .unwrap_or_default())
}

#[cfg(test)]
mod test {
    #[test]
    fn cache_survives_a_new_store() {
        use super::*;
        use tempfile::tempdir;
        let dir = tempdir().unwrap();
        let mut st = FsStore::new(dir.path().join("data")).unwrap();
        assert_eq!(load_place_name(&mut st, "cache.txt").unwrap(), "");
        save_place_name(&mut st, "cache.txt", "Old Name, Somewhere Long").unwrap();
        save_place_name(&mut st, "cache.txt", " Patna, Bihar, India ").unwrap();
        let mut st2 = FsStore::new(dir.path().join("data")).unwrap();
        assert_eq!(
            load_place_name(&mut st2, "cache.txt").unwrap(),
            "Patna, Bihar, India"
        );
    }

    #[test]
    fn log_grows() {
        use super::*;
        use tempfile::tempdir;
        let dir = tempdir().unwrap();
        let mut st = FsStore::new(dir.path()).unwrap();
        assert!(!st.exists("log.txt"));
        st.append_line("log.txt", "a").unwrap();
        st.append_line("log.txt", "b").unwrap();
        assert!(st.exists("log.txt"));
        let text = std::fs::read_to_string(dir.path().join("log.txt")).unwrap();
        assert_eq!(text, "a\nb\n");
        assert_eq!(st.read_line("log.txt").unwrap().as_deref(), Some("a"));
    }

    #[test]
    fn empty_file_reads_as_none() {
        use super::*;
        use tempfile::tempdir;
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("cache.txt"), "").unwrap();
        let mut st = FsStore::new(dir.path()).unwrap();
        assert_eq!(st.read_line("cache.txt").unwrap(), None);
        assert_eq!(load_place_name(&mut st, "cache.txt").unwrap(), "");
    }
}
