//! Paged file layer: disk files plus an in-memory page cache.
//!
//! `PagedFiles` owns both halves of the PF layer:
//! - a file manager that creates, opens, closes, and destroys regular files,
//!   enforcing that each path is open at most once at a time, and
//! - a page cache handing out mutable page buffers keyed by (file, page),
//!   evicting least-recently-used frames with write-back of dirty buffers.
//!
//! Callers borrow a [`Frame`] for the duration of one call and must not keep
//! pointers into it across calls: any later fetch may evict the frame. A
//! mutated buffer is only guaranteed on disk after an explicit flush or after
//! the frame is evicted.


use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use ahash::RandomState;
use common::{DbError, DbResult, FileId, PAGE_SIZE};
use hashbrown::HashMap;
use lru::LruCache;
use tracing::debug;

type Map<K, V> = HashMap<K, V, RandomState>;

/// Default number of frames in the page cache. Large enough that functional
/// tests never evict; eviction tests shrink the pool via [`PagedFiles::with_capacity`].
pub const NUM_FRAMES: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct PageKey {
    file: FileId,
    page_no: i32,
}

/// A cache slot owning one page-sized buffer plus its dirty bit.
#[derive(Debug)]
pub struct Frame {
    data: Box<[u8]>,
    dirty: bool,
}

impl Frame {
    fn new() -> Self {
        Self {
            data: vec![0u8; PAGE_SIZE].into_boxed_slice(),
            dirty: false,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable view of the page buffer. Mutating through it does not flag the
    /// frame; callers that write must also call [`Frame::mark_dirty`].
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

#[derive(Debug)]
struct OpenFile {
    file: File,
    path: PathBuf,
}

/// Returns true if `path` names an existing regular file.
pub fn is_file(path: &Path) -> bool {
    path.is_file()
}

/// The PF layer: file manager plus LRU page cache.
#[derive(Debug)]
pub struct PagedFiles {
    files: Map<FileId, OpenFile>,
    paths: Map<PathBuf, FileId>,
    next_file_id: u32,
    cache: LruCache<PageKey, Frame>,
}

impl PagedFiles {
    pub fn new() -> Self {
        Self::with_capacity(NUM_FRAMES)
    }

    /// A pool with a custom frame count, for eviction tests.
    pub fn with_capacity(frames: usize) -> Self {
        assert!(frames > 0, "frame pool must not be empty");
        Self {
            files: Map::default(),
            paths: Map::default(),
            next_file_id: 0,
            cache: LruCache::new(NonZeroUsize::new(frames).unwrap()),
        }
    }

    /// Create an empty regular file at `path`.
    pub fn create_file(&self, path: &Path) -> DbResult<()> {
        if is_file(path) {
            return Err(DbError::FileExists(path.to_path_buf()));
        }
        File::create(path)?;
        debug!(path = %path.display(), "created file");
        Ok(())
    }

    /// Remove `path` from disk. Fails if the file is currently open.
    pub fn destroy_file(&self, path: &Path) -> DbResult<()> {
        if !is_file(path) {
            return Err(DbError::FileNotFound(path.to_path_buf()));
        }
        if self.paths.contains_key(path) {
            return Err(DbError::FileNotClosed(path.to_path_buf()));
        }
        std::fs::remove_file(path)?;
        Ok(())
    }

    /// Open `path` and return its handle. A path may be open at most once.
    pub fn open_file(&mut self, path: &Path) -> DbResult<FileId> {
        if !is_file(path) {
            return Err(DbError::FileNotFound(path.to_path_buf()));
        }
        if self.paths.contains_key(path) {
            return Err(DbError::FileNotClosed(path.to_path_buf()));
        }
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let fid = FileId(self.next_file_id);
        self.next_file_id += 1;
        self.files.insert(
            fid,
            OpenFile {
                file,
                path: path.to_path_buf(),
            },
        );
        self.paths.insert(path.to_path_buf(), fid);
        Ok(fid)
    }

    /// Flush every cached page of the file, then release the handle.
    pub fn close_file(&mut self, fid: FileId) -> DbResult<()> {
        if !self.files.contains_key(&fid) {
            return Err(DbError::FileNotOpen(fid.0));
        }
        self.flush_file(fid)?;
        let open = self.files.remove(&fid).unwrap();
        self.paths.remove(&open.path);
        Ok(())
    }

    /// Return a frame for a page that does not yet exist on disk. The buffer
    /// starts zeroed and the frame is born dirty.
    pub fn create_page(&mut self, fid: FileId, page_no: i32) -> DbResult<&mut Frame> {
        let key = PageKey { file: fid, page_no };
        debug_assert!(!self.cache.contains(&key), "create of a cached page");
        if !self.files.contains_key(&fid) {
            return Err(DbError::FileNotOpen(fid.0));
        }
        self.evict_if_needed()?;
        let mut frame = Frame::new();
        frame.dirty = true;
        self.cache.put(key, frame);
        Ok(self.cache.get_mut(&key).unwrap())
    }

    /// Return a frame whose buffer reflects the disk page, reading it on a
    /// cache miss. Every fetch touches the LRU order.
    pub fn fetch_page(&mut self, fid: FileId, page_no: i32) -> DbResult<&mut Frame> {
        let key = PageKey { file: fid, page_no };
        if self.cache.contains(&key) {
            // get_mut promotes the frame to most-recently-used
            return Ok(self.cache.get_mut(&key).unwrap());
        }
        let mut frame = Frame::new();
        {
            let open = self.files.get(&fid).ok_or(DbError::FileNotOpen(fid.0))?;
            positional_read(&open.file, page_no, &mut frame.data)?;
        }
        self.evict_if_needed()?;
        self.cache.put(key, frame);
        Ok(self.cache.get_mut(&key).unwrap())
    }

    /// Write the page back if dirty, then return its frame to the free pool.
    pub fn flush_page(&mut self, fid: FileId, page_no: i32) -> DbResult<()> {
        let key = PageKey { file: fid, page_no };
        if let Some(frame) = self.cache.pop(&key) {
            self.write_back(key, &frame)?;
        }
        Ok(())
    }

    /// Flush every cached page belonging to `fid`.
    pub fn flush_file(&mut self, fid: FileId) -> DbResult<()> {
        let keys: Vec<PageKey> = self
            .cache
            .iter()
            .map(|(k, _)| *k)
            .filter(|k| k.file == fid)
            .collect();
        for key in keys {
            let frame = self.cache.pop(&key).unwrap();
            self.write_back(key, &frame)?;
        }
        Ok(())
    }

    /// Flush every cached page of every open file.
    pub fn flush_all(&mut self) -> DbResult<()> {
        while let Some((key, frame)) = self.cache.pop_lru() {
            self.write_back(key, &frame)?;
        }
        Ok(())
    }

    /// Unbuffered positional read, used for file-header pages. Reads exactly
    /// `buf.len()` bytes; a short read is an I/O error.
    pub fn read_page(&self, fid: FileId, page_no: i32, buf: &mut [u8]) -> DbResult<()> {
        let open = self.files.get(&fid).ok_or(DbError::FileNotOpen(fid.0))?;
        positional_read(&open.file, page_no, buf)
    }

    /// Unbuffered positional write, used for file-header pages.
    pub fn write_page(&self, fid: FileId, page_no: i32, buf: &[u8]) -> DbResult<()> {
        let open = self.files.get(&fid).ok_or(DbError::FileNotOpen(fid.0))?;
        positional_write(&open.file, page_no, buf)
    }

    /// Number of frames currently caching a page.
    pub fn busy_frames(&self) -> usize {
        self.cache.len()
    }

    /// Number of frames on the free list.
    pub fn free_frames(&self) -> usize {
        self.cache.cap().get() - self.cache.len()
    }

    pub fn is_cached(&self, fid: FileId, page_no: i32) -> bool {
        self.cache.contains(&PageKey { file: fid, page_no })
    }

    fn evict_if_needed(&mut self) -> DbResult<()> {
        if self.cache.len() < self.cache.cap().get() {
            return Ok(());
        }
        if let Some((key, frame)) = self.cache.pop_lru() {
            debug!(
                file = key.file.0,
                page = key.page_no,
                dirty = frame.dirty,
                "evicting page"
            );
            self.write_back(key, &frame)?;
        }
        Ok(())
    }

    fn write_back(&self, key: PageKey, frame: &Frame) -> DbResult<()> {
        if frame.dirty {
            let open = self
                .files
                .get(&key.file)
                .ok_or(DbError::FileNotOpen(key.file.0))?;
            positional_write(&open.file, key.page_no, &frame.data)?;
        }
        Ok(())
    }
}

impl Default for PagedFiles {
    fn default() -> Self {
        Self::new()
    }
}

fn positional_read(mut file: &File, page_no: i32, buf: &mut [u8]) -> DbResult<()> {
    file.seek(SeekFrom::Start(page_no as u64 * PAGE_SIZE as u64))?;
    file.read_exact(buf)?;
    Ok(())
}

fn positional_write(mut file: &File, page_no: i32, buf: &[u8]) -> DbResult<()> {
    file.seek(SeekFrom::Start(page_no as u64 * PAGE_SIZE as u64))?;
    file.write_all(buf)?;
    Ok(())
}
