//! Record manager: a slotted-page heap of fixed-size records.
//!
//! A record file is a paged file whose page 0 holds the [`RecordFileHeader`]
//! and whose remaining pages each hold a small header, an occupancy bitmap,
//! and an array of `record_size`-byte slots. Pages with at least one vacant
//! slot are linked into a free-page chain headed by the file header, so
//! insertion never scans for space.

pub mod bitmap;


use bincode::config::{self, Config};
use bincode::serde::{decode_from_slice, encode_into_slice};
use common::{DbError, DbResult, FileId, Rid, NO_PAGE, PAGE_SIZE};
use pagefile::PagedFiles;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::Path;
use tracing::debug;

pub const FILE_HDR_PAGE: i32 = 0;
pub const FIRST_RECORD_PAGE: i32 = 1;
pub const MAX_RECORD_SIZE: i32 = 512;

const FILE_HDR_BYTES: usize = 20;
const PAGE_HDR_BYTES: usize = 8;

fn bincode_config() -> impl Config {
    config::legacy()
}

/// Persisted at file offset 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFileHeader {
    pub record_size: i32,
    pub num_pages: i32,
    pub num_records_per_page: i32,
    pub first_free_page: i32,
    pub bitmap_size: i32,
}

impl RecordFileHeader {
    fn bitmap_range(&self) -> Range<usize> {
        PAGE_HDR_BYTES..PAGE_HDR_BYTES + self.bitmap_size as usize
    }

    fn slot_range(&self, slot_no: i32) -> Range<usize> {
        let start =
            PAGE_HDR_BYTES + self.bitmap_size as usize + slot_no as usize * self.record_size as usize;
        start..start + self.record_size as usize
    }

    fn encode(&self) -> [u8; FILE_HDR_BYTES] {
        let mut buf = [0u8; FILE_HDR_BYTES];
        let written =
            encode_into_slice(self, &mut buf, bincode_config()).expect("record file header fits");
        debug_assert_eq!(written, FILE_HDR_BYTES);
        buf
    }

    fn decode(buf: &[u8]) -> DbResult<Self> {
        let (hdr, read) = decode_from_slice(buf, bincode_config())
            .map_err(|e| DbError::Internal(format!("bad record file header: {e}")))?;
        debug_assert_eq!(read, FILE_HDR_BYTES);
        Ok(hdr)
    }
}

/// Per-page header of a record page.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
struct RecordPageHeader {
    next_free_page: i32,
    num_records: i32,
}

impl RecordPageHeader {
    fn read(data: &[u8]) -> Self {
        let (hdr, read) = decode_from_slice(&data[..PAGE_HDR_BYTES], bincode_config())
            .expect("record page header decodes");
        debug_assert_eq!(read, PAGE_HDR_BYTES);
        hdr
    }

    fn write(&self, data: &mut [u8]) {
        let written = encode_into_slice(self, &mut data[..PAGE_HDR_BYTES], bincode_config())
            .expect("record page header fits");
        debug_assert_eq!(written, PAGE_HDR_BYTES);
    }
}

/// Handle for an open record file. The in-memory header is authoritative
/// while the handle is open and is written back on [`RecordFile::close`].
#[derive(Debug)]
pub struct RecordFile {
    fid: FileId,
    pub hdr: RecordFileHeader,
}

impl RecordFile {
    /// Create a record file for `record_size`-byte records.
    ///
    /// Picks the largest per-page record count satisfying
    /// `page_header + ceil(n/8) + n * record_size <= PAGE_SIZE`.
    pub fn create(pf: &mut PagedFiles, path: &Path, record_size: i32) -> DbResult<()> {
        if !(1..=MAX_RECORD_SIZE).contains(&record_size) {
            return Err(DbError::InvalidRecordSize(record_size));
        }
        pf.create_file(path)?;
        let fid = pf.open_file(path)?;

        let num_records_per_page = (bitmap::WIDTH * (PAGE_SIZE as i32 - 1 - PAGE_HDR_BYTES as i32)
            + 1)
            / (1 + record_size * bitmap::WIDTH);
        let hdr = RecordFileHeader {
            record_size,
            num_pages: 1,
            num_records_per_page,
            first_free_page: NO_PAGE,
            bitmap_size: (num_records_per_page + bitmap::WIDTH - 1) / bitmap::WIDTH,
        };
        pf.write_page(fid, FILE_HDR_PAGE, &hdr.encode())?;
        pf.close_file(fid)?;
        debug!(path = %path.display(), record_size, "created record file");
        Ok(())
    }

    pub fn open(pf: &mut PagedFiles, path: &Path) -> DbResult<Self> {
        let fid = pf.open_file(path)?;
        let mut buf = [0u8; FILE_HDR_BYTES];
        pf.read_page(fid, FILE_HDR_PAGE, &mut buf)?;
        Ok(Self {
            fid,
            hdr: RecordFileHeader::decode(&buf)?,
        })
    }

    /// Write the in-memory header back, then flush and release the file.
    pub fn close(self, pf: &mut PagedFiles) -> DbResult<()> {
        pf.write_page(self.fid, FILE_HDR_PAGE, &self.hdr.encode())?;
        pf.close_file(self.fid)
    }

    pub fn destroy(pf: &PagedFiles, path: &Path) -> DbResult<()> {
        pf.destroy_file(path)
    }

    pub fn fid(&self) -> FileId {
        self.fid
    }

    /// Bitmap test only: does `rid` address a live record?
    pub fn is_record(&self, pf: &mut PagedFiles, rid: Rid) -> DbResult<bool> {
        let frame = pf.fetch_page(self.fid, rid.page_no)?;
        Ok(bitmap::test(&frame.data()[self.hdr.bitmap_range()], rid.slot_no))
    }

    pub fn get_record(&self, pf: &mut PagedFiles, rid: Rid) -> DbResult<Vec<u8>> {
        let frame = pf.fetch_page(self.fid, rid.page_no)?;
        let data = frame.data();
        if !bitmap::test(&data[self.hdr.bitmap_range()], rid.slot_no) {
            return Err(DbError::RecordNotFound(rid.page_no, rid.slot_no));
        }
        Ok(data[self.hdr.slot_range(rid.slot_no)].to_vec())
    }

    /// Insert `buf` into the first vacant slot of the first free page,
    /// allocating a page when the chain is empty.
    pub fn insert_record(&mut self, pf: &mut PagedFiles, buf: &[u8]) -> DbResult<Rid> {
        debug_assert_eq!(buf.len(), self.hdr.record_size as usize);
        let page_no = self.grab_free_page(pf)?;

        let frame = pf.fetch_page(self.fid, page_no)?;
        let data = frame.data_mut();
        let slot_no = bitmap::first_bit(
            false,
            &data[self.hdr.bitmap_range()],
            self.hdr.num_records_per_page,
        );
        assert!(slot_no < self.hdr.num_records_per_page);

        bitmap::set(&mut data[self.hdr.bitmap_range()], slot_no);
        let mut page_hdr = RecordPageHeader::read(data);
        page_hdr.num_records += 1;
        page_hdr.write(data);
        data[self.hdr.slot_range(slot_no)].copy_from_slice(buf);
        frame.mark_dirty();

        if page_hdr.num_records == self.hdr.num_records_per_page {
            // Page just became full, unlink it from the chain head.
            self.hdr.first_free_page = page_hdr.next_free_page;
        }
        Ok(Rid::new(page_no, slot_no))
    }

    pub fn update_record(&self, pf: &mut PagedFiles, rid: Rid, buf: &[u8]) -> DbResult<()> {
        debug_assert_eq!(buf.len(), self.hdr.record_size as usize);
        let frame = pf.fetch_page(self.fid, rid.page_no)?;
        let data = frame.data_mut();
        if !bitmap::test(&data[self.hdr.bitmap_range()], rid.slot_no) {
            return Err(DbError::RecordNotFound(rid.page_no, rid.slot_no));
        }
        data[self.hdr.slot_range(rid.slot_no)].copy_from_slice(buf);
        frame.mark_dirty();
        Ok(())
    }

    pub fn delete_record(&mut self, pf: &mut PagedFiles, rid: Rid) -> DbResult<()> {
        let frame = pf.fetch_page(self.fid, rid.page_no)?;
        let data = frame.data_mut();
        if !bitmap::test(&data[self.hdr.bitmap_range()], rid.slot_no) {
            return Err(DbError::RecordNotFound(rid.page_no, rid.slot_no));
        }
        let mut page_hdr = RecordPageHeader::read(data);
        if page_hdr.num_records == self.hdr.num_records_per_page {
            // Was full, becomes available again: relink at the chain head.
            page_hdr.next_free_page = self.hdr.first_free_page;
            self.hdr.first_free_page = rid.page_no;
        }
        bitmap::reset(&mut data[self.hdr.bitmap_range()], rid.slot_no);
        page_hdr.num_records -= 1;
        page_hdr.write(data);
        frame.mark_dirty();
        Ok(())
    }

    /// Page number of a page with at least one vacant slot.
    fn grab_free_page(&mut self, pf: &mut PagedFiles) -> DbResult<i32> {
        if self.hdr.first_free_page != NO_PAGE {
            return Ok(self.hdr.first_free_page);
        }
        let page_no = self.hdr.num_pages;
        let frame = pf.create_page(self.fid, page_no)?;
        let data = frame.data_mut();
        RecordPageHeader {
            next_free_page: NO_PAGE,
            num_records: 0,
        }
        .write(data);
        bitmap::init(&mut data[self.hdr.bitmap_range()]);
        self.hdr.num_pages += 1;
        self.hdr.first_free_page = page_no;
        Ok(page_no)
    }
}

/// Forward iterator over the live records of a record file.
///
/// Starts just before the first slot of page 1 and advances bitmap-bit by
/// bitmap-bit; the end state is `page_no == NO_PAGE`.
#[derive(Debug)]
pub struct RmScan {
    fid: FileId,
    hdr: RecordFileHeader,
    rid: Rid,
}

impl RmScan {
    pub fn new(pf: &mut PagedFiles, fh: &RecordFile) -> DbResult<Self> {
        let mut scan = Self {
            fid: fh.fid,
            hdr: fh.hdr,
            rid: Rid::new(FIRST_RECORD_PAGE, -1),
        };
        scan.advance(pf)?;
        Ok(scan)
    }

    pub fn next(&mut self, pf: &mut PagedFiles) -> DbResult<()> {
        debug_assert!(!self.is_end());
        self.advance(pf)
    }

    pub fn is_end(&self) -> bool {
        self.rid.page_no == NO_PAGE
    }

    pub fn rid(&self) -> Rid {
        self.rid
    }

    fn advance(&mut self, pf: &mut PagedFiles) -> DbResult<()> {
        while self.rid.page_no < self.hdr.num_pages {
            let frame = pf.fetch_page(self.fid, self.rid.page_no)?;
            let bm = &frame.data()[self.hdr.bitmap_range()];
            self.rid.slot_no = bitmap::next_bit(
                true,
                bm,
                self.hdr.num_records_per_page,
                self.rid.slot_no,
            );
            if self.rid.slot_no < self.hdr.num_records_per_page {
                return Ok(());
            }
            self.rid.slot_no = -1;
            self.rid.page_no += 1;
        }
        self.rid.page_no = NO_PAGE;
        Ok(())
    }
}
