use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::db::page::{SlottedPage, PAGE_SIZE};

/// Page-level I/O over one heap file.
///
/// A pager lives for the duration of a single storage-manager call; the
/// underlying handle is dropped when the call returns.
#[derive(Debug)]
pub(crate) struct Pager<T>
where
    T: Read + Write + Seek,
{
    file: T,
}

impl<T> Pager<T>
where
    T: Read + Write + Seek,
{
    pub(crate) fn new(file: T) -> Self {
        Self { file }
    }

    /// Number of pages in the file. A trailing partial page counts as a
    /// whole page, matching the zero-padding applied on read.
    pub(crate) fn page_count(&mut self) -> Result<u32> {
        let len = self.file.seek(SeekFrom::End(0)).context("seek file end")?;
        Ok(len.div_ceil(PAGE_SIZE as u64) as u32)
    }

    pub(crate) fn read_page(&mut self, num: u32) -> Result<SlottedPage> {
        self.file
            .seek(SeekFrom::Start(num as u64 * PAGE_SIZE as u64))
            .with_context(|| format!("seek page {num}"))?;

        let mut buf = vec![0; PAGE_SIZE];
        let mut filled = 0;
        while filled < PAGE_SIZE {
            let n = self
                .file
                .read(&mut buf[filled..])
                .with_context(|| format!("read page {num}"))?;
            if n == 0 {
                break; // short trailing page, the rest stays zeroed
            }
            filled += n;
        }

        Ok(SlottedPage::load(&buf)?)
    }

    pub(crate) fn write_page(&mut self, num: u32, page: &SlottedPage) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(num as u64 * PAGE_SIZE as u64))
            .with_context(|| format!("seek page {num}"))?;
        self.file
            .write_all(&page.serialize())
            .with_context(|| format!("write page {num}"))?;
        Ok(())
    }
}

impl Pager<File> {
    /// Open an existing heap file for reading and writing.
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("open heap file {}", path.display()))?;
        Ok(Self::new(file))
    }

    /// Shrink the file to exactly `pages` pages.
    pub(crate) fn truncate(&mut self, pages: u32) -> Result<()> {
        self.file
            .set_len(pages as u64 * PAGE_SIZE as u64)
            .with_context(|| format!("truncate heap file to {pages} pages"))?;
        self.file.flush().context("flush heap file")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn round_trips_pages_at_their_offsets() {
        let mut pager = Pager::new(Cursor::new(Vec::new()));

        let mut p0 = SlottedPage::new();
        p0.append(b"page zero").unwrap();
        let mut p1 = SlottedPage::new();
        p1.append(b"page one").unwrap();

        pager.write_page(0, &p0).unwrap();
        pager.write_page(1, &p1).unwrap();

        assert_eq!(pager.page_count().unwrap(), 2);
        assert_eq!(pager.read_page(0).unwrap().get(0).unwrap(), b"page zero");
        assert_eq!(pager.read_page(1).unwrap().get(0).unwrap(), b"page one");
    }

    #[test]
    fn empty_file_has_no_pages() {
        let mut pager = Pager::new(Cursor::new(Vec::new()));
        assert_eq!(pager.page_count().unwrap(), 0);
    }

    #[test]
    fn short_trailing_page_is_padded() {
        // half a page of zeros on disk still loads as an empty page
        let mut pager = Pager::new(Cursor::new(vec![0u8; PAGE_SIZE / 2]));
        assert_eq!(pager.page_count().unwrap(), 1);
        assert_eq!(pager.read_page(0).unwrap().record_count(), 0);
    }
}
