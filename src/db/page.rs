use crate::db::error::StoreError;

/// The unit of heap-file I/O.
pub(crate) const PAGE_SIZE: usize = 4096;

/// Page header: u16-LE record count, u16-LE free-space offset.
const HEADER_SIZE: usize = 4;
/// Slot: u32-LE record start, u32-LE record length.
const SLOT_SIZE: usize = 8;

/// A 4096-byte slotted page.
///
/// The slot directory grows upward from offset 4 and record payloads grow
/// downward from offset 4096; the free region is the single gap between
/// them. Payloads stay contiguous across every mutation: deletes and
/// resizing updates shift the packed block of later-appended payloads
/// instead of leaving holes. Slot ids are dense — deleting a slot shifts
/// the ids of the slots after it down by one.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SlottedPage {
    data: Vec<u8>,
    slots: Vec<(u32, u32)>,
}

impl SlottedPage {
    pub(crate) fn new() -> Self {
        SlottedPage {
            data: vec![0; PAGE_SIZE],
            slots: Vec::new(),
        }
    }

    /// Parse a page image. Short images (a trailing partial read) are
    /// zero-padded to the full page size.
    pub(crate) fn load(bytes: &[u8]) -> Result<Self, StoreError> {
        let mut data = vec![0; PAGE_SIZE];
        let n = bytes.len().min(PAGE_SIZE);
        data[..n].copy_from_slice(&bytes[..n]);

        let record_count = u16::from_le_bytes([data[0], data[1]]) as usize;
        if HEADER_SIZE + record_count * SLOT_SIZE > PAGE_SIZE {
            return Err(StoreError::DecodeFailure(format!(
                "slot directory of {record_count} records does not fit a page"
            )));
        }

        let mut slots = Vec::with_capacity(record_count);
        for i in 0..record_count {
            let off = HEADER_SIZE + i * SLOT_SIZE;
            let start = u32::from_le_bytes(data[off..off + 4].try_into().unwrap());
            let len = u32::from_le_bytes(data[off + 4..off + 8].try_into().unwrap());
            if (start as usize) < HEADER_SIZE || start as usize + len as usize > PAGE_SIZE {
                return Err(StoreError::DecodeFailure(format!(
                    "slot {i} points outside the page ({start}+{len})"
                )));
            }
            slots.push((start, len));
        }

        Ok(SlottedPage { data, slots })
    }

    pub(crate) fn record_count(&self) -> u16 {
        self.slots.len() as u16
    }

    /// One past the last used byte of the slot directory.
    pub(crate) fn free_space_offset(&self) -> usize {
        HEADER_SIZE + self.slots.len() * SLOT_SIZE
    }

    /// The downward-growing payload boundary: the smallest payload start,
    /// or the page end when the page is empty.
    pub(crate) fn free_record_offset(&self) -> usize {
        self.slots
            .iter()
            .map(|&(start, _)| start as usize)
            .min()
            .unwrap_or(PAGE_SIZE)
    }

    /// Append a record, returning its slot id.
    pub(crate) fn append(&mut self, record: &[u8]) -> Result<u16, StoreError> {
        let len = record.len();
        let free_record = self.free_record_offset();

        // room is needed for the payload and for one more slot
        if len + SLOT_SIZE > free_record.saturating_sub(self.free_space_offset()) {
            return Err(StoreError::PageFull(len));
        }

        let start = free_record - len;
        self.data[start..free_record].copy_from_slice(record);
        self.slots.push((start as u32, len as u32));
        Ok((self.slots.len() - 1) as u16)
    }

    pub(crate) fn get(&self, slot: u16) -> Result<&[u8], StoreError> {
        let &(start, len) = self.slots.get(slot as usize).ok_or(StoreError::SlotOutOfRange {
            slot,
            count: self.record_count(),
        })?;
        Ok(&self.data[start as usize..(start + len) as usize])
    }

    /// Overwrite the record at `slot`. Same-length updates happen in place;
    /// a resize keeps the record's end offset fixed and shifts the packed
    /// block of payloads below it (every slot with a smaller start) by the
    /// length delta. A grow that would run into the slot directory fails
    /// and leaves the page unchanged.
    pub(crate) fn update(&mut self, slot: u16, record: &[u8]) -> Result<(), StoreError> {
        let &(start, len) = self.slots.get(slot as usize).ok_or(StoreError::SlotOutOfRange {
            slot,
            count: self.record_count(),
        })?;
        let (old_start, old_len) = (start as usize, len as usize);
        let new_len = record.len();

        if new_len == old_len {
            self.data[old_start..old_start + new_len].copy_from_slice(record);
            return Ok(());
        }

        let old_end = old_start + old_len;
        let free_record = self.free_record_offset();

        let new_start = if new_len > old_len {
            let delta = new_len - old_len;
            if free_record < delta || free_record - delta < self.free_space_offset() {
                return Err(StoreError::PageFull(new_len));
            }
            self.data.copy_within(free_record..old_start, free_record - delta);
            for s in &mut self.slots {
                if (s.0 as usize) < old_start {
                    s.0 -= delta as u32;
                }
            }
            old_start - delta
        } else {
            let delta = old_len - new_len;
            self.data.copy_within(free_record..old_start, free_record + delta);
            for s in &mut self.slots {
                if (s.0 as usize) < old_start {
                    s.0 += delta as u32;
                }
            }
            old_start + delta
        };

        self.data[new_start..old_end].copy_from_slice(record);
        self.slots[slot as usize] = (new_start as u32, new_len as u32);
        Ok(())
    }

    /// Remove the record at `slot`, closing the payload hole and compacting
    /// the slot directory. Later slot ids shift down by one.
    pub(crate) fn delete(&mut self, slot: u16) -> Result<(), StoreError> {
        let &(start, len) = self.slots.get(slot as usize).ok_or(StoreError::SlotOutOfRange {
            slot,
            count: self.record_count(),
        })?;
        let (start, len) = (start as usize, len as usize);

        let free_record = self.free_record_offset();
        self.data.copy_within(free_record..start, free_record + len);
        for s in &mut self.slots {
            if (s.0 as usize) < start {
                s.0 += len as u32;
            }
        }
        self.slots.remove(slot as usize);
        Ok(())
    }

    /// Produce the full on-disk page image with a current header and slot
    /// directory.
    pub(crate) fn serialize(&self) -> Vec<u8> {
        let mut out = self.data.clone();
        out[0..2].copy_from_slice(&(self.slots.len() as u16).to_le_bytes());
        out[2..4].copy_from_slice(&(self.free_space_offset() as u16).to_le_bytes());
        for (i, &(start, len)) in self.slots.iter().enumerate() {
            let off = HEADER_SIZE + i * SLOT_SIZE;
            out[off..off + 4].copy_from_slice(&start.to_le_bytes());
            out[off + 4..off + 8].copy_from_slice(&len.to_le_bytes());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Structural invariants every mutation must preserve.
    fn check_invariants(page: &SlottedPage) {
        let min_start = page.free_record_offset();
        assert!(page.free_space_offset() <= min_start, "directory overlaps payloads");

        let mut spans: Vec<(usize, usize)> = page
            .slots
            .iter()
            .map(|&(s, l)| (s as usize, s as usize + l as usize))
            .collect();
        for &(start, end) in &spans {
            assert!(start >= HEADER_SIZE && end <= PAGE_SIZE, "slot out of bounds");
        }
        spans.sort();
        for pair in spans.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "payloads overlap");
        }
        // payloads are contiguous from free_record_offset to the page end
        let used: usize = page.slots.iter().map(|&(_, l)| l as usize).sum();
        assert_eq!(min_start + used, PAGE_SIZE, "payload region has holes");
    }

    #[test]
    fn append_and_get() {
        let mut page = SlottedPage::new();
        let a = page.append(b"first record").unwrap();
        let b = page.append(b"second").unwrap();
        assert_eq!((a, b), (0, 1));
        assert_eq!(page.get(0).unwrap(), b"first record");
        assert_eq!(page.get(1).unwrap(), b"second");
        assert_eq!(page.record_count(), 2);
        check_invariants(&page);
    }

    #[test]
    fn get_out_of_range() {
        let page = SlottedPage::new();
        assert_eq!(
            page.get(0).unwrap_err(),
            StoreError::SlotOutOfRange { slot: 0, count: 0 }
        );
    }

    #[test]
    fn fills_up_then_rejects() {
        let mut page = SlottedPage::new();
        let record = [0xAB; 100];
        let mut appended = 0;
        loop {
            match page.append(&record) {
                Ok(_) => appended += 1,
                Err(StoreError::PageFull(100)) => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        // 108 bytes per record (payload + slot) in 4092 usable bytes
        assert_eq!(appended, 37);
        check_invariants(&page);
    }

    #[test]
    fn update_same_length_in_place() {
        let mut page = SlottedPage::new();
        page.append(b"aaaa").unwrap();
        page.append(b"bbbb").unwrap();
        page.update(0, b"cccc").unwrap();
        assert_eq!(page.get(0).unwrap(), b"cccc");
        assert_eq!(page.get(1).unwrap(), b"bbbb");
        check_invariants(&page);
    }

    #[test]
    fn update_grows_record() {
        let mut page = SlottedPage::new();
        page.append(b"short").unwrap();
        page.append(b"other-1").unwrap();
        page.append(b"other-2").unwrap();
        page.update(0, b"a much longer record").unwrap();
        assert_eq!(page.get(0).unwrap(), b"a much longer record");
        assert_eq!(page.get(1).unwrap(), b"other-1");
        assert_eq!(page.get(2).unwrap(), b"other-2");
        check_invariants(&page);
    }

    #[test]
    fn update_shrinks_record() {
        let mut page = SlottedPage::new();
        page.append(b"the original long one").unwrap();
        page.append(b"neighbour").unwrap();
        page.update(0, b"tiny").unwrap();
        assert_eq!(page.get(0).unwrap(), b"tiny");
        assert_eq!(page.get(1).unwrap(), b"neighbour");
        check_invariants(&page);
    }

    #[test]
    fn failed_grow_leaves_page_unchanged() {
        let mut page = SlottedPage::new();
        page.append(&[1; 2000]).unwrap();
        page.append(&[2; 2000]).unwrap();
        let before = page.serialize();
        let e = page.update(0, &[3; 2100]).unwrap_err();
        assert_eq!(e, StoreError::PageFull(2100));
        assert_eq!(page.serialize(), before);
    }

    #[test]
    fn delete_compacts_directory_and_payloads() {
        let mut page = SlottedPage::new();
        page.append(b"one").unwrap();
        page.append(b"two").unwrap();
        page.append(b"three").unwrap();
        page.delete(1).unwrap();
        assert_eq!(page.record_count(), 2);
        assert_eq!(page.get(0).unwrap(), b"one");
        assert_eq!(page.get(1).unwrap(), b"three");
        check_invariants(&page);
    }

    #[test]
    fn serialize_load_round_trip() {
        let mut page = SlottedPage::new();
        page.append(b"persisted").unwrap();
        page.append(b"records").unwrap();
        page.delete(0).unwrap();

        let image = page.serialize();
        assert_eq!(image.len(), PAGE_SIZE);
        let loaded = SlottedPage::load(&image).unwrap();
        assert_eq!(loaded.record_count(), 1);
        assert_eq!(loaded.get(0).unwrap(), b"records");
        check_invariants(&loaded);
    }

    #[test]
    fn load_pads_short_images() {
        let page = SlottedPage::load(&[0u8; 100]).unwrap();
        assert_eq!(page.record_count(), 0);
    }

    #[test]
    fn load_rejects_corrupt_directory() {
        let mut image = vec![0u8; PAGE_SIZE];
        image[0..2].copy_from_slice(&1u16.to_le_bytes());
        // slot 0 points past the page end
        image[4..8].copy_from_slice(&4000u32.to_le_bytes());
        image[8..12].copy_from_slice(&500u32.to_le_bytes());
        assert!(matches!(
            SlottedPage::load(&image),
            Err(StoreError::DecodeFailure(_))
        ));
    }
}
