use crate::{
    common::{PageID, TransactionID, RID},
    error::{Error, Result},
    record::Record,
};

/// Geometry shared by every page of one heap file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    pub page_size: usize,
    pub record_width: usize,
}

impl PageLayout {
    pub fn new(page_size: usize, record_width: usize) -> Result<Self> {
        let layout = Self {
            page_size,
            record_width,
        };
        if record_width == 0 || layout.slot_count() == 0 {
            return Err(Error::invalid_state(format!(
                "a {}-byte record does not fit in a {}-byte page",
                record_width, page_size
            )));
        }
        Ok(layout)
    }
    /// Each slot costs `record_width` bytes plus one header bit.
    pub fn slot_count(&self) -> usize {
        (self.page_size * 8) / (self.record_width * 8 + 1)
    }
    pub fn header_size(&self) -> usize {
        (self.slot_count() + 7) / 8
    }
    pub fn empty_page_data(&self) -> Box<[u8]> {
        vec![0u8; self.page_size].into_boxed_slice()
    }
    fn slot_offset(&self, slot: usize) -> usize {
        self.header_size() + slot * self.record_width
    }
}

/// In-memory image of one heap page: a bitmap header with one bit per slot,
/// followed by the fixed-width slots.
#[derive(Debug, Clone)]
pub struct HeapPage {
    page_id: PageID,
    layout: PageLayout,
    data: Box<[u8]>,
    dirtied_by: Option<TransactionID>,
}

impl HeapPage {
    pub fn new(page_id: PageID, layout: PageLayout) -> Self {
        Self {
            page_id,
            layout,
            data: layout.empty_page_data(),
            dirtied_by: None,
        }
    }
    pub fn from_data(page_id: PageID, layout: PageLayout, data: Box<[u8]>) -> Result<Self> {
        if data.len() != layout.page_size {
            return Err(Error::invalid_state(format!(
                "page {} has {} bytes, expected {}",
                page_id,
                data.len(),
                layout.page_size
            )));
        }
        Ok(Self {
            page_id,
            layout,
            data,
            dirtied_by: None,
        })
    }
    pub fn page_id(&self) -> PageID {
        self.page_id
    }
    pub fn layout(&self) -> PageLayout {
        self.layout
    }
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn mark_dirty(&mut self, txn_id: TransactionID) {
        self.dirtied_by = Some(txn_id);
    }
    pub fn mark_clean(&mut self) {
        self.dirtied_by = None;
    }
    pub fn dirtied_by(&self) -> Option<TransactionID> {
        self.dirtied_by
    }
    pub fn is_dirty(&self) -> bool {
        self.dirtied_by.is_some()
    }

    pub fn slot_count(&self) -> usize {
        self.layout.slot_count()
    }
    pub fn is_slot_used(&self, slot: usize) -> bool {
        slot < self.slot_count() && self.data[slot / 8] & (1 << (slot % 8)) != 0
    }
    fn set_slot_used(&mut self, slot: usize, used: bool) {
        if used {
            self.data[slot / 8] |= 1 << (slot % 8);
        } else {
            self.data[slot / 8] &= !(1 << (slot % 8));
        }
    }
    pub fn empty_slot_count(&self) -> usize {
        (0..self.slot_count())
            .filter(|&slot| !self.is_slot_used(slot))
            .count()
    }
    pub fn has_empty_slot(&self) -> bool {
        (0..self.slot_count()).any(|slot| !self.is_slot_used(slot))
    }

    /// Writes `record` into the first empty slot and stamps its `rid`.
    pub fn insert_record(&mut self, record: &mut Record) -> Result<RID> {
        if record.width() != self.layout.record_width {
            return Err(Error::invalid_state(format!(
                "record is {} bytes, page {} stores {}-byte records",
                record.width(),
                self.page_id,
                self.layout.record_width
            )));
        }
        let slot = (0..self.slot_count())
            .find(|&slot| !self.is_slot_used(slot))
            .ok_or_else(|| Error::invalid_state(format!("page {} is full", self.page_id)))?;
        let offset = self.layout.slot_offset(slot);
        self.data[offset..(offset + self.layout.record_width)].copy_from_slice(&record.data);
        self.set_slot_used(slot, true);
        let rid = RID(self.page_id, slot as u32);
        record.rid = Some(rid);
        Ok(rid)
    }

    pub fn delete_record(&mut self, record: &Record) -> Result<()> {
        let RID(page_id, slot) = record
            .rid
            .ok_or_else(|| Error::invalid_state("record has no rid"))?;
        if page_id != self.page_id {
            return Err(Error::invalid_state(format!(
                "record lives on page {}, not {}",
                page_id, self.page_id
            )));
        }
        let slot = slot as usize;
        if !self.is_slot_used(slot) {
            return Err(Error::invalid_state(format!(
                "slot {} of page {} is already empty",
                slot, self.page_id
            )));
        }
        self.set_slot_used(slot, false);
        Ok(())
    }

    pub fn get_record(&self, slot: usize) -> Option<Record> {
        if !self.is_slot_used(slot) {
            return None;
        }
        let offset = self.layout.slot_offset(slot);
        Some(Record::new(
            Some(RID(self.page_id, slot as u32)),
            &self.data[offset..(offset + self.layout.record_width)],
        ))
    }

    /// First used slot at or after `slot`.
    pub fn next_used_slot(&self, slot: usize) -> Option<usize> {
        (slot..self.slot_count()).find(|&s| self.is_slot_used(s))
    }

    pub fn records(&self) -> Vec<Record> {
        (0..self.slot_count())
            .filter_map(|slot| self.get_record(slot))
            .collect()
    }
}
