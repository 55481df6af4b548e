use super::error::{HeapError, HeapResult};
use super::wine::WineRecord;
use super::{PageId, SlotId};

/// Bytes of framing at the start of each encoded page (record count)
const PAGE_HEADER_LEN: usize = 2;

/// Byte used to pad the unused tail of an encoded page
const PAGE_FILL: u8 = 0;

/// A fixed-capacity data page holding an ordered run of wine records
///
/// The in-memory form is the decoded record list; the on-disk form is a
/// record count followed by back-to-back record frames, padded with a
/// known fill byte up to the configured page size. Dirtiness is tracked
/// by the buffer pool frame, not by the page itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapPage {
    pub id: PageId,
    records: Vec<WineRecord>,
}

impl HeapPage {
    /// Create an empty page with the given id
    pub fn empty(id: PageId) -> Self {
        Self {
            id,
            records: Vec::new(),
        }
    }

    /// All records in slot order
    pub fn records(&self) -> &[WineRecord] {
        &self.records
    }

    /// Record at the given slot, if occupied
    pub fn record(&self, slot: SlotId) -> Option<&WineRecord> {
        self.records.get(slot)
    }

    /// Number of records on the page
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a record, returning the slot it landed in
    pub fn append(&mut self, record: WineRecord) -> SlotId {
        self.records.push(record);
        self.records.len() - 1
    }

    /// Size of the encoded page before padding
    pub fn encoded_len(&self) -> usize {
        PAGE_HEADER_LEN + self.records.iter().map(|r| r.frame_len()).sum::<usize>()
    }

    /// Whether the page can take `record` without exceeding `page_size`
    pub fn has_space_for(&self, record: &WineRecord, page_size: usize) -> bool {
        self.encoded_len() + record.frame_len() <= page_size
    }

    /// Encode the page into exactly `page_size` bytes
    pub fn encode(&self, page_size: usize) -> HeapResult<Vec<u8>> {
        let encoded = self.encoded_len();
        if encoded > page_size {
            return Err(HeapError::PageTooLarge {
                id: self.id,
                encoded,
                page_size,
            });
        }
        if self.records.len() > u16::MAX as usize {
            return Err(HeapError::PageTooLarge {
                id: self.id,
                encoded,
                page_size,
            });
        }

        let mut buf = Vec::with_capacity(page_size);
        buf.extend_from_slice(&(self.records.len() as u16).to_le_bytes());
        for record in &self.records {
            record.encode_into(&mut buf);
        }
        buf.resize(page_size, PAGE_FILL);
        Ok(buf)
    }

    /// Decode a page from its on-disk image
    pub fn decode(id: PageId, buf: &[u8]) -> HeapResult<Self> {
        if buf.len() < PAGE_HEADER_LEN {
            return Err(HeapError::PageCorrupt(
                id,
                format!("page image is only {} bytes", buf.len()),
            ));
        }

        let count = u16::from_le_bytes([buf[0], buf[1]]) as usize;
        let mut records = Vec::with_capacity(count);
        let mut offset = PAGE_HEADER_LEN;

        for slot in 0..count {
            let (record, consumed) = WineRecord::decode(&buf[offset..]).map_err(|e| {
                HeapError::PageCorrupt(id, format!("record frame {} invalid: {}", slot, e))
            })?;
            records.push(record);
            offset += consumed;
        }

        Ok(Self { id, records })
    }
}
