//! Append-only packing of constant tensor bytes.

use crate::schema::ConstantSegment;

/// Accumulates raw constant data into one contiguous buffer.
///
/// Entries are recorded in first-use order with monotonically increasing
/// offsets. Identical content appended twice produces two entries; the
/// packer performs no deduplication. Table index 0 is the reserved empty
/// segment, so real constants always get indices >= 1.
#[derive(Debug)]
pub struct ConstantPacker {
    buffer: Vec<u8>,
    table: Vec<ConstantSegment>,
}

impl ConstantPacker {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            table: vec![ConstantSegment {
                offset: 0,
                length: 0,
            }],
        }
    }

    /// Appends bytes to the shared buffer, returning the new table index and
    /// the recorded placement.
    pub fn append(&mut self, bytes: &[u8]) -> (u32, ConstantSegment) {
        let segment = ConstantSegment {
            offset: self.buffer.len() as u64,
            length: bytes.len() as u64,
        };
        self.buffer.extend_from_slice(bytes);
        let index = self.table.len() as u32;
        self.table.push(segment);
        (index, segment)
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Consumes the packer, yielding the buffer and the segment table.
    pub fn into_parts(self) -> (Vec<u8>, Vec<ConstantSegment>) {
        (self.buffer, self.table)
    }
}

impl Default for ConstantPacker {
    fn default() -> Self {
        Self::new()
    }
}
