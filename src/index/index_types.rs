use std::fmt::Debug;

use byteorder::{ByteOrder, LittleEndian};

use crate::storage::page::page::PageId;

/// Key parameter of the index: a totally ordered type with a fixed-width
/// on-page encoding. The host supplies the comparator through `Ord`.
pub trait IndexKey: Ord + Clone + Debug + Send + Sync + 'static {
    const ENCODED_SIZE: usize;

    fn encode(&self, buf: &mut [u8]);
    fn decode(buf: &[u8]) -> Self;
}

impl IndexKey for i64 {
    const ENCODED_SIZE: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_i64(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_i64(buf)
    }
}

impl IndexKey for u64 {
    const ENCODED_SIZE: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_u64(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_u64(buf)
    }
}

impl IndexKey for u32 {
    const ENCODED_SIZE: usize = 4;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_u32(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_u32(buf)
    }
}

/// Record identifier stored in leaf slots: the heap page holding the
/// tuple and its slot number.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Rid {
    pub page_id: PageId,
    pub slot: u32,
}

impl Rid {
    pub const ENCODED_SIZE: usize = 8;

    pub fn new(page_id: PageId, slot: u32) -> Self {
        Rid { page_id, slot }
    }

    pub fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_u32(buf, self.page_id);
        LittleEndian::write_u32(&mut buf[4..], self.slot);
    }

    pub fn decode(buf: &[u8]) -> Self {
        Rid {
            page_id: LittleEndian::read_u32(buf),
            slot: LittleEndian::read_u32(&buf[4..]),
        }
    }
}
