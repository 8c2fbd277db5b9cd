use anyhow::{bail, Result};
use byteorder::{ByteOrder, LittleEndian};

use crate::{
    index::{
        index_types::{IndexKey, Rid},
        node::{Node, NodePayload},
    },
    storage::page::page::{INVALID_PAGE_ID, PAGE_SIZE},
};

const NODE_TYPE_OFFSET: usize = 0;
const SIZE_OFFSET: usize = 4;
const MAX_SIZE_OFFSET: usize = 8;
const PAGE_ID_OFFSET: usize = 12;
const PARENT_POINTER_OFFSET: usize = 16;
const NEXT_LEAF_POINTER_OFFSET: usize = 20;
pub const NODE_HEADER_SIZE: usize = 24;

const INTERNAL_NODE_TYPE: u8 = 0x01;
const LEAF_NODE_TYPE: u8 = 0x02;

const PTR_SIZE: usize = 4;

/// Most leaf entries a page can hold for key type `K`.
pub fn leaf_capacity<K: IndexKey>() -> usize {
    (PAGE_SIZE - NODE_HEADER_SIZE) / (K::ENCODED_SIZE + Rid::ENCODED_SIZE)
}

/// Most children an internal page can hold for key type `K`.
pub fn internal_capacity<K: IndexKey>() -> usize {
    (PAGE_SIZE - NODE_HEADER_SIZE - PTR_SIZE) / (K::ENCODED_SIZE + PTR_SIZE) + 1
}

/// On-page node format. Little-endian header
/// `{node_type, size, max_size, page_id, parent_page_id, next_page_id}`,
/// then the payload: leaf pages store `size` sorted `(key, rid)` pairs;
/// internal pages store the leftmost child followed by `size - 1`
/// `(key, child)` pairs.
pub struct NodeCodec;

impl NodeCodec {
    pub fn encode<K: IndexKey>(node: &Node<K>, buf: &mut [u8]) {
        assert_eq!(buf.len(), PAGE_SIZE);
        LittleEndian::write_u32(&mut buf[SIZE_OFFSET..], node.size() as u32);
        LittleEndian::write_u32(&mut buf[MAX_SIZE_OFFSET..], node.max_size as u32);
        LittleEndian::write_u32(&mut buf[PAGE_ID_OFFSET..], node.page_id);
        LittleEndian::write_u32(&mut buf[PARENT_POINTER_OFFSET..], node.parent_page_id);

        match &node.payload {
            NodePayload::Leaf {
                entries,
                next_page_id,
            } => {
                assert!(entries.len() <= leaf_capacity::<K>(), "leaf overflows page");
                buf[NODE_TYPE_OFFSET] = LEAF_NODE_TYPE;
                LittleEndian::write_u32(&mut buf[NEXT_LEAF_POINTER_OFFSET..], *next_page_id);

                let mut offset = NODE_HEADER_SIZE;
                for (key, rid) in entries {
                    key.encode(&mut buf[offset..offset + K::ENCODED_SIZE]);
                    offset += K::ENCODED_SIZE;
                    rid.encode(&mut buf[offset..offset + Rid::ENCODED_SIZE]);
                    offset += Rid::ENCODED_SIZE;
                }
            }
            NodePayload::Internal { keys, children } => {
                assert_eq!(keys.len() + 1, children.len());
                assert!(
                    children.len() <= internal_capacity::<K>(),
                    "internal node overflows page"
                );
                buf[NODE_TYPE_OFFSET] = INTERNAL_NODE_TYPE;
                LittleEndian::write_u32(&mut buf[NEXT_LEAF_POINTER_OFFSET..], INVALID_PAGE_ID);

                let mut offset = NODE_HEADER_SIZE;
                LittleEndian::write_u32(&mut buf[offset..], children[0]);
                offset += PTR_SIZE;
                for (key, child) in keys.iter().zip(children[1..].iter()) {
                    key.encode(&mut buf[offset..offset + K::ENCODED_SIZE]);
                    offset += K::ENCODED_SIZE;
                    LittleEndian::write_u32(&mut buf[offset..], *child);
                    offset += PTR_SIZE;
                }
            }
        }
    }

    pub fn decode<K: IndexKey>(buf: &[u8]) -> Result<Node<K>> {
        assert_eq!(buf.len(), PAGE_SIZE);
        let node_type = buf[NODE_TYPE_OFFSET];
        let size = LittleEndian::read_u32(&buf[SIZE_OFFSET..]) as usize;
        let max_size = LittleEndian::read_u32(&buf[MAX_SIZE_OFFSET..]) as usize;
        let page_id = LittleEndian::read_u32(&buf[PAGE_ID_OFFSET..]);
        let parent_page_id = LittleEndian::read_u32(&buf[PARENT_POINTER_OFFSET..]);

        let payload = match node_type {
            LEAF_NODE_TYPE => {
                let next_page_id = LittleEndian::read_u32(&buf[NEXT_LEAF_POINTER_OFFSET..]);
                let mut entries = Vec::with_capacity(size);
                let mut offset = NODE_HEADER_SIZE;
                for _ in 0..size {
                    let key = K::decode(&buf[offset..offset + K::ENCODED_SIZE]);
                    offset += K::ENCODED_SIZE;
                    let rid = Rid::decode(&buf[offset..offset + Rid::ENCODED_SIZE]);
                    offset += Rid::ENCODED_SIZE;
                    entries.push((key, rid));
                }
                NodePayload::Leaf {
                    entries,
                    next_page_id,
                }
            }
            INTERNAL_NODE_TYPE => {
                let mut keys = Vec::with_capacity(size.saturating_sub(1));
                let mut children = Vec::with_capacity(size);
                let mut offset = NODE_HEADER_SIZE;
                children.push(LittleEndian::read_u32(&buf[offset..]));
                offset += PTR_SIZE;
                for _ in 1..size {
                    keys.push(K::decode(&buf[offset..offset + K::ENCODED_SIZE]));
                    offset += K::ENCODED_SIZE;
                    children.push(LittleEndian::read_u32(&buf[offset..]));
                    offset += PTR_SIZE;
                }
                NodePayload::Internal { keys, children }
            }
            other => bail!("page {} holds no tree node (type byte {:#04x})", page_id, other),
        };

        Ok(Node {
            page_id,
            parent_page_id,
            max_size,
            payload,
        })
    }
}
