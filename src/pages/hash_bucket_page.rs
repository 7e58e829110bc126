use super::{PageData, PageId, SlotId, PAGE_SIZE};

/// Fixed-width byte codec for hash table keys and values. Slot sizes in
/// a bucket page are derived from `ENCODED_SIZE`.
pub trait FixedCodec: Sized {
    const ENCODED_SIZE: usize;

    fn encode_into(&self, buf: &mut [u8]);
    fn decode_from(buf: &[u8]) -> Self;
}

impl FixedCodec for i32 {
    const ENCODED_SIZE: usize = 4;

    fn encode_into(&self, buf: &mut [u8]) {
        buf[..4].copy_from_slice(&self.to_le_bytes());
    }

    fn decode_from(buf: &[u8]) -> Self {
        i32::from_le_bytes(buf[..4].try_into().unwrap())
    }
}

impl FixedCodec for u32 {
    const ENCODED_SIZE: usize = 4;

    fn encode_into(&self, buf: &mut [u8]) {
        buf[..4].copy_from_slice(&self.to_le_bytes());
    }

    fn decode_from(buf: &[u8]) -> Self {
        u32::from_le_bytes(buf[..4].try_into().unwrap())
    }
}

impl FixedCodec for i64 {
    const ENCODED_SIZE: usize = 8;

    fn encode_into(&self, buf: &mut [u8]) {
        buf[..8].copy_from_slice(&self.to_le_bytes());
    }

    fn decode_from(buf: &[u8]) -> Self {
        i64::from_le_bytes(buf[..8].try_into().unwrap())
    }
}

/// Record ids, as stored by secondary indexes.
impl FixedCodec for (PageId, SlotId) {
    const ENCODED_SIZE: usize = 8;

    fn encode_into(&self, buf: &mut [u8]) {
        buf[..4].copy_from_slice(&self.0.to_le_bytes());
        buf[4..8].copy_from_slice(&self.1.to_le_bytes());
    }

    fn decode_from(buf: &[u8]) -> Self {
        (
            PageId::from_le_bytes(buf[..4].try_into().unwrap()),
            SlotId::from_le_bytes(buf[4..8].try_into().unwrap()),
        )
    }
}

/// Extendible-hash bucket page. Byte layout for a capacity of `n` slots
/// holding keys of `k` bytes and values of `v` bytes:
///
/// ```text
/// 0..n           occupied: one byte per slot, b'1' once a slot was ever
///                used (tombstones keep it set so scans know where the
///                array ends)
/// n..2n          readable: one byte per slot, b'1' while the entry is
///                live
/// 2n..2n+n*(k+v) entries, key immediately followed by value
/// ```
///
/// `n` is the largest count that fits the page, mirroring the original
/// on-disk format (including the b'1'/b'0' flag bytes).
const OCCUPIED_FLAG: u8 = b'1';
const FREE_FLAG: u8 = b'0';

pub fn bucket_array_size<K: FixedCodec, V: FixedCodec>() -> usize {
    PAGE_SIZE / (K::ENCODED_SIZE + V::ENCODED_SIZE + 2)
}

fn entry_offset<K: FixedCodec, V: FixedCodec>(idx: usize) -> usize {
    2 * bucket_array_size::<K, V>() + idx * (K::ENCODED_SIZE + V::ENCODED_SIZE)
}

pub fn is_occupied<K: FixedCodec, V: FixedCodec>(data: &PageData, idx: usize) -> bool {
    data.read_u8(idx) == OCCUPIED_FLAG
}

fn set_occupied<K: FixedCodec, V: FixedCodec>(data: &mut PageData, idx: usize) {
    data.write_u8(idx, OCCUPIED_FLAG);
}

pub fn is_readable<K: FixedCodec, V: FixedCodec>(data: &PageData, idx: usize) -> bool {
    data.read_u8(bucket_array_size::<K, V>() + idx) == OCCUPIED_FLAG
}

fn set_readable<K: FixedCodec, V: FixedCodec>(data: &mut PageData, idx: usize) {
    data.write_u8(bucket_array_size::<K, V>() + idx, OCCUPIED_FLAG);
}

pub fn set_unreadable<K: FixedCodec, V: FixedCodec>(data: &mut PageData, idx: usize) {
    data.write_u8(bucket_array_size::<K, V>() + idx, FREE_FLAG);
}

pub fn key_at<K: FixedCodec, V: FixedCodec>(data: &PageData, idx: usize) -> K {
    let offset = entry_offset::<K, V>(idx);
    K::decode_from(data.read_bytes(offset, offset + K::ENCODED_SIZE))
}

pub fn value_at<K: FixedCodec, V: FixedCodec>(data: &PageData, idx: usize) -> V {
    let offset = entry_offset::<K, V>(idx) + K::ENCODED_SIZE;
    V::decode_from(data.read_bytes(offset, offset + V::ENCODED_SIZE))
}

fn put_entry<K: FixedCodec, V: FixedCodec>(data: &mut PageData, idx: usize, key: &K, value: &V) {
    let offset = entry_offset::<K, V>(idx);
    let end = offset + K::ENCODED_SIZE + V::ENCODED_SIZE;
    let buf = &mut data.as_bytes_mut()[offset..end];
    key.encode_into(buf);
    value.encode_into(&mut buf[K::ENCODED_SIZE..]);
}

/// Collect the values stored under `key`. The scan stops at the first
/// never-occupied slot.
pub fn get_value<K, V>(data: &PageData, key: &K) -> Vec<V>
where
    K: FixedCodec + PartialEq,
    V: FixedCodec,
{
    let mut result = vec![];
    for idx in 0..bucket_array_size::<K, V>() {
        if !is_occupied::<K, V>(data, idx) {
            break;
        }
        if is_readable::<K, V>(data, idx) && key_at::<K, V>(data, idx) == *key {
            result.push(value_at::<K, V>(data, idx));
        }
    }
    result
}

/// Insert a `(key, value)` pair, reusing the first tombstone when one
/// exists. Duplicated pairs and full buckets yield `false`.
pub fn insert<K, V>(data: &mut PageData, key: &K, value: &V) -> bool
where
    K: FixedCodec + PartialEq,
    V: FixedCodec + PartialEq,
{
    let size = bucket_array_size::<K, V>();
    let mut reusable = size;
    let mut idx = 0;
    while idx < size {
        if !is_occupied::<K, V>(data, idx) {
            break;
        }
        if !is_readable::<K, V>(data, idx) {
            if reusable == size {
                reusable = idx;
            }
        } else if key_at::<K, V>(data, idx) == *key && value_at::<K, V>(data, idx) == *value {
            return false;
        }
        idx += 1;
    }

    if reusable < size {
        put_entry(data, reusable, key, value);
        set_readable::<K, V>(data, reusable);
        return true;
    }
    if idx < size {
        put_entry(data, idx, key, value);
        set_occupied::<K, V>(data, idx);
        set_readable::<K, V>(data, idx);
        return true;
    }
    false
}

/// Tombstone the matching `(key, value)` pair. The slot stays occupied.
pub fn remove<K, V>(data: &mut PageData, key: &K, value: &V) -> bool
where
    K: FixedCodec + PartialEq,
    V: FixedCodec + PartialEq,
{
    for idx in 0..bucket_array_size::<K, V>() {
        if !is_occupied::<K, V>(data, idx) {
            return false;
        }
        if is_readable::<K, V>(data, idx)
            && key_at::<K, V>(data, idx) == *key
            && value_at::<K, V>(data, idx) == *value
        {
            set_unreadable::<K, V>(data, idx);
            return true;
        }
    }
    false
}

pub fn num_readable<K: FixedCodec, V: FixedCodec>(data: &PageData) -> usize {
    (0..bucket_array_size::<K, V>())
        .filter(|&idx| is_readable::<K, V>(data, idx))
        .count()
}

pub fn is_full<K: FixedCodec, V: FixedCodec>(data: &PageData) -> bool {
    (0..bucket_array_size::<K, V>()).all(|idx| is_readable::<K, V>(data, idx))
}

pub fn is_empty<K: FixedCodec, V: FixedCodec>(data: &PageData) -> bool {
    num_readable::<K, V>(data) == 0
}
