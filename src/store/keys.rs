/// Key layout and encoding utilities for Fjall partitions
///
/// Partition structure:
/// - `entries`: entry:{id} -> StoredEntry (JSON)
/// - `metadata`: meta:{key} -> value (big-endian u64)

/// Metadata key holding the next insertion sequence
pub const META_NEXT_SEQ: &str = "next_seq";

/// Encode an entry key: entry:{id}
pub fn encode_entry_key(id: &str) -> Vec<u8> {
    format!("entry:{}", id).into_bytes()
}

/// Decode an entry key: entry:{id} -> id
pub(crate) fn decode_entry_key(key: &[u8]) -> Option<String> {
    let key_str = std::str::from_utf8(key).ok()?;
    key_str.strip_prefix("entry:").map(String::from)
}

/// Encode a metadata key: meta:{key}
pub fn encode_meta_key(key: &str) -> Vec<u8> {
    format!("meta:{}", key).into_bytes()
}
