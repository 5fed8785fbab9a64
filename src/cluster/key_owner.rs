/// Computes a stable slot for a data key using FNV-1a hash.
///
/// Every member computes the same slot for the same key and slot count.
pub fn stable_slot_for(key: &str, slot_count: u32) -> u32 {
    if slot_count == 0 {
        return 0;
    }
    let mut hash = 14695981039346656037u64;
    for byte in key.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    (hash % slot_count as u64) as u32
}
