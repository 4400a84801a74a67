//! Hamming distance over hex-encoded hashes.

/// Distance reported for hashes that cannot be compared
pub const INFINITE_DISTANCE: u32 = u32::MAX;

/// Count differing bits between two hex strings, nibble by nibble.
///
/// Empty input, unequal lengths and non-hex characters yield
/// [`INFINITE_DISTANCE`]; this function never panics.
pub fn hamming_distance(a: &str, b: &str) -> u32 {
    if a.is_empty() || a.len() != b.len() {
        return INFINITE_DISTANCE;
    }

    let mut distance = 0;
    for (ca, cb) in a.chars().zip(b.chars()) {
        match (ca.to_digit(16), cb.to_digit(16)) {
            (Some(na), Some(nb)) => distance += (na ^ nb).count_ones(),
            _ => return INFINITE_DISTANCE,
        }
    }
    distance
}

/// True for a non-empty, all-hex string
pub fn is_valid_hash(hash: &str) -> bool {
    !hash.is_empty() && hash.chars().all(|c| c.is_ascii_hexdigit())
}

/// Number of bits a hex hash encodes
pub fn hash_bit_len(hash: &str) -> u32 {
    (hash.len() * 4) as u32
}
