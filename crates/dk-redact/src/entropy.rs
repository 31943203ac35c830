//! Shannon entropy over character frequencies.

use std::collections::HashMap;

/// Calculate the Shannon entropy of a string in bits per character.
///
/// Frequencies are counted per `char`, not per byte, and no Unicode
/// normalization is applied. Random base64 or hex secrets usually land
/// above 4.0; prose and identifiers stay well below.
pub fn shannon_entropy(value: &str) -> f64 {
    let mut freq: HashMap<char, usize> = HashMap::new();
    let mut len = 0usize;

    for c in value.chars() {
        *freq.entry(c).or_insert(0) += 1;
        len += 1;
    }

    if len == 0 {
        return 0.0;
    }

    let len = len as f64;
    let mut entropy = 0.0;
    for &count in freq.values() {
        let p = count as f64 / len;
        entropy -= p * p.log2();
    }

    entropy
}
