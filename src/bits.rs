/// Pack `(bit, set)` pairs into a flag word. Bits not listed stay off.
pub fn pack(flags: &[(u32, bool)]) -> u32 {
    flags.iter().fold(0, |acc, &(bit, set)| if set { acc | (1 << bit) } else { acc })
}

/// Test whether bit `bit` of `x` is set.
pub fn test_bit(bit: u32, x: u32) -> bool {
    (x >> bit) & 1 == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_then_test() {
        let word = pack(&[(0, true), (3, false), (7, true)]);
        assert_eq!(word, 0b1000_0001);
        assert!(test_bit(0, word));
        assert!(!test_bit(3, word));
        assert!(test_bit(7, word));
    }
}
