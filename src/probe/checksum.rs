//! One's complement arithmetic used to pin probe UDP checksums

/// Fold a 32-bit accumulator into a 16-bit one's complement sum.
pub(crate) fn fold(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    sum as u16
}

/// Compute the big-endian tuning word that, placed in the payload, forces
/// the datagram's UDP checksum to `target`.
///
/// `zero_word_checksum` is the checksum the datagram has with the tuning
/// word zeroed. With the word `w` in place the checksum becomes
/// `!fold(s + w)` where `!fold(s)` is `zero_word_checksum`, so `w` is the
/// one's complement difference `!target - fold(s)`.
pub(crate) fn tuning_word(target: u16, zero_word_checksum: u16) -> [u8; 2] {
    let want = !target;
    let have = !zero_word_checksum;
    // a - b in one's complement is a + !b with end-around carry.
    let word = fold(u32::from(want) + u32::from(!have));
    word.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ones_add(a: u16, b: u16) -> u16 {
        fold(u32::from(a) + u32::from(b))
    }

    #[test]
    fn test_fold() {
        assert_eq!(fold(0), 0);
        assert_eq!(fold(0xffff), 0xffff);
        assert_eq!(fold(0x1_0000), 1);
        assert_eq!(fold(0x1_ffff), fold(0x2_0000 - 1));
    }

    #[test]
    fn test_tuning_word_reaches_target() {
        // For a range of hypothetical partial sums, check that adding the
        // tuning word yields the wanted checksum.
        for target in [33434u16, 33453, 0x1234, 0xfffe] {
            for partial in [0u16, 1, 0x8000, 0xabcd, 0xfffe] {
                let zero_word_checksum = !partial;
                let word = tuning_word(target, zero_word_checksum);
                let w = u16::from_be_bytes(word);
                let checksum = !ones_add(partial, w);
                assert_eq!(
                    checksum, target,
                    "target {target:#x} partial {partial:#x} word {w:#x}"
                );
            }
        }
    }

    #[test]
    fn test_tuning_word_noop_when_already_matching() {
        // If the zero-word checksum already equals the target, the word
        // must be a one's complement zero (0x0000 or 0xffff).
        let word = u16::from_be_bytes(tuning_word(0x1234, 0x1234));
        assert!(word == 0 || word == 0xffff);
    }
}
