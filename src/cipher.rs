//! Autokey XOR stream cipher used by the smart plug control protocol.
//!
//! Both directions start from the same seed. The encoder chains on the
//! ciphertext it produces, the decoder chains on the ciphertext it consumes,
//! so both walk the same keystream.

const INITIAL_KEY: u8 = 171;

pub fn encode(plaintext: &[u8]) -> Vec<u8> {
    let mut key = INITIAL_KEY;
    plaintext
        .iter()
        .map(|&p| {
            let c = key ^ p;
            key = c;
            c
        })
        .collect()
}

pub fn decode(ciphertext: &[u8]) -> Vec<u8> {
    let mut key = INITIAL_KEY;
    ciphertext
        .iter()
        .map(|&c| {
            let p = key ^ c;
            key = c;
            p
        })
        .collect()
}

/// Decodes into text treating every byte as a Latin-1 code point.
pub fn decode_latin1(ciphertext: &[u8]) -> String {
    decode(ciphertext).into_iter().map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_ciphertext() {
        // `{"` under the seed: 0xab ^ 0x7b = 0xd0, 0xd0 ^ 0x22 = 0xf2
        assert_eq!(encode(b"{\""), vec![0xd0, 0xf2]);
        assert_eq!(decode(&[0xd0, 0xf2]), b"{\"".to_vec());
    }

    #[test]
    fn test_round_trip_query() {
        let query = br#"{"system":{"get_sysinfo":{}}}"#;
        let encoded = encode(query);
        assert_ne!(encoded.as_slice(), query.as_slice());
        assert_eq!(decode(&encoded), query.to_vec());
    }

    #[test]
    fn test_round_trip_all_byte_values() {
        let plaintext: Vec<u8> = (0..=255u8).rev().chain(0..=255u8).collect();
        assert_eq!(decode(&encode(&plaintext)), plaintext);
    }

    #[test]
    fn test_latin1_text() {
        let text = "caf\u{e9} \u{ff}";
        let bytes: Vec<u8> = text.chars().map(|c| c as u8).collect();
        assert_eq!(decode_latin1(&encode(&bytes)), text);
    }

    #[test]
    fn test_empty() {
        assert!(encode(&[]).is_empty());
        assert!(decode(&[]).is_empty());
    }
}
