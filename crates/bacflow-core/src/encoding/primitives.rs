use crate::encoding::{reader::Reader, writer::Writer};
use crate::{DecodeError, EncodeError};

/// Writes `value` in the fewest big-endian octets that hold it.
pub fn encode_unsigned(w: &mut Writer, value: u32) -> Result<usize, EncodeError> {
    let len = if value <= 0xFF {
        1
    } else if value <= 0xFFFF {
        2
    } else if value <= 0xFF_FFFF {
        3
    } else {
        4
    };

    for i in (0..len).rev() {
        let b = ((value >> (i * 8)) & 0xFF) as u8;
        w.write_u8(b)?;
    }
    Ok(len)
}

pub fn decode_unsigned(r: &mut Reader<'_>, len: usize) -> Result<u32, DecodeError> {
    if len == 0 || len > 4 {
        return Err(DecodeError::InvalidLength);
    }
    let mut value = 0u32;
    for _ in 0..len {
        value = (value << 8) | r.read_u8()? as u32;
    }
    Ok(value)
}

/// Writes `value` in the fewest two's-complement octets that keep its sign.
pub fn encode_signed(w: &mut Writer, value: i32) -> Result<usize, EncodeError> {
    let value64 = value as i64;
    let len = if (-128..=127).contains(&value64) {
        1
    } else if (-32768..=32767).contains(&value64) {
        2
    } else if (-8_388_608..=8_388_607).contains(&value64) {
        3
    } else {
        4
    };

    let bytes = value.to_be_bytes();
    w.write_all(&bytes[4 - len..])?;
    Ok(len)
}

pub fn decode_signed(r: &mut Reader<'_>, len: usize) -> Result<i32, DecodeError> {
    if len == 0 || len > 4 {
        return Err(DecodeError::InvalidLength);
    }

    let bytes = r.read_exact(len)?;
    let mut out = [0u8; 4];
    out[4 - len..].copy_from_slice(bytes);
    if (bytes[0] & 0x80) != 0 {
        for b in &mut out[..4 - len] {
            *b = 0xFF;
        }
    }
    Ok(i32::from_be_bytes(out))
}

/// Minimal unsigned octets as a tag payload.
pub fn unsigned_octets(value: u32) -> Vec<u8> {
    let mut w = Writer::with_limit(4);
    // four octets always fit
    let _ = encode_unsigned(&mut w, value);
    w.into_inner()
}

pub fn signed_octets(value: i32) -> Vec<u8> {
    let mut w = Writer::with_limit(4);
    let _ = encode_signed(&mut w, value);
    w.into_inner()
}

/// Decodes a whole tag payload as an unsigned value.
pub fn unsigned_from_octets(data: &[u8]) -> Result<u32, DecodeError> {
    decode_unsigned(&mut Reader::new(data), data.len())
}

pub fn signed_from_octets(data: &[u8]) -> Result<i32, DecodeError> {
    decode_signed(&mut Reader::new(data), data.len())
}

#[cfg(test)]
mod tests {
    use super::{
        decode_signed, decode_unsigned, encode_signed, encode_unsigned, signed_from_octets,
        signed_octets, unsigned_from_octets, unsigned_octets,
    };
    use crate::encoding::{reader::Reader, writer::Writer};
    use crate::DecodeError;
    use proptest::prelude::*;

    #[test]
    fn minimal_octet_counts() {
        assert_eq!(unsigned_octets(0), vec![0]);
        assert_eq!(unsigned_octets(255), vec![0xFF]);
        assert_eq!(unsigned_octets(256), vec![1, 0]);
        assert_eq!(unsigned_octets(0x0100_0000), vec![1, 0, 0, 0]);

        assert_eq!(signed_octets(-1), vec![0xFF]);
        assert_eq!(signed_octets(127), vec![0x7F]);
        assert_eq!(signed_octets(128), vec![0x00, 0x80]);
        assert_eq!(signed_octets(-129), vec![0xFF, 0x7F]);
    }

    #[test]
    fn empty_and_oversized_payloads_are_rejected() {
        assert_eq!(unsigned_from_octets(&[]), Err(DecodeError::InvalidLength));
        assert_eq!(
            signed_from_octets(&[0, 0, 0, 0, 1]),
            Err(DecodeError::InvalidLength)
        );
    }

    proptest! {
        #[test]
        fn unsigned_minimal_and_lossless(v in any::<u32>()) {
            let mut w = Writer::new();
            let len = encode_unsigned(&mut w, v).unwrap();
            let bytes = w.into_inner();
            prop_assert!(len == 1 || bytes[0] != 0);
            let got = decode_unsigned(&mut Reader::new(&bytes), len).unwrap();
            prop_assert_eq!(got, v);
        }

        #[test]
        fn signed_minimal_and_lossless(v in any::<i32>()) {
            let mut w = Writer::new();
            let len = encode_signed(&mut w, v).unwrap();
            let bytes = w.into_inner();
            if len > 1 {
                // the leading octet must carry information beyond sign extension
                let redundant = (bytes[0] == 0x00 && bytes[1] & 0x80 == 0)
                    || (bytes[0] == 0xFF && bytes[1] & 0x80 != 0);
                prop_assert!(!redundant);
            }
            let got = decode_signed(&mut Reader::new(&bytes), len).unwrap();
            prop_assert_eq!(got, v);
        }
    }
}
