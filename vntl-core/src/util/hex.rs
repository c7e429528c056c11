use crate::error::{Result, VntlError};
use hex;

/// Parse an archive obfuscation key such as `0xDEADBEEF` or `deadbeef`.
///
/// The RPA-3.0 header stores the key as 8 hex digits, so anything wider
/// than 32 bits is rejected.
pub fn parse_key_hex(hex_str: &str) -> Result<u32> {
    let s = hex_str.trim();
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if s.is_empty() {
        return Err(VntlError::invalid(format!("invalid key hex: {hex_str:?}")));
    }
    // hex::decode wants whole bytes
    let padded = if s.len() % 2 == 1 {
        format!("0{s}")
    } else {
        s.to_string()
    };
    let bytes = hex::decode(&padded)
        .map_err(|e| VntlError::invalid(format!("invalid key hex {hex_str:?}: {e}")))?;
    let significant: Vec<u8> = bytes.into_iter().skip_while(|b| *b == 0).collect();
    if significant.len() > 4 {
        return Err(VntlError::invalid(format!(
            "key {hex_str:?} does not fit in 32 bits"
        )));
    }
    let mut out = [0u8; 4];
    out[4 - significant.len()..].copy_from_slice(&significant);
    Ok(u32::from_be_bytes(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_prefixed_and_odd_length_keys() {
        assert_eq!(parse_key_hex("0xDEADBEEF").unwrap(), 0xDEAD_BEEF);
        assert_eq!(parse_key_hex("abc").unwrap(), 0xABC);
        assert_eq!(parse_key_hex(" 0X00000001 ").unwrap(), 1);
        assert_eq!(parse_key_hex("0").unwrap(), 0);
    }

    #[test]
    fn rejects_garbage_and_wide_keys() {
        for bad in ["", "0x", "xyz", "0x1ffffffff", "12 34"] {
            let err = parse_key_hex(bad).unwrap_err();
            assert_eq!(err.code(), "invalid_params", "input {bad:?}");
        }
    }
}
