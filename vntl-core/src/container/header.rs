use crate::error::{Result, VntlError};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

pub const MAGIC_V2: &[u8; 8] = b"RPA-2.0 ";
pub const MAGIC_V3: &[u8; 8] = b"RPA-3.0 ";

/// `RPA-2.0 <16 hex>\n`
pub const HEADER_LEN_V2: u64 = 25;
/// `RPA-3.0 <16 hex> <8 hex>\n`
pub const HEADER_LEN_V3: u64 = 34;

// Longest header line accepted when reading; real ones are 25 or 34 bytes.
const MAX_HEADER_LINE: usize = 256;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Version {
    /// Index lives in a separate `.rpi` file; data file has no header.
    V1,
    V2,
    V3,
}

impl Version {
    pub fn number(self) -> u8 {
        match self {
            Version::V1 => 1,
            Version::V2 => 2,
            Version::V3 => 3,
        }
    }

    /// Versions that can be written by the packer.
    pub fn packable(number: u8) -> Result<Self> {
        match number {
            2 => Ok(Version::V2),
            3 => Ok(Version::V3),
            n => Err(VntlError::invalid(format!(
                "archive version must be 2 or 3, got {n}"
            ))),
        }
    }

    pub fn header_len(self) -> u64 {
        match self {
            Version::V1 => 0,
            Version::V2 => HEADER_LEN_V2,
            Version::V3 => HEADER_LEN_V3,
        }
    }

    /// Only version 3 XORs index offsets and lengths with the key.
    pub fn uses_key(self) -> bool {
        matches!(self, Version::V3)
    }
}

impl From<Version> for u8 {
    fn from(v: Version) -> u8 {
        v.number()
    }
}

impl TryFrom<u8> for Version {
    type Error = VntlError;
    fn try_from(n: u8) -> Result<Self> {
        match n {
            1 => Ok(Version::V1),
            n => Version::packable(n),
        }
    }
}

/// Sniff the first bytes of a file for an RPA-2.0/3.0 signature.
pub fn sniff(prefix: &[u8]) -> Option<Version> {
    if prefix.starts_with(MAGIC_V3) {
        Some(Version::V3)
    } else if prefix.starts_with(MAGIC_V2) {
        Some(Version::V2)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: Version,
    /// Absolute offset of the zlib-compressed index.
    pub index_off: u64,
    /// XOR key; always 0 for version 2.
    pub key: u64,
    /// Bytes occupied by the header line, newline included.
    pub len: u64,
}

impl Header {
    pub fn new(version: Version, index_off: u64, key: u64) -> Self {
        let key = if version.uses_key() { key } else { 0 };
        Self {
            version,
            index_off,
            key,
            len: version.header_len(),
        }
    }

    pub fn write_to(&self, mut w: impl Write) -> std::io::Result<()> {
        match self.version {
            Version::V3 => {
                w.write_all(MAGIC_V3)?;
                writeln!(w, "{:016x} {:08x}", self.index_off, self.key)?;
            }
            Version::V2 => {
                w.write_all(MAGIC_V2)?;
                writeln!(w, "{:016x}", self.index_off)?;
            }
            Version::V1 => {}
        }
        Ok(())
    }

    pub fn read_from(mut r: impl Read) -> Result<Self> {
        let mut line = Vec::with_capacity(HEADER_LEN_V3 as usize);
        let mut byte = [0u8; 1];
        loop {
            let n = r.read(&mut byte)?;
            if n == 0 {
                return Err(VntlError::corrupt("truncated header"));
            }
            if byte[0] == b'\n' {
                break;
            }
            line.push(byte[0]);
            if line.len() > MAX_HEADER_LINE {
                return Err(VntlError::corrupt("header line too long"));
            }
        }
        let len = line.len() as u64 + 1;
        let text = std::str::from_utf8(&line)
            .map_err(|_| VntlError::corrupt("header is not ASCII"))?;
        let mut fields = text.split_whitespace();
        let version = match fields.next() {
            Some("RPA-3.0") => Version::V3,
            Some("RPA-2.0") => Version::V2,
            other => {
                return Err(VntlError::corrupt(format!(
                    "unrecognized signature {:?}",
                    other.unwrap_or("")
                )));
            }
        };
        let index_off = fields
            .next()
            .and_then(|f| u64::from_str_radix(f, 16).ok())
            .ok_or_else(|| VntlError::corrupt("missing or malformed index offset"))?;

        let mut key = 0u64;
        if version == Version::V3 {
            // Every trailing field is folded into the key.
            let mut seen = false;
            for f in fields {
                let part = u64::from_str_radix(f, 16)
                    .map_err(|_| VntlError::corrupt(format!("malformed key field {f:?}")))?;
                key ^= part;
                seen = true;
            }
            if !seen {
                return Err(VntlError::corrupt("missing key field"));
            }
        }

        Ok(Self {
            version,
            index_off,
            key,
            len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lines_have_fixed_width() {
        let mut v3 = Vec::new();
        Header::new(Version::V3, 0x1234, 0xDEADBEEF)
            .write_to(&mut v3)
            .unwrap();
        assert_eq!(v3, b"RPA-3.0 0000000000001234 deadbeef\n");
        assert_eq!(v3.len() as u64, HEADER_LEN_V3);

        let mut v2 = Vec::new();
        Header::new(Version::V2, 0x99, 0xDEADBEEF)
            .write_to(&mut v2)
            .unwrap();
        assert_eq!(v2, b"RPA-2.0 0000000000000099\n");
        assert_eq!(v2.len() as u64, HEADER_LEN_V2);
    }

    #[test]
    fn reads_back_written_header() {
        let mut buf = Vec::new();
        let h = Header::new(Version::V3, 77, 42);
        h.write_to(&mut buf).unwrap();
        buf.extend_from_slice(b"payload");
        let got = Header::read_from(&buf[..]).unwrap();
        assert_eq!(got, h);
    }

    #[test]
    fn key_is_xor_of_trailing_fields() {
        let got = Header::read_from(&b"RPA-3.0 0000000000000010 0000ff00 000000ff\n"[..]).unwrap();
        assert_eq!(got.key, 0xffff);
        assert_eq!(got.index_off, 0x10);
    }

    #[test]
    fn rejects_unknown_signatures() {
        for bad in [
            &b"RPA-4.0 0000000000000010\n"[..],
            b"PK\x03\x04 zip",
            b"RPA-3.0 0000000000000010\n",
            b"RPA-2.0 zz\n",
        ] {
            let err = Header::read_from(bad).unwrap_err();
            assert_eq!(err.code(), "corrupt_archive");
        }
    }

    #[test]
    fn sniffs_signatures() {
        assert_eq!(sniff(b"RPA-3.0 0000"), Some(Version::V3));
        assert_eq!(sniff(b"RPA-2.0 0000"), Some(Version::V2));
        assert_eq!(sniff(b"RENPY RPC2"), None);
    }
}
