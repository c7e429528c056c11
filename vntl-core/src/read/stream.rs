use crate::container::index::Segment;
use std::io::{Read, Seek, SeekFrom};

/// Streams one archive entry: for each segment, its inline prefix followed by
/// the stored range. `R` may be an owned file or a `&mut` borrow of one.
pub struct EntryReader<R> {
    src: R,
    segments: Vec<Segment>,
    cur: usize,
    prefix_pos: usize,
    remain: u64,
    positioned: bool,
}

impl<R: Read + Seek> EntryReader<R> {
    pub fn new(src: R, segments: Vec<Segment>) -> Self {
        Self {
            src,
            segments,
            cur: 0,
            prefix_pos: 0,
            remain: 0,
            positioned: false,
        }
    }

    fn advance(&mut self) {
        self.cur += 1;
        self.prefix_pos = 0;
        self.remain = 0;
        self.positioned = false;
    }
}

impl<R: Read + Seek> Read for EntryReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let Some(seg) = self.segments.get(self.cur) else {
                return Ok(0);
            };

            if self.prefix_pos < seg.prefix.len() {
                let rest = &seg.prefix[self.prefix_pos..];
                let n = rest.len().min(buf.len());
                buf[..n].copy_from_slice(&rest[..n]);
                self.prefix_pos += n;
                return Ok(n);
            }

            if !self.positioned {
                self.src.seek(SeekFrom::Start(seg.offset))?;
                self.remain = seg.length;
                self.positioned = true;
            }
            if self.remain == 0 {
                self.advance();
                continue;
            }

            let want = buf.len().min(self.remain as usize);
            let n = self.src.read(&mut buf[..want])?;
            if n == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "archive ended inside an entry",
                ));
            }
            self.remain -= n as u64;
            return Ok(n);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn concatenates_prefixes_and_ranges() {
        let mut src = Cursor::new(b"0123456789".to_vec());
        let segments = vec![
            Segment {
                offset: 5,
                length: 2,
                prefix: b"ab".to_vec(),
            },
            Segment {
                offset: 0,
                length: 3,
                prefix: Vec::new(),
            },
        ];
        let mut out = Vec::new();
        EntryReader::new(&mut src, segments)
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"ab56012");
    }

    #[test]
    fn truncated_source_is_an_error() {
        let mut src = Cursor::new(b"0123".to_vec());
        let segments = vec![Segment {
            offset: 2,
            length: 10,
            prefix: Vec::new(),
        }];
        let mut out = Vec::new();
        let err = EntryReader::new(&mut src, segments)
            .read_to_end(&mut out)
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }
}
