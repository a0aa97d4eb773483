//! Record locator for GeoSite databases
//!
//! A database is a sequence of length-delimited entries:
//!
//! ```text
//! [tag: 1 byte][body length: varint][body ...] [tag][length][body] ...
//! ```
//!
//! and every body starts with its own length-prefixed key field
//! (`[tag][key length][key bytes]`). The locator compares that key in
//! place and hands back the body of the first hit without decoding
//! anything else, so scanning a multi-megabyte file allocates nothing.

use super::varint::decode_varint;

/// Find the body of the first entry whose embedded key equals `key`.
///
/// Truncated or corrupt data ends the scan with `None`.
pub fn find_record<'a>(mut data: &'a [u8], key: &[u8]) -> Option<&'a [u8]> {
    if key.is_empty() {
        return None;
    }

    loop {
        if data.len() < 2 {
            return None;
        }

        let (body_len, varint_len) = decode_varint(&data[1..]).ok()?;
        let head_len = 1 + varint_len;
        let remaining = data.len() - head_len;
        if (remaining as u64) < body_len {
            return None;
        }

        let body_len = body_len as usize;
        let body = &data[head_len..head_len + body_len];
        if key_matches(body, key) {
            return Some(body);
        }

        data = &data[head_len + body_len..];
    }
}

#[inline]
fn key_matches(body: &[u8], key: &[u8]) -> bool {
    body.len() >= 2 + key.len() && body[1] as usize == key.len() && &body[2..2 + key.len()] == key
}

/// Iterate over the keys of every entry, in file order.
///
/// Stops silently at the first malformed entry.
pub fn record_keys(data: &[u8]) -> RecordKeys<'_> {
    RecordKeys { data }
}

/// Iterator returned by [`record_keys`]
pub struct RecordKeys<'a> {
    data: &'a [u8],
}

impl<'a> Iterator for RecordKeys<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.len() < 2 {
            return None;
        }

        let (body_len, varint_len) = match decode_varint(&self.data[1..]) {
            Ok(v) => v,
            Err(_) => {
                self.data = &[];
                return None;
            }
        };
        let head_len = 1 + varint_len;
        if ((self.data.len() - head_len) as u64) < body_len {
            self.data = &[];
            return None;
        }

        let body_len = body_len as usize;
        let body = &self.data[head_len..head_len + body_len];
        self.data = &self.data[head_len + body_len..];

        if body.len() < 2 {
            return Some(&[]);
        }
        let key_len = (body[1] as usize).min(body.len() - 2);
        Some(&body[2..2 + key_len])
    }
}
