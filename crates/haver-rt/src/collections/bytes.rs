//! Growable byte buffer.
//!
//! Bytes have reference semantics like lists. Index errors are fatal;
//! bad byte values and out-of-range big-endian accesses hurl.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{raise, RuntimeError};
use crate::panic::{fatal, type_error};
use crate::value::{int_arg, make_string, BytesRef, Value};

const INITIAL_CAPACITY: usize = 8;

// ── Internal helpers ──────────────────────────────────────────────────

fn bytes_ref<'a>(op: &'static str, bytes: &'a Value) -> &'a BytesRef {
    match bytes {
        Value::Bytes(b) => b,
        other => type_error(op, other, None),
    }
}

fn from_vec(buf: Vec<u8>) -> Value {
    Value::Bytes(Arc::new(Mutex::new(buf)))
}

fn resolve_index(index: i64, len: usize) -> usize {
    let len = len as i64;
    let adjusted = if index < 0 { index + len } else { index };
    if adjusted < 0 || adjusted >= len {
        fatal(&RuntimeError::Index {
            index: adjusted,
            len,
            what: "bytes",
        });
    }
    adjusted as usize
}

/// Check that `width` bytes starting at `offset` fit in `len`.
fn span(op: &'static str, offset: &Value, width: usize, len: usize) -> usize {
    let offset = int_arg(op, offset);
    match usize::try_from(offset) {
        Ok(start) if start.checked_add(width).is_some_and(|end| end <= len) => start,
        _ => raise(RuntimeError::message(format!("{op} out of bounds"))),
    }
}

// ── Public API ────────────────────────────────────────────────────────

/// A zero-filled buffer of `size` bytes. A negative size gives an empty
/// buffer.
pub fn new(size: &Value) -> Value {
    let size = int_arg("bytes_new", size).max(0) as usize;
    from_vec(vec![0u8; size])
}

/// The UTF-8 bytes of a string.
pub fn from_string(text: &Value) -> Value {
    match text {
        Value::Str(s) => from_vec(s.as_bytes().to_vec()),
        other => type_error("bytes_from_string", other, None),
    }
}

pub fn len(bytes: &Value) -> i64 {
    match bytes {
        Value::Bytes(b) => b.lock().len() as i64,
        _ => 0,
    }
}

/// A new buffer holding `start..end`. Negative offsets count from the
/// end; both ends are then clamped to the buffer.
pub fn slice(bytes: &Value, start: &Value, end: &Value) -> Value {
    let buf = bytes_ref("bytes_slice", bytes).lock();
    let len = buf.len() as i64;
    let clamp = |raw: i64| -> usize {
        let adjusted = if raw < 0 { raw + len } else { raw };
        adjusted.clamp(0, len) as usize
    };
    let start = clamp(int_arg("bytes_slice", start));
    let end = clamp(int_arg("bytes_slice", end));
    if start >= end {
        return from_vec(Vec::new());
    }
    from_vec(buf[start..end].to_vec())
}

pub fn get(bytes: &Value, index: &Value) -> Value {
    let index = int_arg("bytes_get", index);
    let buf = bytes_ref("bytes_get", bytes).lock();
    let i = resolve_index(index, buf.len());
    Value::Int(i64::from(buf[i]))
}

pub fn set(bytes: &Value, index: &Value, value: &Value) {
    let index = int_arg("bytes_set", index);
    let byte = int_arg("bytes_set", value);
    let Ok(byte) = u8::try_from(byte) else {
        raise(RuntimeError::message("bytes_set value must be between 0 and 255"));
    };
    let mut buf = bytes_ref("bytes_set", bytes).lock();
    let i = resolve_index(index, buf.len());
    buf[i] = byte;
}

/// Append the contents of `other` in place, doubling capacity as needed.
pub fn append(bytes: &Value, other: &Value) {
    // Snapshot first: appending a buffer to itself must not re-lock it.
    let extra = bytes_ref("bytes_append", other).lock().clone();
    let mut buf = bytes_ref("bytes_append", bytes).lock();
    let needed = buf.len() + extra.len();
    if needed > buf.capacity() {
        let mut cap = buf.capacity().max(INITIAL_CAPACITY);
        while cap < needed {
            cap *= 2;
        }
        let additional = cap - buf.len();
        buf.reserve_exact(additional);
    }
    buf.extend_from_slice(&extra);
}

/// Decode the whole buffer as UTF-8, replacing invalid sequences.
pub fn to_string(bytes: &Value) -> Value {
    let buf = bytes_ref("bytes_to_string", bytes).lock().clone();
    make_string(&String::from_utf8_lossy(&buf))
}

pub fn read_u16be(bytes: &Value, offset: &Value) -> Value {
    let buf = bytes_ref("bytes_read_u16be", bytes).lock();
    let at = span("bytes_read_u16be", offset, 2, buf.len());
    Value::Int(i64::from(u16::from_be_bytes([buf[at], buf[at + 1]])))
}

pub fn read_u32be(bytes: &Value, offset: &Value) -> Value {
    let buf = bytes_ref("bytes_read_u32be", bytes).lock();
    let at = span("bytes_read_u32be", offset, 4, buf.len());
    let word = [buf[at], buf[at + 1], buf[at + 2], buf[at + 3]];
    Value::Int(i64::from(u32::from_be_bytes(word)))
}

pub fn write_u16be(bytes: &Value, offset: &Value, value: &Value) {
    let op = "bytes_write_u16be";
    let Ok(word) = u16::try_from(int_arg(op, value)) else {
        raise(RuntimeError::message(format!("{op} value out of range")));
    };
    let mut buf = bytes_ref(op, bytes).lock();
    let at = span(op, offset, 2, buf.len());
    buf[at..at + 2].copy_from_slice(&word.to_be_bytes());
}

pub fn write_u32be(bytes: &Value, offset: &Value, value: &Value) {
    let op = "bytes_write_u32be";
    let Ok(word) = u32::try_from(int_arg(op, value)) else {
        raise(RuntimeError::message(format!("{op} value out of range")));
    };
    let mut buf = bytes_ref(op, bytes).lock();
    let at = span(op, offset, 4, buf.len());
    buf[at..at + 4].copy_from_slice(&word.to_be_bytes());
}

/// Copy of the raw contents, for the socket and extension layers.
pub(crate) fn to_vec(bytes: &Value) -> Option<Vec<u8>> {
    match bytes {
        Value::Bytes(b) => Some(b.lock().clone()),
        _ => None,
    }
}

pub(crate) fn from_slice(data: &[u8]) -> Value {
    from_vec(data.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hurl::protect;

    fn int(n: i64) -> Value {
        Value::Int(n)
    }

    #[test]
    fn test_bytes_new_zero_filled() {
        let b = new(&int(4));
        assert_eq!(len(&b), 4);
        assert_eq!(get(&b, &int(3)), int(0));
        assert_eq!(len(&new(&int(-5))), 0);
        assert_eq!(len(&new(&Value::Float(2.7))), 2);
    }

    #[test]
    fn test_bytes_get_set_negative_index() {
        let b = from_string(&make_string("abc"));
        assert_eq!(get(&b, &int(-1)), int(i64::from(b'c')));
        set(&b, &int(-3), &int(0x7a));
        assert_eq!(to_string(&b).as_str(), Some("zbc"));
    }

    #[test]
    fn test_bytes_set_rejects_bad_value() {
        let b = new(&int(1));
        let err = protect(|| set(&b, &int(0), &int(256))).unwrap_err();
        assert_eq!(err.as_str(), Some("bytes_set value must be between 0 and 255"));
        let err = protect(|| set(&b, &int(0), &int(-1))).unwrap_err();
        assert_eq!(err.as_str(), Some("bytes_set value must be between 0 and 255"));
    }

    #[test]
    fn test_bytes_slice_clamps() {
        let b = from_string(&make_string("haggis"));
        assert_eq!(to_string(&slice(&b, &int(1), &int(3))).as_str(), Some("ag"));
        assert_eq!(to_string(&slice(&b, &int(-3), &int(100))).as_str(), Some("gis"));
        assert_eq!(len(&slice(&b, &int(4), &int(2))), 0);
        assert_eq!(len(&slice(&b, &int(-100), &int(2))), 2);
    }

    #[test]
    fn test_bytes_append_in_place() {
        let a = from_string(&make_string("och"));
        let alias = a.clone();
        append(&a, &from_string(&make_string(" aye")));
        assert_eq!(to_string(&alias).as_str(), Some("och aye"));
        append(&a, &a);
        assert_eq!(len(&a), 14);
    }

    #[test]
    fn test_bytes_big_endian_round_trip() {
        let b = new(&int(6));
        write_u16be(&b, &int(0), &int(0x1234));
        write_u32be(&b, &int(2), &int(0xdead_beef));
        assert_eq!(get(&b, &int(0)), int(0x12));
        assert_eq!(get(&b, &int(1)), int(0x34));
        assert_eq!(read_u16be(&b, &int(0)), int(0x1234));
        assert_eq!(read_u32be(&b, &int(2)), int(0xdead_beef));
    }

    #[test]
    fn test_bytes_big_endian_bounds() {
        let b = new(&int(3));
        let err = protect(|| read_u32be(&b, &int(0))).unwrap_err();
        assert_eq!(err.as_str(), Some("bytes_read_u32be out of bounds"));
        let err = protect(|| read_u16be(&b, &int(-1))).unwrap_err();
        assert_eq!(err.as_str(), Some("bytes_read_u16be out of bounds"));
        let err = protect(|| write_u16be(&b, &int(0), &int(70000))).unwrap_err();
        assert_eq!(err.as_str(), Some("bytes_write_u16be value out of range"));
        let err = protect(|| write_u16be(&b, &int(2), &int(1))).unwrap_err();
        assert_eq!(err.as_str(), Some("bytes_write_u16be out of bounds"));
    }
}
