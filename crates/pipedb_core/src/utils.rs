use byteorder::{ByteOrder, NativeEndian as NE, WriteBytesExt};
use std::borrow::Cow;
use std::io::{self, Write};

#[inline]
pub fn get_u32(buf: &[u8], off: usize) -> u32 { NE::read_u32(&buf[off..off + 4]) }
#[inline]
pub fn put_u32(buf: &mut [u8], off: usize, v: u32) { NE::write_u32(&mut buf[off..off + 4], v) }

pub fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> { w.write_u32::<NE>(v) }

/// Copy `s` into a fixed-width NUL-terminated field. At most `field.len() - 1`
/// bytes are kept, cut back to a char boundary. Returns `true` if `s` was truncated.
pub fn write_fixed_str(field: &mut [u8], s: &str) -> bool {
    field.fill(0);
    let max = field.len().saturating_sub(1);
    if s.len() <= max {
        field[..s.len()].copy_from_slice(s.as_bytes());
        return false;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) { cut -= 1; }
    field[..cut].copy_from_slice(&s.as_bytes()[..cut]);
    true
}

/// Field contents up to the first NUL (or the whole field if none).
pub fn read_fixed_str(field: &[u8]) -> Cow<'_, str> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_str_fits() {
        let mut f = [0xAAu8; 8];
        assert!(!write_fixed_str(&mut f, "abc"));
        assert_eq!(&f, b"abc\0\0\0\0\0");
        assert_eq!(read_fixed_str(&f), "abc");
    }

    #[test]
    fn fixed_str_truncates_and_terminates() {
        let mut f = [0u8; 4];
        assert!(write_fixed_str(&mut f, "abcd"));
        assert_eq!(&f, b"abc\0");
        // exactly width-1 bytes is not a truncation
        assert!(!write_fixed_str(&mut f, "xyz"));
    }

    #[test]
    fn fixed_str_respects_char_boundary() {
        let mut f = [0u8; 4];
        // "aé" is 3 bytes, "aéb" is 4
        assert!(write_fixed_str(&mut f, "aéé"));
        assert_eq!(read_fixed_str(&f), "aé");
    }

    #[test]
    fn u32_roundtrip_in_place() {
        let mut buf = [0u8; 8];
        put_u32(&mut buf, 4, 0xDEAD_BEEF);
        assert_eq!(get_u32(&buf, 4), 0xDEAD_BEEF);
        assert_eq!(get_u32(&buf, 0), 0);
    }
}
