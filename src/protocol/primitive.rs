use crate::error::{Error, Result};
use zerocopy::FromBytes;
use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE, U64 as U64LE};

/// Read 1-byte integer
pub fn read_int_1(data: &[u8]) -> Result<(u8, &[u8])> {
    match data.split_first() {
        Some((&value, rest)) => Ok((value, rest)),
        None => Err(Error::malformed("expected 1 byte, found end of frame")),
    }
}

/// Read 2-byte little-endian integer
pub fn read_int_2(data: &[u8]) -> Result<(u16, &[u8])> {
    let (bytes, rest) = read_string_fix(data, 2)?;
    let value = U16LE::ref_from_bytes(bytes)
        .map_err(|_| Error::malformed("u16"))?
        .get();
    Ok((value, rest))
}

/// Read 4-byte little-endian integer
pub fn read_int_4(data: &[u8]) -> Result<(u32, &[u8])> {
    let (bytes, rest) = read_string_fix(data, 4)?;
    let value = U32LE::ref_from_bytes(bytes)
        .map_err(|_| Error::malformed("u32"))?
        .get();
    Ok((value, rest))
}

/// Read 8-byte little-endian integer
pub fn read_int_8(data: &[u8]) -> Result<(u64, &[u8])> {
    let (bytes, rest) = read_string_fix(data, 8)?;
    let value = U64LE::ref_from_bytes(bytes)
        .map_err(|_| Error::malformed("u64"))?
        .get();
    Ok((value, rest))
}

/// Read fixed-length bytes
pub fn read_string_fix(data: &[u8], len: usize) -> Result<(&[u8], &[u8])> {
    if data.len() < len {
        return Err(Error::MalformedFrame(format!(
            "expected {} bytes, only {} available",
            len,
            data.len()
        )));
    }
    Ok(data.split_at(len))
}

/// Read a string prefixed by a 2-byte length
pub fn read_string_len2(data: &[u8]) -> Result<(&[u8], &[u8])> {
    let (len, rest) = read_int_2(data)?;
    read_string_fix(rest, len as usize)
}

/// Write 1-byte integer
pub fn write_int_1(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

/// Write 2-byte little-endian integer
pub fn write_int_2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Write 4-byte little-endian integer
pub fn write_int_4(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Write 8-byte little-endian integer
pub fn write_int_8(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Write fixed-length bytes
pub fn write_bytes_fix(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(data);
}

/// Write bytes prefixed by a 2-byte length
pub fn write_string_len2(out: &mut Vec<u8>, data: &[u8]) -> Result<()> {
    let len = u16::try_from(data.len())
        .map_err(|_| Error::BadUsageError(format!("{} bytes exceed a u16 length", data.len())))?;
    write_int_2(out, len);
    out.extend_from_slice(data);
    Ok(())
}

/// Convert a length to the u32 used by frame headers
pub fn len_u32(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::BadUsageError(format!("{len} bytes exceed a u32 length")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_ints_little_endian() {
        let data = [0x34, 0x12, 0x78, 0x56, 0x34, 0x12, 0xAA];
        let (v2, rest) = read_int_2(&data).unwrap();
        assert_eq!(v2, 0x1234);
        let (v4, rest) = read_int_4(rest).unwrap();
        assert_eq!(v4, 0x1234_5678);
        let (v1, rest) = read_int_1(rest).unwrap();
        assert_eq!(v1, 0xAA);
        assert!(rest.is_empty());
    }

    #[test]
    fn short_input_is_malformed() {
        assert!(matches!(read_int_8(&[1, 2, 3]), Err(Error::MalformedFrame(_))));
        assert!(matches!(read_int_1(&[]), Err(Error::MalformedFrame(_))));
        assert!(matches!(
            read_string_len2(&[5, 0, b'a', b'b']),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn len2_string() {
        let mut out = Vec::new();
        write_string_len2(&mut out, b"weather").unwrap();
        assert_eq!(&out[..2], &[7, 0]);
        let (s, rest) = read_string_len2(&out).unwrap();
        assert_eq!(s, b"weather");
        assert!(rest.is_empty());
    }

    #[test]
    fn oversized_len2_string_rejected() {
        let mut out = Vec::new();
        let big = vec![0u8; 70_000];
        assert!(matches!(
            write_string_len2(&mut out, &big),
            Err(Error::BadUsageError(_))
        ));
    }
}
