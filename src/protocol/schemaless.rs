//! Schemaless line protocol insertion.

use crate::constant::{Action, Precision, SchemalessProtocol};
use crate::error::{Error, Result};
use crate::protocol::frame::Command;
use crate::protocol::primitive::*;

/// Build a line insertion
///
/// meta: `protocol u8 | precision u8 | lines_len u32`,
/// payload: lines joined by `\n`
pub fn insert_lines<S: AsRef<str>>(lines: &[S], precision: Precision) -> Result<Command> {
    if lines.is_empty() {
        return Err(Error::BadUsageError("no lines to insert".into()));
    }

    let mut payload = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let line = line.as_ref();
        if line.contains('\n') {
            return Err(Error::BadUsageError(format!("line {i} contains a newline")));
        }
        if i > 0 {
            payload.push(b'\n');
        }
        write_bytes_fix(&mut payload, line.as_bytes());
    }

    let mut meta = Vec::with_capacity(6);
    write_int_1(&mut meta, SchemalessProtocol::Line as u8);
    write_int_1(&mut meta, precision as u8);
    write_int_4(&mut meta, len_u32(payload.len())?);
    Ok(Command::new(Action::InsertLines, meta, payload))
}

/// Decoded line insertion
#[derive(Debug, Clone)]
pub struct InsertLinesRequest<'a> {
    pub protocol: SchemalessProtocol,
    pub precision: Precision,
    pub lines: Vec<&'a str>,
}

/// Parse a line insertion; used by servers and test doubles
pub fn read_insert_lines<'a>(meta: &[u8], payload: &'a [u8]) -> Result<InsertLinesRequest<'a>> {
    let (protocol, rest) = read_int_1(meta)?;
    let protocol = SchemalessProtocol::from_u8(protocol)
        .ok_or_else(|| Error::MalformedFrame(format!("unknown schemaless protocol {protocol}")))?;
    let (precision, rest) = read_int_1(rest)?;
    let precision = Precision::from_u8(precision)
        .ok_or_else(|| Error::MalformedFrame(format!("unknown precision {precision}")))?;
    let (lines_len, _) = read_int_4(rest)?;
    if lines_len as usize != payload.len() {
        return Err(Error::malformed("line payload length mismatch"));
    }
    let text =
        simdutf8::basic::from_utf8(payload).map_err(|_| Error::malformed("lines are not UTF-8"))?;
    Ok(InsertLinesRequest {
        protocol,
        precision,
        lines: text.split('\n').collect(),
    })
}
