//! Binary query, fetch and free-result messages.

use crate::col::ColumnMeta;
use crate::constant::{Action, BINARY_QUERY_VERSION, Precision};
use crate::error::{Error, Result};
use crate::protocol::block::{ResultBlock, decode_block};
use crate::protocol::frame::Command;
use crate::protocol::primitive::*;

/// Build a binary query
///
/// meta: `version u16 | sql_len u32`, payload: SQL bytes
pub fn binary_query(sql: &str) -> Result<Command> {
    let mut meta = Vec::with_capacity(6);
    write_int_2(&mut meta, BINARY_QUERY_VERSION);
    write_int_4(&mut meta, len_u32(sql.len())?);
    Ok(Command::new(
        Action::BinaryQuery,
        meta,
        sql.as_bytes().to_vec(),
    ))
}

/// Extract the SQL text of a binary query; used by servers and test doubles
pub fn read_binary_query<'a>(meta: &[u8], payload: &'a [u8]) -> Result<&'a str> {
    let (version, rest) = read_int_2(meta)?;
    if version != BINARY_QUERY_VERSION {
        return Err(Error::MalformedFrame(format!(
            "binary query version {version}"
        )));
    }
    let (sql_len, _) = read_int_4(rest)?;
    if sql_len as usize != payload.len() {
        return Err(Error::MalformedFrame(format!(
            "binary query declares {} SQL bytes, payload has {}",
            sql_len,
            payload.len()
        )));
    }
    simdutf8::basic::from_utf8(payload).map_err(|_| Error::malformed("SQL is not valid UTF-8"))
}

/// Schema and first block of a query that produced rows
#[derive(Debug, Clone)]
pub struct ResultSetHeader {
    pub result_id: u64,
    pub precision: Precision,
    pub schema: Vec<ColumnMeta>,
    pub first_block: Option<ResultBlock>,
}

/// Decoded binary query reply
#[derive(Debug, Clone)]
pub enum QueryReply {
    Update { affected_rows: u64 },
    ResultSet(ResultSetHeader),
}

/// Read a binary query reply body
///
/// ```text
/// is_update u8
/// 1: affected_rows u64
/// 0: result_id u64 | precision u8 | field_count u16 | field* | has_block u8 | block?
/// ```
pub fn read_query_reply(body: &[u8]) -> Result<QueryReply> {
    let (is_update, rest) = read_int_1(body)?;
    if is_update != 0 {
        let (affected_rows, rest) = read_int_8(rest)?;
        expect_end(rest, "update reply")?;
        return Ok(QueryReply::Update { affected_rows });
    }

    let (result_id, rest) = read_int_8(rest)?;
    let (precision_tag, rest) = read_int_1(rest)?;
    let precision = Precision::from_u8(precision_tag)
        .ok_or_else(|| Error::MalformedFrame(format!("unknown precision {precision_tag}")))?;
    let (field_count, mut rest) = read_int_2(rest)?;

    let mut schema = Vec::with_capacity(field_count as usize);
    for _ in 0..field_count {
        let (meta, r) = ColumnMeta::read(rest, precision)?;
        schema.push(meta);
        rest = r;
    }

    let (has_block, rest) = read_int_1(rest)?;
    let first_block = if has_block != 0 {
        Some(decode_block(&schema, rest)?)
    } else {
        expect_end(rest, "result set reply")?;
        None
    };

    Ok(QueryReply::ResultSet(ResultSetHeader {
        result_id,
        precision,
        schema,
        first_block,
    }))
}

/// Encode an update reply body; used by servers and test doubles
pub fn write_update_reply(affected_rows: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    write_int_1(&mut out, 1);
    write_int_8(&mut out, affected_rows);
    out
}

/// Encode a result set reply body; used by servers and test doubles
///
/// `first_block` is an already encoded block.
pub fn write_result_set_reply(
    result_id: u64,
    precision: Precision,
    schema: &[ColumnMeta],
    first_block: Option<&[u8]>,
) -> Result<Vec<u8>> {
    let field_count = u16::try_from(schema.len())
        .map_err(|_| Error::BadUsageError(format!("{} fields", schema.len())))?;
    let mut out = Vec::new();
    write_int_1(&mut out, 0);
    write_int_8(&mut out, result_id);
    write_int_1(&mut out, precision as u8);
    write_int_2(&mut out, field_count);
    for meta in schema {
        meta.write(&mut out)?;
    }
    match first_block {
        Some(block) => {
            write_int_1(&mut out, 1);
            write_bytes_fix(&mut out, block);
        }
        None => write_int_1(&mut out, 0),
    }
    Ok(out)
}

fn result_id_command(action: Action, result_id: u64) -> Command {
    let mut meta = Vec::with_capacity(8);
    write_int_8(&mut meta, result_id);
    Command::new(action, meta, Vec::new())
}

/// Build a fetch of the next block of `result_id`
pub fn fetch(result_id: u64) -> Command {
    result_id_command(Action::Fetch, result_id)
}

/// Build a release of a result the server still holds
pub fn free_result(result_id: u64) -> Command {
    result_id_command(Action::FreeResult, result_id)
}

/// Read the `result_id u64` meta of Fetch and FreeResult
pub fn read_result_id(meta: &[u8]) -> Result<u64> {
    let (result_id, rest) = read_int_8(meta)?;
    expect_end(rest, "result id meta")?;
    Ok(result_id)
}

/// Decoded fetch reply
#[derive(Debug, Clone)]
pub enum FetchReply {
    /// The result is exhausted and released by the server
    Completed,
    Block(ResultBlock),
}

/// Read a fetch reply body: `completed u8` then one block if not completed
pub fn read_fetch_reply(schema: &[ColumnMeta], body: &[u8]) -> Result<FetchReply> {
    let (completed, rest) = read_int_1(body)?;
    if completed != 0 {
        expect_end(rest, "completed fetch reply")?;
        return Ok(FetchReply::Completed);
    }
    Ok(FetchReply::Block(decode_block(schema, rest)?))
}

/// Encode a fetch reply body; `None` reports completion
pub fn write_fetch_reply(block: Option<&[u8]>) -> Vec<u8> {
    match block {
        Some(block) => {
            let mut out = Vec::with_capacity(1 + block.len());
            write_int_1(&mut out, 0);
            write_bytes_fix(&mut out, block);
            out
        }
        None => vec![1],
    }
}

pub(crate) fn expect_end(rest: &[u8], what: &str) -> Result<()> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(Error::MalformedFrame(format!(
            "{} trailing bytes after {}",
            rest.len(),
            what
        )))
    }
}
