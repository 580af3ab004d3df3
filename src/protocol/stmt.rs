//! Prepared statement messages.

use crate::constant::Action;
use crate::error::{Error, Result};
use crate::protocol::bind::{
    BindBuffer, ColumnDescriptor, encode_bind_buffers, read_column_descriptors,
    write_column_descriptors,
};
use crate::protocol::frame::Command;
use crate::protocol::primitive::*;
use crate::protocol::query::expect_end;

/// Build a statement prepare: meta `sql_len u32`, payload SQL
pub fn prepare(sql: &str) -> Result<Command> {
    let mut meta = Vec::with_capacity(4);
    write_int_4(&mut meta, len_u32(sql.len())?);
    Ok(Command::new(
        Action::StmtPrepare,
        meta,
        sql.as_bytes().to_vec(),
    ))
}

/// Extract the SQL of a prepare request; used by servers and test doubles
pub fn read_prepare<'a>(meta: &[u8], payload: &'a [u8]) -> Result<&'a str> {
    let (sql_len, rest) = read_int_4(meta)?;
    expect_end(rest, "prepare meta")?;
    if sql_len as usize != payload.len() {
        return Err(Error::malformed("prepare SQL length mismatch"));
    }
    simdutf8::basic::from_utf8(payload).map_err(|_| Error::malformed("SQL is not valid UTF-8"))
}

/// Decoded prepare reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareReply {
    pub stmt_id: u64,
    pub is_insert: bool,
}

/// Read a prepare reply body: `stmt_id u64 | is_insert u8`
pub fn read_prepare_reply(body: &[u8]) -> Result<PrepareReply> {
    let (stmt_id, rest) = read_int_8(body)?;
    let (is_insert, rest) = read_int_1(rest)?;
    expect_end(rest, "prepare reply")?;
    Ok(PrepareReply {
        stmt_id,
        is_insert: is_insert != 0,
    })
}

pub fn write_prepare_reply(reply: PrepareReply) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    write_int_8(&mut out, reply.stmt_id);
    write_int_1(&mut out, reply.is_insert as u8);
    out
}

/// Build a tag binding for the target table
///
/// meta: `stmt_id u64 | name_len u16 | descriptors`,
/// payload: `name ++ block`. With no tags the block is omitted.
pub fn set_tags(stmt_id: u64, table_name: &str, tags: &[BindBuffer]) -> Result<Command> {
    let name_len = u16::try_from(table_name.len())
        .map_err(|_| Error::BadUsageError(format!("table name is {} bytes", table_name.len())))?;
    let mut meta = Vec::with_capacity(12 + tags.len() * 7);
    write_int_8(&mut meta, stmt_id);
    write_int_2(&mut meta, name_len);
    write_column_descriptors(&mut meta, tags)?;

    let mut payload = table_name.as_bytes().to_vec();
    if !tags.is_empty() {
        payload.extend_from_slice(&encode_bind_buffers(tags)?);
    }
    Ok(Command::new(Action::StmtSetTags, meta, payload))
}

/// Decoded tag binding request
#[derive(Debug, Clone)]
pub struct SetTagsRequest<'a> {
    pub stmt_id: u64,
    pub table_name: &'a str,
    pub descriptors: Vec<ColumnDescriptor>,
    /// Encoded tag block, empty when no tags were bound
    pub block: &'a [u8],
}

/// Parse a tag binding request; used by servers and test doubles
pub fn read_set_tags<'a>(meta: &[u8], payload: &'a [u8]) -> Result<SetTagsRequest<'a>> {
    let (stmt_id, rest) = read_int_8(meta)?;
    let (name_len, rest) = read_int_2(rest)?;
    let (descriptors, rest) = read_column_descriptors(rest)?;
    expect_end(rest, "set tags meta")?;
    let (name, block) = read_string_fix(payload, name_len as usize)?;
    let table_name =
        simdutf8::basic::from_utf8(name).map_err(|_| Error::malformed("table name is not UTF-8"))?;
    Ok(SetTagsRequest {
        stmt_id,
        table_name,
        descriptors,
        block,
    })
}

/// Build a column binding: meta `stmt_id u64 | descriptors`, payload block
pub fn bind(stmt_id: u64, columns: &[BindBuffer]) -> Result<Command> {
    let mut meta = Vec::with_capacity(10 + columns.len() * 7);
    write_int_8(&mut meta, stmt_id);
    write_column_descriptors(&mut meta, columns)?;
    let payload = encode_bind_buffers(columns)?;
    Ok(Command::new(Action::StmtBind, meta, payload))
}

/// Decoded column binding request
#[derive(Debug, Clone)]
pub struct BindRequest<'a> {
    pub stmt_id: u64,
    pub descriptors: Vec<ColumnDescriptor>,
    pub block: &'a [u8],
}

/// Parse a column binding request; used by servers and test doubles
pub fn read_bind<'a>(meta: &[u8], payload: &'a [u8]) -> Result<BindRequest<'a>> {
    let (stmt_id, rest) = read_int_8(meta)?;
    let (descriptors, rest) = read_column_descriptors(rest)?;
    expect_end(rest, "bind meta")?;
    Ok(BindRequest {
        stmt_id,
        descriptors,
        block: payload,
    })
}

fn stmt_id_command(action: Action, stmt_id: u64) -> Command {
    let mut meta = Vec::with_capacity(8);
    write_int_8(&mut meta, stmt_id);
    Command::new(action, meta, Vec::new())
}

/// Build an execution of everything bound since the last one
pub fn exec(stmt_id: u64) -> Command {
    stmt_id_command(Action::StmtExec, stmt_id)
}

/// Build a release of the prepared statement
pub fn close(stmt_id: u64) -> Command {
    stmt_id_command(Action::StmtClose, stmt_id)
}

/// Read the leading `stmt_id u64` of any statement request meta
pub fn read_stmt_id(meta: &[u8]) -> Result<u64> {
    read_int_8(meta).map(|(stmt_id, _)| stmt_id)
}

/// Read an `affected_rows u64` body (StmtExec, InsertLines)
pub fn read_affected_rows(body: &[u8]) -> Result<u64> {
    let (affected_rows, rest) = read_int_8(body)?;
    expect_end(rest, "affected rows")?;
    Ok(affected_rows)
}

pub fn write_affected_rows(affected_rows: u64) -> Vec<u8> {
    affected_rows.to_le_bytes().to_vec()
}
