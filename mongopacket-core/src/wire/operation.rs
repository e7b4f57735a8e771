//! Typed operation records, one per opcode.
//!
//! Each reader consumes exactly the bytes its format dictates from the
//! bounded [`Cursor`]; the framer has already established the message
//! boundary, so a well-formed body leaves the cursor at (or before) the
//! end of the slice and a malformed one fails with a [`DecodeError`].

use bson::Document;
use serde::Serialize;

use crate::error::{DecodeError, Result};

use super::cursor::Cursor;
use super::header::{Header, HEADER_LEN};

/// OP_MSG flag bits 0-15 are required, 16-31 optional.
pub const MSG_FLAG_CHECKSUM_PRESENT: u32 = 1 << 0;
pub const MSG_FLAG_MORE_TO_COME: u32 = 1 << 1;
pub const MSG_FLAG_EXHAUST_ALLOWED: u32 = 1 << 16;

/// A decoded wire-protocol operation.
///
/// Serializes untagged: the JSON rendering is the concrete record's
/// fields, header included, matching what analytical sinks store in
/// their `op` column.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Operation {
    Reply(Reply),
    Update(Update),
    Insert(Insert),
    Query(Query),
    GetMore(GetMore),
    Delete(Delete),
    KillCursors(KillCursors),
    Msg(Msg),
}

impl Operation {
    /// The message header, post decompression-rewrite if any.
    pub fn header(&self) -> &Header {
        match self {
            Operation::Reply(o) => &o.header,
            Operation::Update(o) => &o.header,
            Operation::Insert(o) => &o.header,
            Operation::Query(o) => &o.header,
            Operation::GetMore(o) => &o.header,
            Operation::Delete(o) => &o.header,
            Operation::KillCursors(o) => &o.header,
            Operation::Msg(o) => &o.header,
        }
    }
}

/// OP_REPLY - sent by the database in response to OP_QUERY or OP_GET_MORE.
#[derive(Debug, Serialize)]
pub struct Reply {
    pub header: Header,
    pub flags: i32,
    pub cursor_id: i64,
    pub starting_from: i32,
    pub number_returned: i32,
    pub documents: Vec<Document>,
}

impl Reply {
    pub(super) fn read(cur: &mut Cursor<'_>, header: Header) -> Result<Self> {
        let flags = cur.read_i32("op_reply flags")?;
        let cursor_id = cur.read_i64("op_reply cursor_id")?;
        let starting_from = cur.read_i32("op_reply starting_from")?;
        let number_returned = cur.read_i32("op_reply number_returned")?;

        let mut documents = Vec::new();
        let mut n = number_returned;
        while n > 0 {
            let (doc, _) = cur.read_document()?;
            documents.push(doc);
            n -= 1;
        }

        Ok(Reply {
            header,
            flags,
            cursor_id,
            starting_from,
            number_returned,
            documents,
        })
    }
}

/// OP_UPDATE - update a document (unacknowledged).
#[derive(Debug, Serialize)]
pub struct Update {
    pub header: Header,
    pub full_collection_name: String,
    pub flags: i32,
    pub selector: Document,
    pub update: Document,
}

impl Update {
    pub(super) fn read(cur: &mut Cursor<'_>, header: Header) -> Result<Self> {
        cur.skip(4, "op_update reserved")?;
        let full_collection_name = cur.read_cstring()?;
        let flags = cur.read_i32("op_update flags")?;
        let (selector, _) = cur.read_document()?;
        let (update, _) = cur.read_document()?;
        Ok(Update {
            header,
            full_collection_name,
            flags,
            selector,
            update,
        })
    }
}

/// OP_INSERT - insert new documents (unacknowledged).
#[derive(Debug, Serialize)]
pub struct Insert {
    pub header: Header,
    pub flags: i32,
    pub full_collection_name: String,
    pub documents: Vec<Document>,
}

impl Insert {
    pub(super) fn read(cur: &mut Cursor<'_>, header: Header) -> Result<Self> {
        let flags = cur.read_i32("op_insert flags")?;
        let full_collection_name = cur.read_cstring()?;

        // One or more documents fill the rest of the message.
        let mut remaining = header.message_length as i64
            - HEADER_LEN as i64
            - 4
            - (full_collection_name.len() as i64 + 1);
        let mut documents = Vec::new();
        while remaining > 0 {
            let (doc, length) = cur.read_document()?;
            documents.push(doc);
            remaining -= length as i64;
        }

        Ok(Insert {
            header,
            flags,
            full_collection_name,
            documents,
        })
    }
}

/// OP_QUERY - query a collection.
#[derive(Debug, Serialize)]
pub struct Query {
    pub header: Header,
    pub flags: i32,
    pub full_collection_name: String,
    pub number_to_skip: i32,
    pub number_to_return: i32,
    pub query: Document,
    pub return_fields_selector: Option<Document>,
}

impl Query {
    pub(super) fn read(cur: &mut Cursor<'_>, header: Header) -> Result<Self> {
        let flags = cur.read_i32("op_query flags")?;
        let full_collection_name = cur.read_cstring()?;
        let number_to_skip = cur.read_i32("op_query number_to_skip")?;
        let number_to_return = cur.read_i32("op_query number_to_return")?;
        let (query, query_len) = cur.read_document()?;

        // The return-fields selector is present iff bytes remain.
        let leftover = header.message_length as i64
            - HEADER_LEN as i64
            - 4 // flags
            - 4 // number_to_skip
            - 4 // number_to_return
            - (full_collection_name.len() as i64 + 1)
            - query_len as i64;
        let return_fields_selector = if leftover > 0 {
            Some(cur.read_document()?.0)
        } else {
            None
        };

        Ok(Query {
            header,
            flags,
            full_collection_name,
            number_to_skip,
            number_to_return,
            query,
            return_fields_selector,
        })
    }
}

/// OP_GET_MORE - pull more data from a cursor.
#[derive(Debug, Serialize)]
pub struct GetMore {
    pub header: Header,
    pub full_collection_name: String,
    pub number_to_return: i32,
    pub cursor_id: i64,
}

impl GetMore {
    pub(super) fn read(cur: &mut Cursor<'_>, header: Header) -> Result<Self> {
        cur.skip(4, "op_get_more reserved")?;
        let full_collection_name = cur.read_cstring()?;
        let number_to_return = cur.read_i32("op_get_more number_to_return")?;
        let cursor_id = cur.read_i64("op_get_more cursor_id")?;
        Ok(GetMore {
            header,
            full_collection_name,
            number_to_return,
            cursor_id,
        })
    }
}

/// OP_DELETE - delete documents (unacknowledged).
#[derive(Debug, Serialize)]
pub struct Delete {
    pub header: Header,
    pub full_collection_name: String,
    pub flags: i32,
    pub selector: Document,
}

impl Delete {
    pub(super) fn read(cur: &mut Cursor<'_>, header: Header) -> Result<Self> {
        cur.skip(4, "op_delete reserved")?;
        let full_collection_name = cur.read_cstring()?;
        let flags = cur.read_i32("op_delete flags")?;
        let (selector, _) = cur.read_document()?;
        Ok(Delete {
            header,
            full_collection_name,
            flags,
            selector,
        })
    }
}

/// OP_KILL_CURSORS - client is finished with the given cursors.
#[derive(Debug, Serialize)]
pub struct KillCursors {
    pub header: Header,
    pub number_of_cursor_ids: i32,
    pub cursor_ids: Vec<i64>,
}

impl KillCursors {
    pub(super) fn read(cur: &mut Cursor<'_>, header: Header) -> Result<Self> {
        // The cursor count sits at offset 4; the leading word is an
        // undocumented reserved field.
        cur.skip(4, "op_kill_cursors reserved")?;
        let number_of_cursor_ids = cur.read_i32("op_kill_cursors count")?;

        let mut cursor_ids = Vec::new();
        let mut n = number_of_cursor_ids;
        while n > 0 {
            cursor_ids.push(cur.read_i64("op_kill_cursors cursor id")?);
            n -= 1;
        }

        Ok(KillCursors {
            header,
            number_of_cursor_ids,
            cursor_ids,
        })
    }
}

/// One section of an OP_MSG body.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum MsgSection {
    /// Kind 0: a single body document.
    Body(Document),
    /// Kind 1: a document sequence, retained as an opaque size.
    DocumentSequence { size: i32 },
}

/// OP_MSG - extensible message format introduced in MongoDB 3.6.
#[derive(Debug, Serialize)]
pub struct Msg {
    pub header: Header,
    pub flags: u32,
    pub sections: Vec<MsgSection>,
    pub checksum: Option<u32>,
}

impl Msg {
    pub(super) fn read(cur: &mut Cursor<'_>, header: Header) -> Result<Self> {
        let flags = cur.read_u32("op_msg flags")?;

        let mut remaining = header.message_length as i64 - HEADER_LEN as i64 - 4;
        let mut sections = Vec::new();
        let mut checksum = None;
        while remaining > 0 {
            if remaining == 4 && flags & MSG_FLAG_CHECKSUM_PRESENT != 0 {
                checksum = Some(cur.read_u32("op_msg checksum")?);
                break;
            }

            let kind = cur.read_u8("op_msg section kind")?;
            remaining -= 1;
            match kind {
                0 => {
                    let (doc, length) = cur.read_document()?;
                    sections.push(MsgSection::Body(doc));
                    remaining -= length as i64;
                }
                1 => {
                    let size = cur.read_i32("op_msg section size")?;
                    if size < 4 {
                        return Err(DecodeError::BadDocumentLength { length: size });
                    }
                    // Identifier and documents kept only as an opaque length.
                    cur.skip(size as usize - 4, "op_msg document sequence")?;
                    sections.push(MsgSection::DocumentSequence { size });
                    remaining -= size as i64;
                }
                kind => return Err(DecodeError::BadSectionKind { kind }),
            }
        }

        Ok(Msg {
            header,
            flags,
            sections,
            checksum,
        })
    }

    /// The first body document, if any. Most commands have exactly one.
    pub fn body(&self) -> Option<&Document> {
        self.sections.iter().find_map(|s| match s {
            MsgSection::Body(doc) => Some(doc),
            MsgSection::DocumentSequence { .. } => None,
        })
    }
}
