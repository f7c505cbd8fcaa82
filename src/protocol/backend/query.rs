//! Result-set backend messages: RowDescription, DataRow, CommandComplete.

use std::mem::size_of;

use zerocopy::byteorder::big_endian::{I16 as I16BE, I32 as I32BE, U16 as U16BE, U32 as U32BE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::error::{Error, Result};
use crate::protocol::codec::{read_bytes, read_cstr, read_i32, read_u16};
use crate::protocol::types::{FormatCode, Oid};

/// Fixed-size tail of a field description (18 bytes).
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct FieldDescriptionTail {
    /// Table OID (0 if not a table column)
    pub table_oid: U32BE,
    /// Column attribute number (0 if not a table column)
    pub column_id: I16BE,
    pub type_oid: U32BE,
    /// Type size (-1 for variable, -2 for null-terminated)
    pub type_size: I16BE,
    pub type_modifier: I32BE,
    /// Format code (0=text, 1=binary)
    pub format: U16BE,
}

/// Field description within a RowDescription.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescription<'a> {
    pub name: &'a str,
    pub tail: &'a FieldDescriptionTail,
}

impl FieldDescription<'_> {
    /// Table OID (0 if not a table column)
    pub fn table_oid(&self) -> Oid {
        self.tail.table_oid.get()
    }

    /// Column attribute number (0 if not a table column)
    pub fn column_id(&self) -> i16 {
        self.tail.column_id.get()
    }

    /// Data type OID
    pub fn type_oid(&self) -> Oid {
        self.tail.type_oid.get()
    }

    /// Format code the column values are sent in
    pub fn format(&self) -> FormatCode {
        FormatCode::from_u16(self.tail.format.get())
    }
}

/// RowDescription message - describes the columns in a result set.
#[derive(Debug)]
pub struct RowDescription<'a> {
    fields: Vec<FieldDescription<'a>>,
}

impl<'a> RowDescription<'a> {
    /// Parse a RowDescription message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        const TAIL_SIZE: usize = size_of::<FieldDescriptionTail>();

        let (num_fields, mut data) = read_u16(payload)?;
        let mut fields = Vec::with_capacity(usize::from(num_fields));

        for _ in 0..num_fields {
            let (name, rest) = read_cstr(data)?;
            let (tail, rest) = read_bytes(rest, TAIL_SIZE)?;
            let tail = FieldDescriptionTail::ref_from_bytes(tail)?;
            fields.push(FieldDescription { name, tail });
            data = rest;
        }

        Ok(Self { fields })
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[FieldDescription<'a>] {
        &self.fields
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDescription<'a>> {
        self.fields.iter()
    }
}

/// DataRow message - contains a single row of data.
#[derive(Debug, Clone, Copy)]
pub struct DataRow<'a> {
    num_columns: u16,
    /// Column data (after the column count)
    columns_data: &'a [u8],
}

impl<'a> DataRow<'a> {
    /// Parse a DataRow message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (num_columns, columns_data) = read_u16(payload)?;
        Ok(Self {
            num_columns,
            columns_data,
        })
    }

    pub fn len(&self) -> usize {
        usize::from(self.num_columns)
    }

    pub fn is_empty(&self) -> bool {
        self.num_columns == 0
    }

    /// Iterate over column values.
    ///
    /// Each item is `Ok(None)` for NULL and `Ok(Some(bytes))` otherwise.
    pub fn iter(&self) -> DataRowIter<'a> {
        DataRowIter {
            remaining: self.columns_data,
            left: self.num_columns,
        }
    }
}

/// Iterator over column values in a DataRow.
#[derive(Debug, Clone)]
pub struct DataRowIter<'a> {
    remaining: &'a [u8],
    left: u16,
}

impl<'a> Iterator for DataRowIter<'a> {
    type Item = Result<Option<&'a [u8]>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.left == 0 {
            return None;
        }
        self.left -= 1;
        Some(self.read_column())
    }
}

impl<'a> DataRowIter<'a> {
    fn read_column(&mut self) -> Result<Option<&'a [u8]>> {
        let (len, rest) = read_i32(self.remaining)?;
        if len == -1 {
            self.remaining = rest;
            return Ok(None);
        }
        let len = usize::try_from(len)
            .map_err(|_| Error::Protocol(format!("DataRow: negative column length {len}")))?;
        let (value, rest) = read_bytes(rest, len)?;
        self.remaining = rest;
        Ok(Some(value))
    }
}

/// CommandComplete message - indicates successful completion of a command.
#[derive(Debug, Clone, Copy)]
pub struct CommandComplete<'a> {
    /// Command tag (e.g., "SELECT 5", "INSERT 0 1", "UPDATE 10")
    pub tag: &'a str,
}

impl<'a> CommandComplete<'a> {
    /// Parse a CommandComplete message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (tag, _) = read_cstr(payload)?;
        Ok(Self { tag })
    }

    /// Number of rows affected, for commands that report one.
    pub fn rows_affected(&self) -> Option<u64> {
        // "SELECT 5", "INSERT 0 1" (oid, rows), "UPDATE 10", "DELETE 3", ...
        let parts: Vec<&str> = self.tag.split_whitespace().collect();
        match parts.as_slice() {
            ["INSERT", _oid, count] => count.parse().ok(),
            ["SELECT" | "UPDATE" | "DELETE" | "COPY" | "MOVE" | "FETCH" | "MERGE", count] => {
                count.parse().ok()
            }
            _ => None,
        }
    }

    /// The command name, e.g. `INSERT`.
    pub fn command(&self) -> Option<&'a str> {
        self.tag.split_whitespace().next()
    }
}
