use super::types::Value;
use crate::error::{ClientError, Result};
use bytes::{Buf, Bytes, BytesMut};

/// Incremental RESP reply parser.
///
/// The client feeds raw socket bytes into the buffer and pulls complete
/// replies out one at a time; an incomplete frame yields `Ok(None)` until
/// more data arrives, while a malformed frame is a hard protocol error.
pub struct ReplyParser {
    buffer: BytesMut,
}

enum ParseError {
    /// The buffer does not (yet) hold a complete frame
    Incomplete,
    /// The frame can never become valid
    Malformed(String),
}

type ParseResult<T> = std::result::Result<T, ParseError>;

impl ReplyParser {
    /// Create a new parser with a given buffer capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Add data to the parser buffer
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Get a mutable reference to the buffer for direct socket reads
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Try to parse one complete reply from the buffer
    pub fn parse(&mut self) -> Result<Option<Value>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let mut cursor = std::io::Cursor::new(&self.buffer[..]);
        match self.parse_value(&mut cursor) {
            Ok(value) => {
                let pos = cursor.position() as usize;
                self.buffer.advance(pos);
                Ok(Some(value))
            }
            Err(ParseError::Incomplete) => Ok(None), // Need more data
            Err(ParseError::Malformed(msg)) => Err(ClientError::Protocol(msg)),
        }
    }

    fn parse_value(&self, cursor: &mut std::io::Cursor<&[u8]>) -> ParseResult<Value> {
        if cursor.position() >= cursor.get_ref().len() as u64 {
            return Err(ParseError::Incomplete);
        }

        let byte = cursor.get_ref()[cursor.position() as usize];
        cursor.set_position(cursor.position() + 1);

        match byte {
            b'+' => Ok(Value::SimpleString(self.read_line(cursor)?)),
            b'-' => Ok(Value::Error(self.read_line(cursor)?)),
            b':' => self.parse_integer(cursor),
            b'$' => self.parse_bulk_string(cursor),
            b'*' => self.parse_array(cursor),
            _ => Err(ParseError::Malformed(format!(
                "Invalid RESP type marker: {}",
                byte as char
            ))),
        }
    }

    fn parse_integer(&self, cursor: &mut std::io::Cursor<&[u8]>) -> ParseResult<Value> {
        let line = self.read_line(cursor)?;
        let num = line
            .parse::<i64>()
            .map_err(|_| ParseError::Malformed(format!("Invalid integer: {}", line)))?;
        Ok(Value::Integer(num))
    }

    fn parse_bulk_string(&self, cursor: &mut std::io::Cursor<&[u8]>) -> ParseResult<Value> {
        let line = self.read_line(cursor)?;
        let len = line
            .parse::<i64>()
            .map_err(|_| ParseError::Malformed(format!("Invalid bulk string length: {}", line)))?;

        if len == -1 {
            return Ok(Value::BulkString(None));
        }
        if len < 0 {
            return Err(ParseError::Malformed(format!(
                "Invalid bulk string length: {}",
                len
            )));
        }

        let len = len as usize;
        let pos = cursor.position() as usize;
        let data = cursor.get_ref();

        if pos + len + 2 > data.len() {
            return Err(ParseError::Incomplete);
        }

        let bytes = Bytes::copy_from_slice(&data[pos..pos + len]);
        cursor.set_position((pos + len + 2) as u64); // Skip \r\n

        Ok(Value::BulkString(Some(bytes)))
    }

    fn parse_array(&self, cursor: &mut std::io::Cursor<&[u8]>) -> ParseResult<Value> {
        let line = self.read_line(cursor)?;
        let len = line
            .parse::<i64>()
            .map_err(|_| ParseError::Malformed(format!("Invalid array length: {}", line)))?;

        if len == -1 {
            return Ok(Value::Array(None));
        }
        if len < 0 {
            return Err(ParseError::Malformed(format!("Invalid array length: {}", len)));
        }

        let mut array = Vec::with_capacity(len as usize);
        for _ in 0..len {
            array.push(self.parse_value(cursor)?);
        }

        Ok(Value::Array(Some(array)))
    }

    fn read_line(&self, cursor: &mut std::io::Cursor<&[u8]>) -> ParseResult<String> {
        let start = cursor.position() as usize;
        let data = cursor.get_ref();

        if data.len() < 2 {
            return Err(ParseError::Incomplete);
        }

        for i in start..data.len() - 1 {
            if data[i] == b'\r' && data[i + 1] == b'\n' {
                let line = String::from_utf8_lossy(&data[start..i]).to_string();
                cursor.set_position((i + 2) as u64);
                return Ok(line);
            }
        }

        Err(ParseError::Incomplete)
    }
}

/// Parse a single complete reply from an already-buffered byte slice.
pub fn parse_one(data: &[u8]) -> Result<Value> {
    let mut parser = ReplyParser::new(data.len());
    parser.feed(data);
    parser
        .parse()?
        .ok_or_else(|| ClientError::Protocol("incomplete reply".to_string()))
}
