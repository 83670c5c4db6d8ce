use bytes::Bytes;

/// RESP (REdis Serialization Protocol) value as seen by the client
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Simple String: +OK\r\n
    SimpleString(String),

    /// Error: -Error message\r\n
    Error(String),

    /// Integer: :1000\r\n
    Integer(i64),

    /// Bulk String: $6\r\nfoobar\r\n or $-1\r\n for null
    BulkString(Option<Bytes>),

    /// Array: *2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n or *-1\r\n for null
    Array(Option<Vec<Value>>),
}

impl Value {
    /// Create a simple string value
    pub fn simple_string(s: impl Into<String>) -> Self {
        Value::SimpleString(s.into())
    }

    /// Create an error value
    pub fn error(s: impl Into<String>) -> Self {
        Value::Error(s.into())
    }

    /// Create an integer value
    pub fn integer(i: i64) -> Self {
        Value::Integer(i)
    }

    /// Create a bulk string value
    pub fn bulk_string(s: impl Into<Bytes>) -> Self {
        Value::BulkString(Some(s.into()))
    }

    /// Create a null bulk string value
    pub fn null_bulk_string() -> Self {
        Value::BulkString(None)
    }

    /// Create an array value
    pub fn array(arr: Vec<Value>) -> Self {
        Value::Array(Some(arr))
    }

    /// Create a null array value
    pub fn null_array() -> Self {
        Value::Array(None)
    }

    /// The OK reply
    pub fn ok() -> Self {
        Value::SimpleString("OK".to_string())
    }

    /// Return the server error message if this reply is an error
    pub fn as_error(&self) -> Option<&str> {
        match self {
            Value::Error(msg) => Some(msg),
            _ => None,
        }
    }

    /// View a reply as an integer where the protocol promises one
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// View a reply as bytes (bulk or simple string)
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::BulkString(Some(b)) => Some(b),
            Value::SimpleString(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Serialize to RESP wire bytes
    pub fn serialize(&self) -> Bytes {
        match self {
            Value::SimpleString(s) => Bytes::from(format!("+{}\r\n", s)),
            Value::Error(e) => Bytes::from(format!("-{}\r\n", e)),
            Value::Integer(i) => Bytes::from(format!(":{}\r\n", i)),
            Value::BulkString(None) => Bytes::from("$-1\r\n"),
            Value::BulkString(Some(s)) => {
                let mut result = Vec::with_capacity(s.len() + 16);
                result.extend_from_slice(format!("${}\r\n", s.len()).as_bytes());
                result.extend_from_slice(s);
                result.extend_from_slice(b"\r\n");
                Bytes::from(result)
            }
            Value::Array(None) => Bytes::from("*-1\r\n"),
            Value::Array(Some(arr)) => {
                let mut result = Vec::new();
                result.extend_from_slice(format!("*{}\r\n", arr.len()).as_bytes());
                for item in arr {
                    result.extend_from_slice(&item.serialize());
                }
                Bytes::from(result)
            }
        }
    }
}

/// Encode a request as a RESP array of bulk strings.
///
/// Every client-to-server request on the wire is an array of bulk strings:
/// the command name followed by its arguments.
pub fn encode_request(name: &str, args: &[Bytes]) -> Bytes {
    let mut parts = Vec::with_capacity(args.len() + 1);
    parts.push(Value::bulk_string(Bytes::copy_from_slice(name.as_bytes())));
    for arg in args {
        parts.push(Value::BulkString(Some(arg.clone())));
    }
    Value::array(parts).serialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_string() {
        let val = Value::simple_string("OK");
        assert_eq!(val.serialize(), Bytes::from("+OK\r\n"));
    }

    #[test]
    fn test_error() {
        let val = Value::error("Error message");
        assert_eq!(val.serialize(), Bytes::from("-Error message\r\n"));
        assert_eq!(val.as_error(), Some("Error message"));
    }

    #[test]
    fn test_integer() {
        let val = Value::integer(1000);
        assert_eq!(val.serialize(), Bytes::from(":1000\r\n"));
    }

    #[test]
    fn test_bulk_string() {
        let val = Value::bulk_string("foobar");
        assert_eq!(val.serialize(), Bytes::from("$6\r\nfoobar\r\n"));
    }

    #[test]
    fn test_null_bulk_string() {
        let val = Value::null_bulk_string();
        assert_eq!(val.serialize(), Bytes::from("$-1\r\n"));
    }

    #[test]
    fn test_array() {
        let val = Value::array(vec![Value::bulk_string("foo"), Value::bulk_string("bar")]);
        assert_eq!(
            val.serialize(),
            Bytes::from("*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n")
        );
    }

    #[test]
    fn test_encode_request() {
        let encoded = encode_request("SET", &[Bytes::from("foo"), Bytes::from("bar")]);
        assert_eq!(
            encoded,
            Bytes::from("*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n")
        );
    }
}
