/// Inclusive byte span inside a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeError {
    /// Syntax the server does not accept: 400.
    Invalid,
    /// Well-formed but starts past the end of the file: 416.
    Unsatisfiable,
}

impl std::fmt::Display for RangeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RangeError::Invalid => write!(f, "malformed range header"),
            RangeError::Unsatisfiable => write!(f, "range not satisfiable"),
        }
    }
}

impl std::error::Error for RangeError {}

pub fn unsatisfiable_content_range(size: u64) -> String {
    format!("bytes */{}", size)
}

/// Parses a single `bytes=` range against a file of `size` bytes.
///
/// Accepts `start-end`, `start-` and the suffix form `-count`. An end past
/// EOF is clamped. Lists of ranges and `end < start` are rejected as invalid.
pub fn parse_range_header(value: &str, size: u64) -> Result<ByteRange, RangeError> {
    let spec = value
        .trim()
        .strip_prefix("bytes=")
        .ok_or(RangeError::Invalid)?
        .trim();
    if spec.contains(',') {
        return Err(RangeError::Invalid);
    }
    let (start_str, end_str) = spec.split_once('-').ok_or(RangeError::Invalid)?;
    let (start_str, end_str) = (start_str.trim(), end_str.trim());

    if start_str.is_empty() {
        let count = parse_number(end_str)?;
        if count == 0 || size == 0 {
            return Err(RangeError::Unsatisfiable);
        }
        return Ok(ByteRange {
            start: size.saturating_sub(count),
            end: size - 1,
        });
    }

    let start = parse_number(start_str)?;
    let end = if end_str.is_empty() {
        None
    } else {
        Some(parse_number(end_str)?)
    };
    if let Some(end) = end {
        if end < start {
            return Err(RangeError::Invalid);
        }
    }
    if start >= size {
        return Err(RangeError::Unsatisfiable);
    }

    let last = size - 1;
    Ok(ByteRange {
        start,
        end: end.map_or(last, |end| end.min(last)),
    })
}

fn parse_number(value: &str) -> Result<u64, RangeError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RangeError::Invalid);
    }
    value.parse().map_err(|_| RangeError::Invalid)
}
