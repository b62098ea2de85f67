use crate::{ProtocolError, Result, DEFAULT_MAX_DEPTH, MAX_BULK_LEN, MAX_LINE_LEN};

/// Outcome of one [`FrameScanner::scan`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scanned {
    /// Bytes of the input that belong to frames seen so far and may be dropped.
    pub consumed: usize,
    /// Top-level frames completed during this call.
    pub frames: usize,
    /// How many of `frames` were error replies (`-` or `!`).
    pub error_frames: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    /// Waiting for a complete CRLF-terminated header line.
    Header,
    /// Bulk payload bytes still to skip.
    Payload(usize),
    /// CRLF after a bulk payload; holds how many of its two bytes were matched.
    Terminator(usize),
}

/// Resumable scanner that counts complete frames in a byte stream without
/// decoding their values.
///
/// The caller owns the buffer: it appends whatever the socket returned, calls
/// [`scan`](Self::scan), then drops `consumed` bytes from the front. A partial
/// header line is left unconsumed until its CRLF arrives; a partial bulk
/// payload is consumed as it arrives and tracked by a bytes-still-needed
/// counter, so large replies never accumulate in the buffer.
#[derive(Debug, Clone)]
pub struct FrameScanner {
    /// Elements still expected by each open aggregate, innermost last.
    open: Vec<usize>,
    pending: Pending,
    max_depth: usize,
}

impl Default for FrameScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameScanner {
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_DEPTH)
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            open: Vec::new(),
            pending: Pending::Header,
            max_depth,
        }
    }

    /// `true` when no frame is partially scanned.
    pub fn is_idle(&self) -> bool {
        self.open.is_empty() && self.pending == Pending::Header
    }

    /// Scan `input` from the start, stopping after `limit` complete frames or
    /// when the input runs out.
    pub fn scan(&mut self, input: &[u8], limit: usize) -> Result<Scanned> {
        let mut out = Scanned::default();
        while out.frames < limit {
            match self.pending {
                Pending::Payload(remaining) => {
                    let available = input.len() - out.consumed;
                    if available == 0 {
                        break;
                    }
                    let take = remaining.min(available);
                    out.consumed += take;
                    self.pending = if take == remaining {
                        Pending::Terminator(0)
                    } else {
                        Pending::Payload(remaining - take)
                    };
                }
                Pending::Terminator(matched) => {
                    let Some(&byte) = input.get(out.consumed) else {
                        break;
                    };
                    if byte != b"\r\n"[matched] {
                        return Err(ProtocolError::MissingTerminator);
                    }
                    out.consumed += 1;
                    if matched == 0 {
                        self.pending = Pending::Terminator(1);
                    } else {
                        self.pending = Pending::Header;
                        self.finish_element(&mut out, false);
                    }
                }
                Pending::Header => {
                    let rest = &input[out.consumed..];
                    let Some(lf) = rest.iter().position(|&b| b == b'\n') else {
                        if rest.len() > MAX_LINE_LEN {
                            return Err(ProtocolError::LineTooLong(MAX_LINE_LEN));
                        }
                        break;
                    };
                    if lf > MAX_LINE_LEN {
                        return Err(ProtocolError::LineTooLong(MAX_LINE_LEN));
                    }
                    if lf == 0 || rest[lf - 1] != b'\r' {
                        return Err(ProtocolError::MalformedLine);
                    }
                    out.consumed += lf + 1;
                    self.header(&rest[..lf - 1], &mut out)?;
                }
            }
        }
        Ok(out)
    }

    fn header(&mut self, line: &[u8], out: &mut Scanned) -> Result<()> {
        let (&marker, body) = line.split_first().ok_or(ProtocolError::MalformedLine)?;
        match marker {
            // status, integer, and the single-line RESP3 scalars
            b'+' | b':' | b'_' | b',' | b'#' | b'(' => self.finish_element(out, false),
            b'-' => self.finish_element(out, true),
            b'$' | b'=' | b'!' => match parse_len(body, MAX_BULK_LEN)? {
                None => self.finish_element(out, false),
                Some(len) => {
                    self.pending = if len == 0 {
                        Pending::Terminator(0)
                    } else {
                        Pending::Payload(len)
                    };
                    if marker == b'!' && self.open.is_empty() {
                        out.error_frames += 1;
                    }
                }
            },
            b'*' | b'~' | b'>' | b'%' => match parse_len(body, usize::MAX / 2)? {
                None | Some(0) => self.finish_element(out, false),
                Some(len) => {
                    if self.open.len() >= self.max_depth {
                        return Err(ProtocolError::TooDeep(self.max_depth));
                    }
                    // a map carries a key and a value per entry
                    let elements = if marker == b'%' { len * 2 } else { len };
                    self.open.push(elements);
                }
            },
            other => return Err(ProtocolError::UnexpectedType(other)),
        }
        Ok(())
    }

    /// Close one element, unwinding every aggregate it completes.
    fn finish_element(&mut self, out: &mut Scanned, is_error: bool) {
        if is_error && self.open.is_empty() {
            out.error_frames += 1;
        }
        while let Some(remaining) = self.open.last_mut() {
            *remaining -= 1;
            if *remaining > 0 {
                return;
            }
            self.open.pop();
        }
        out.frames += 1;
    }
}

/// Parse a decimal length; `-1` means a null frame.
fn parse_len(digits: &[u8], max: usize) -> Result<Option<usize>> {
    let invalid = || ProtocolError::InvalidLength(String::from_utf8_lossy(digits).into_owned());
    if digits == b"-1" {
        return Ok(None);
    }
    if digits.is_empty() || digits.len() > 20 {
        return Err(invalid());
    }
    let mut len: usize = 0;
    for &d in digits {
        if !d.is_ascii_digit() {
            return Err(invalid());
        }
        len = len
            .checked_mul(10)
            .and_then(|n| n.checked_add((d - b'0') as usize))
            .ok_or_else(invalid)?;
    }
    if len > max {
        return Err(invalid());
    }
    Ok(Some(len))
}
