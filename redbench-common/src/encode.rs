/// Append one request to `buf`: an array header followed by a length-prefixed
/// bulk string per part. The first part is the command name.
///
/// ```
/// let mut buf = Vec::new();
/// redbench_common::append_command(&mut buf, ["SET", "key", "value"]);
/// assert_eq!(buf, b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n");
/// ```
pub fn append_command<I>(buf: &mut Vec<u8>, parts: I)
where
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
    I::IntoIter: ExactSizeIterator,
{
    let parts = parts.into_iter();
    append_header(buf, b'*', parts.len());
    for part in parts {
        let part = part.as_ref();
        append_header(buf, b'$', part.len());
        buf.extend_from_slice(part);
        buf.extend_from_slice(b"\r\n");
    }
}

fn append_header(buf: &mut Vec<u8>, marker: u8, len: usize) {
    buf.push(marker);
    append_decimal(buf, len);
    buf.extend_from_slice(b"\r\n");
}

fn append_decimal(buf: &mut Vec<u8>, mut n: usize) {
    // u64::MAX has 20 digits
    let mut digits = [0u8; 20];
    let mut start = digits.len();
    loop {
        start -= 1;
        digits[start] = b'0' + (n % 10) as u8;
        n /= 10;
        if n == 0 {
            break;
        }
    }
    buf.extend_from_slice(&digits[start..]);
}
