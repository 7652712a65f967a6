//! Delimiter-separated values codec.
//!
//! The reader pulls one physical line at a time and only buffers the record
//! being parsed, so arbitrarily large inputs stream in bounded memory. The
//! writer side is a pair of pure encoding helpers used by the export
//! pipeline.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::error::{BridgeError, Result};

/// UTF-8 byte order mark, dropped from the start of the input.
const BOM: &[u8] = b"\xef\xbb\xbf";

/// Separators accepted for import and export.
pub const SEPARATORS: [char; 3] = [',', '\t', ';'];

/// Field scanner state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// At the first character of a field.
    FieldStart,
    Unquoted,
    Quoted,
    /// Saw `"` inside a quoted field: either an escaped quote or the close.
    QuoteInQuoted,
    /// Malformed record; discard input up to the end of the line.
    Skipping,
}

/// Streaming DSV record reader.
///
/// Records end at `\n` or `\r\n`. When quoting is enabled a field that starts
/// with `"` may contain separators and line breaks, and `""` inside it is a
/// literal quote. A blank line reads as a record with one empty field; the
/// caller decides whether that is a row.
pub struct DsvReader<R> {
    input: BufReader<R>,
    separator: char,
    quotes: bool,
    line: Vec<u8>,
    records: u64,
    at_start: bool,
}

impl<R: AsyncRead + Unpin> DsvReader<R> {
    pub fn new(input: R, separator: char, quotes: bool) -> Self {
        Self {
            input: BufReader::new(input),
            separator,
            quotes,
            line: Vec::new(),
            records: 0,
            at_start: true,
        }
    }

    /// Read the next record.
    ///
    /// A malformed record yields `BridgeError::Parse` whose `row` is the
    /// 0-based record position in the input; the reader is left at the next
    /// record so the caller may continue. I/O errors are fatal.
    pub async fn next_record(&mut self) -> Result<Option<Vec<String>>> {
        let mut fields: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut state = State::FieldStart;
        let mut error: Option<String> = None;
        let mut started = false;

        loop {
            self.line.clear();
            let n = self.input.read_until(b'\n', &mut self.line).await?;
            if self.at_start {
                self.at_start = false;
                if self.line.starts_with(BOM) {
                    self.line.drain(..BOM.len());
                }
            }
            if n == 0 {
                if !started {
                    return Ok(None);
                }
                if state == State::Quoted {
                    error.get_or_insert_with(|| "unterminated quoted field".to_string());
                }
                break;
            }

            let (body, terminator) = split_terminator(&self.line);
            let text = match std::str::from_utf8(body) {
                Ok(t) => t,
                Err(e) => {
                    error.get_or_insert_with(|| format!("invalid UTF-8: {}", e));
                    state = State::Skipping;
                    ""
                }
            };

            started = true;

            for ch in text.chars() {
                state = match (state, ch) {
                    (State::Skipping, _) => State::Skipping,
                    (State::FieldStart, '"') if self.quotes => State::Quoted,
                    (State::FieldStart | State::Unquoted, c) if c == self.separator => {
                        fields.push(std::mem::take(&mut current));
                        State::FieldStart
                    }
                    (State::FieldStart | State::Unquoted, c) => {
                        current.push(c);
                        State::Unquoted
                    }
                    (State::Quoted, '"') => State::QuoteInQuoted,
                    (State::Quoted, c) => {
                        current.push(c);
                        State::Quoted
                    }
                    (State::QuoteInQuoted, '"') => {
                        current.push('"');
                        State::Quoted
                    }
                    (State::QuoteInQuoted, c) if c == self.separator => {
                        fields.push(std::mem::take(&mut current));
                        State::FieldStart
                    }
                    (State::QuoteInQuoted, c) => {
                        error.get_or_insert_with(|| {
                            format!("unexpected character '{}' after closing quote", c)
                        });
                        State::Skipping
                    }
                };
            }

            if state == State::Quoted {
                current.push_str(terminator);
                if terminator.is_empty() {
                    // EOF inside a quoted field
                    error.get_or_insert_with(|| "unterminated quoted field".to_string());
                    break;
                }
                continue;
            }
            break;
        }

        let row = self.records;
        self.records += 1;
        if let Some(message) = error {
            return Err(BridgeError::parse(row, message));
        }
        fields.push(current);
        Ok(Some(fields))
    }
}

fn split_terminator(line: &[u8]) -> (&[u8], &'static str) {
    if let Some(body) = line.strip_suffix(b"\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix(b"\n") {
        (body, "\n")
    } else {
        (line, "")
    }
}

/// Encode one field for output.
///
/// Absent and empty values become `null_token` and are never quoted.
pub fn encode_field(value: Option<&str>, quote: bool, null_token: &str, out: &mut String) {
    match value {
        None | Some("") => out.push_str(null_token),
        Some(v) if quote => {
            out.push('"');
            out.push_str(&v.replace('"', "\"\""));
            out.push('"');
        }
        Some(v) => out.push_str(v),
    }
}

/// Encode one record, including the trailing newline.
pub fn encode_record<'a, I>(
    values: I,
    separator: char,
    quote: bool,
    null_token: &str,
    newline: &str,
) -> String
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut out = String::new();
    for (i, value) in values.into_iter().enumerate() {
        if i > 0 {
            out.push(separator);
        }
        encode_field(value, quote, null_token, &mut out);
    }
    out.push_str(newline);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read_all(input: &str, sep: char, quotes: bool) -> Vec<Result<Vec<String>>> {
        let mut reader = DsvReader::new(input.as_bytes(), sep, quotes);
        let mut out = Vec::new();
        loop {
            match reader.next_record().await {
                Ok(Some(r)) => out.push(Ok(r)),
                Ok(None) => break,
                Err(e) => out.push(Err(e)),
            }
        }
        out
    }

    fn ok(records: Vec<Result<Vec<String>>>) -> Vec<Vec<String>> {
        records.into_iter().map(|r| r.unwrap()).collect()
    }

    #[tokio::test]
    async fn test_plain_records() {
        let records = ok(read_all("a,b,c\n1,,3\r\n4,5,6", ',', false).await);
        assert_eq!(records[0], vec!["a", "b", "c"]);
        assert_eq!(records[1], vec!["1", "", "3"]);
        assert_eq!(records[2], vec!["4", "5", "6"]);
    }

    #[tokio::test]
    async fn test_quotes_disabled_keeps_quote_characters() {
        let records = ok(read_all("\"a;b\";c\n", ';', false).await);
        assert_eq!(records[0], vec!["\"a", "b\"", "c"]);
    }

    #[tokio::test]
    async fn test_quoted_fields_with_separators_and_newlines() {
        let input = "id\tnote\n1\t\"tab\there\"\n2\t\"two\r\nlines\"\n3\t\"say \"\"hi\"\"\"\n";
        let records = ok(read_all(input, '\t', true).await);
        assert_eq!(records.len(), 4);
        assert_eq!(records[1], vec!["1", "tab\there"]);
        assert_eq!(records[2], vec!["2", "two\r\nlines"]);
        assert_eq!(records[3], vec!["3", "say \"hi\""]);
    }

    #[tokio::test]
    async fn test_blank_lines_read_as_one_empty_field() {
        let records = ok(read_all("a\n\r\n\nb\n", ',', true).await);
        assert_eq!(records, vec![vec!["a"], vec![""], vec![""], vec!["b"]]);
    }

    #[tokio::test]
    async fn test_leading_byte_order_mark_dropped() {
        let records = ok(read_all("\u{feff}id,name\n1,\u{feff}x\n", ',', false).await);
        assert_eq!(records[0], vec!["id", "name"]);
        assert_eq!(records[1], vec!["1", "\u{feff}x"]);
    }

    #[tokio::test]
    async fn test_malformed_record_recovers() {
        let records = read_all("1,\"ok\"\n2,\"bad\"x\n3,\"ok\"\n", ',', true).await;
        assert_eq!(records.len(), 3);
        assert!(records[0].is_ok());
        match &records[1] {
            Err(BridgeError::Parse { row, .. }) => assert_eq!(*row, 1),
            other => panic!("expected parse error, got {:?}", other),
        }
        assert_eq!(records[2].as_ref().unwrap(), &vec!["3", "ok"]);
    }

    #[tokio::test]
    async fn test_unterminated_quote_at_eof() {
        let records = read_all("1,\"never closed\nmore", ',', true).await;
        assert_eq!(records.len(), 1);
        assert!(matches!(records[0], Err(BridgeError::Parse { row: 0, .. })));
    }

    #[test]
    fn test_encode_record() {
        let line = encode_record(
            [Some("a"), None, Some(""), Some("x\"y")],
            ',',
            true,
            "NULL",
            "\r\n",
        );
        assert_eq!(line, "\"a\",NULL,NULL,\"x\"\"y\"\r\n");

        let line = encode_record([Some("1"), Some("b")], '\t', false, "", "\n");
        assert_eq!(line, "1\tb\n");
    }
}
