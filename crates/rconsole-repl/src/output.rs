use std::io::{self, Write};

/// Writes `\r\n` for every bare `\n`.
///
/// The console's terminal runs in raw mode, where the line discipline no
/// longer adds the carriage return.
pub struct CrlfWriter<W: Write> {
    inner: W,
    last: Option<u8>,
}

impl<W: Write> CrlfWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, last: None }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CrlfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut translated = Vec::with_capacity(buf.len() + 8);
        for &byte in buf {
            if byte == b'\n' && self.last != Some(b'\r') {
                translated.push(b'\r');
            }
            translated.push(byte);
            self.last = Some(byte);
        }
        self.inner.write_all(&translated)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translate(chunks: &[&str]) -> String {
        let mut writer = CrlfWriter::new(Vec::new());
        for chunk in chunks {
            writer.write_all(chunk.as_bytes()).unwrap();
        }
        String::from_utf8(writer.into_inner()).unwrap()
    }

    #[test]
    fn test_bare_newlines_gain_carriage_return() {
        assert_eq!(translate(&["a\nb\n"]), "a\r\nb\r\n");
    }

    #[test]
    fn test_existing_crlf_is_untouched() {
        assert_eq!(translate(&["a\r\n"]), "a\r\n");
        assert_eq!(translate(&["a\r", "\n"]), "a\r\n");
    }
}
