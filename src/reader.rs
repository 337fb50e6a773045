//! 1 行読み取り。REPL ループは [`LineReader`] 経由で入力を受け取る。

use std::io::{self, BufRead};

/// 1 プロンプトにつき 1 行を供給する。
pub trait LineReader {
    /// 改行を除いた 1 行を返す。入力終端なら `Ok(None)`。
    fn read_line(&mut self) -> io::Result<Option<String>>;
}

/// 任意の `BufRead` から行を読む実装。通常は stdin をロックして使う。
pub struct BufLineReader<R> {
    inner: R,
}

impl<R: BufRead> BufLineReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: BufRead> LineReader for BufLineReader<R> {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut buf = String::new();
        loop {
            match self.inner.read_line(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                // SA_RESTART でも read が EINTR を返す環境がある
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        let trimmed = buf.trim_end_matches(['\n', '\r']).len();
        buf.truncate(trimmed);
        Ok(Some(buf))
    }
}

/// stdin から読む [`LineReader`]。
pub fn stdin_reader() -> BufLineReader<io::StdinLock<'static>> {
    BufLineReader::new(io::stdin().lock())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_lines_until_eof() {
        let mut reader = BufLineReader::new(Cursor::new("ls -la\r\necho hi\nlast"));
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("ls -la"));
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("echo hi"));
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("last"));
        assert_eq!(reader.read_line().unwrap(), None);
    }

    #[test]
    fn empty_line_is_not_eof() {
        let mut reader = BufLineReader::new(Cursor::new("\n"));
        assert_eq!(reader.read_line().unwrap().as_deref(), Some(""));
        assert_eq!(reader.read_line().unwrap(), None);
    }
}
