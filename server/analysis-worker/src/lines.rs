//! Line splitting over a chunked byte stream, usable from blocking code.

use bytes::BytesMut;
use futures::StreamExt;
use tokio::runtime::Handle;

use crate::blob::ByteStream;
use crate::error::BlobError;

/// Iterator of decoded lines pulled from a [`ByteStream`].
///
/// Meant to run on a blocking thread: each refill drives the stream through
/// the runtime handle. Lines split on `\n`, a trailing `\r` is dropped and
/// invalid UTF-8 is replaced. A read error ends iteration and is kept for
/// [`BlockingLines::take_error`].
pub struct BlockingLines {
  handle: Handle,
  stream: ByteStream,
  buf: BytesMut,
  exhausted: bool,
  error: Option<BlobError>,
}

impl BlockingLines {
  pub fn new(handle: Handle, stream: ByteStream) -> Self {
    Self {
      handle,
      stream,
      buf: BytesMut::new(),
      exhausted: false,
      error: None,
    }
  }

  pub fn take_error(&mut self) -> Option<BlobError> {
    self.error.take()
  }
}

fn decode(line: &[u8]) -> String {
  let line = line.strip_suffix(b"\r").unwrap_or(line);
  String::from_utf8_lossy(line).into_owned()
}

impl Iterator for BlockingLines {
  type Item = String;

  fn next(&mut self) -> Option<String> {
    let mut scanned = 0;
    loop {
      if let Some(pos) = self.buf[scanned..].iter().position(|b| *b == b'\n') {
        let line = self.buf.split_to(scanned + pos + 1);
        return Some(decode(&line[..line.len() - 1]));
      }
      scanned = self.buf.len();

      if self.exhausted {
        if self.buf.is_empty() {
          return None;
        }
        let rest = self.buf.split();
        return Some(decode(&rest));
      }

      match self.handle.block_on(self.stream.next()) {
        Some(Ok(chunk)) => self.buf.extend_from_slice(&chunk),
        Some(Err(e)) => {
          self.error = Some(e);
          self.exhausted = true;
          self.buf.clear();
          return None;
        }
        None => self.exhausted = true,
      }
    }
  }
}
