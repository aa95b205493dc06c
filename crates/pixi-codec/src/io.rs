//! Stream plumbing shared by the sync and async decode paths.
//!
//! Both surfaces need two things the standard traits do not give directly:
//! a byte position for diagnostics, and a tolerant fill loop that keeps
//! reading until the buffer is full or the stream reports end-of-input.

use std::io::{self, Read};

use tokio::io::{AsyncRead, AsyncReadExt};

/// Blocking reader wrapper that counts every byte consumed.
pub(crate) struct CountingReader<R> {
    inner: R,
    position: u64,
}

impl<R: Read> CountingReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    /// Bytes consumed from the underlying stream so far.
    pub(crate) fn position(&self) -> u64 {
        self.position
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.position += read as u64;
        Ok(read)
    }
}

/// Fill `buf` from `reader`, looping on short reads. Returns the number of
/// bytes actually placed, which is less than `buf.len()` only at
/// end-of-stream. A zero-byte read terminates the loop; it never errors on
/// its own.
pub(crate) fn read_up_to<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let read = reader.read(&mut buf[total..])?;
        if read == 0 {
            break;
        }
        total += read;
    }
    Ok(total)
}

/// Async reader with a position counter and a carry buffer.
///
/// The metadata blob is self-delimited, so the async decoder cannot know its
/// length up front; it buffers chunks until the codec accepts them and hands
/// the surplus back here via [`Self::unread`]. Subsequent reads drain the
/// carry before touching the underlying stream, and the position reflects
/// only bytes actually delivered to the caller.
pub(crate) struct AsyncSource<R> {
    inner: R,
    carry: Vec<u8>,
    position: u64,
}

impl<R: AsyncRead + Unpin> AsyncSource<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner,
            carry: Vec::new(),
            position: 0,
        }
    }

    pub(crate) fn position(&self) -> u64 {
        self.position
    }

    /// Return bytes the caller over-read so the next read sees them again.
    pub(crate) fn unread(&mut self, bytes: &[u8]) {
        debug_assert!(self.carry.is_empty());
        self.carry = bytes.to_vec();
        self.position -= bytes.len() as u64;
    }

    pub(crate) async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.carry.is_empty() {
            let take = self.carry.len().min(buf.len());
            buf[..take].copy_from_slice(&self.carry[..take]);
            self.carry.drain(..take);
            self.position += take as u64;
            return Ok(take);
        }
        let read = self.inner.read(buf).await?;
        self.position += read as u64;
        Ok(read)
    }

    /// Async twin of [`read_up_to`].
    pub(crate) async fn read_up_to(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut total = 0;
        while total < buf.len() {
            let read = self.read(&mut buf[total..]).await?;
            if read == 0 {
                break;
            }
            total += read;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    /// Reader that hands out at most two bytes per call, to exercise the
    /// short-read loop.
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let take = self.0.len().min(buf.len()).min(2);
            buf[..take].copy_from_slice(&self.0[..take]);
            self.0 = &self.0[take..];
            Ok(take)
        }
    }

    #[test]
    fn read_up_to_loops_over_short_reads() {
        let mut reader = Trickle(&[1, 2, 3, 4, 5, 6, 7]);
        let mut buf = [0u8; 7];
        assert_eq!(read_up_to(&mut reader, &mut buf).unwrap(), 7);
        assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn read_up_to_reports_shortfall_at_eof() {
        let mut reader = Trickle(&[1, 2, 3]);
        let mut buf = [0u8; 8];
        assert_eq!(read_up_to(&mut reader, &mut buf).unwrap(), 3);
    }

    #[test]
    fn read_up_to_accepts_unsized_readers() {
        let data = [5u8, 6, 7];
        let mut inner = &data[..];
        let reader: &mut dyn Read = &mut inner;
        let mut buf = [0u8; 3];
        assert_eq!(read_up_to(reader, &mut buf).unwrap(), 3);
        assert_eq!(buf, data);
    }

    #[test]
    fn counting_reader_tracks_position() {
        let mut reader = CountingReader::new(Cursor::new(vec![0u8; 10]));
        let mut buf = [0u8; 4];
        read_up_to(&mut reader, &mut buf).unwrap();
        assert_eq!(reader.position(), 4);
    }

    #[tokio::test]
    async fn unread_bytes_come_back_first() {
        let mut source = AsyncSource::new(Cursor::new(vec![3u8, 4, 5]));
        let mut buf = [0u8; 2];
        source.read(&mut buf).await.unwrap();
        assert_eq!(source.position(), 2);

        source.unread(&[9, 8]);
        assert_eq!(source.position(), 0);

        let mut all = [0u8; 5];
        assert_eq!(source.read_up_to(&mut all).await.unwrap(), 3);
        assert_eq!(&all[..3], &[9, 8, 5]);
        assert_eq!(source.position(), 3);
    }
}
