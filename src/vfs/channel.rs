//! Seekable byte channels over file content.

use crate::error::{Error, Result};
use crate::vfs::node::Node;
use std::io;
use tracing::debug;

/// Flags controlling how a file is opened.
///
/// Works like `std::fs::OpenOptions`: start from [`OpenOptions::new`] and
/// chain setters. With no access flag the channel is read-only; `append`
/// implies write access.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenOptions {
    read: bool,
    write: bool,
    append: bool,
    truncate: bool,
    create: bool,
    create_new: bool,
    delete_on_close: bool,
    sparse: bool,
    sync: bool,
    dsync: bool,
}

impl OpenOptions {
    /// All flags cleared.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow reading.
    pub fn read(&mut self, read: bool) -> &mut Self {
        self.read = read;
        self
    }

    /// Allow writing.
    pub fn write(&mut self, write: bool) -> &mut Self {
        self.write = write;
        self
    }

    /// Move the cursor to the end before every write.
    pub fn append(&mut self, append: bool) -> &mut Self {
        self.append = append;
        self
    }

    /// Cut the file to zero length when opening.
    pub fn truncate(&mut self, truncate: bool) -> &mut Self {
        self.truncate = truncate;
        self
    }

    /// Create the file if it is missing.
    pub fn create(&mut self, create: bool) -> &mut Self {
        self.create = create;
        self
    }

    /// Create the file, failing if it exists.
    pub fn create_new(&mut self, create_new: bool) -> &mut Self {
        self.create_new = create_new;
        self
    }

    /// Remove the file when the channel is closed.
    pub fn delete_on_close(&mut self, delete_on_close: bool) -> &mut Self {
        self.delete_on_close = delete_on_close;
        self
    }

    /// Sparse hint. Accepted; files are always zero-filled.
    pub fn sparse(&mut self, sparse: bool) -> &mut Self {
        self.sparse = sparse;
        self
    }

    /// Synchronous-update hint. Accepted; content is never buffered.
    pub fn sync(&mut self, sync: bool) -> &mut Self {
        self.sync = sync;
        self
    }

    /// Synchronous data-update hint. Accepted; content is never buffered.
    pub fn dsync(&mut self, dsync: bool) -> &mut Self {
        self.dsync = dsync;
        self
    }

    /// Whether the channel may read.
    pub fn is_readable(&self) -> bool {
        self.read || !self.is_writable()
    }

    /// Whether the channel may write.
    pub fn is_writable(&self) -> bool {
        self.write || self.append
    }

    /// Whether writes go to the end of the file.
    pub fn is_append(&self) -> bool {
        self.append
    }

    /// Whether the file is cut to zero length on open.
    pub fn is_truncate(&self) -> bool {
        self.truncate
    }

    /// Whether a missing file is created.
    pub fn is_create(&self) -> bool {
        self.create
    }

    /// Whether opening fails when the file exists.
    pub fn is_create_new(&self) -> bool {
        self.create_new
    }

    /// Whether closing removes the file.
    pub fn is_delete_on_close(&self) -> bool {
        self.delete_on_close
    }

    /// Whether the sparse hint was given.
    pub fn is_sparse(&self) -> bool {
        self.sparse
    }

    /// Whether the synchronous-update hint was given.
    pub fn is_sync(&self) -> bool {
        self.sync
    }

    /// Whether the synchronous data-update hint was given.
    pub fn is_dsync(&self) -> bool {
        self.dsync
    }

    /// Reject flag combinations that make no sense.
    pub fn validate(&self) -> Result<()> {
        if (self.truncate || self.create || self.create_new) && !self.is_writable() {
            return Err(Error::InvalidArgument(
                "truncate and create require write access".to_string(),
            ));
        }
        if self.truncate && self.append {
            return Err(Error::InvalidArgument(
                "truncate and append are exclusive".to_string(),
            ));
        }
        Ok(())
    }
}

/// A cursor over a file's content.
///
/// The cursor is independent of the file size: it may be moved past the
/// end, and a write there zero-fills the gap. Several channels may share a
/// file; each write holds the file's content lock for its whole duration.
#[derive(Debug)]
pub struct SeekableChannel {
    node: Node,
    options: OpenOptions,
    position: u64,
    scratch: usize,
    open: bool,
}

impl SeekableChannel {
    /// Open a channel on `node`, which must be a file.
    pub(crate) fn open(node: Node, options: &OpenOptions) -> Result<Self> {
        options.validate()?;
        if node.is_directory() {
            return Err(Error::IsADirectory(node.path().to_string()));
        }
        if !node.is_file() {
            return Err(Error::NotAFile(node.path().to_string()));
        }
        let scratch = node.store()?.config().scratch_size;
        if options.is_truncate() {
            node.set_size(0)?;
        }

        debug!(
            node = node.id(),
            read = options.is_readable(),
            write = options.is_writable(),
            "channel opened"
        );
        Ok(Self {
            node,
            options: options.clone(),
            position: 0,
            scratch,
            open: true,
        })
    }

    /// The file this channel reads and writes.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Flags the channel was opened with.
    pub fn options(&self) -> &OpenOptions {
        &self.options
    }

    /// Whether the channel has not been closed.
    pub fn is_open(&self) -> bool {
        self.open
    }

    fn check_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(Error::ChannelClosed)
        }
    }

    fn check_writable(&self) -> Result<()> {
        self.check_open()?;
        if !self.options.is_writable() {
            return Err(Error::NonWritableChannel);
        }
        Ok(())
    }

    /// Current cursor.
    pub fn position(&self) -> Result<u64> {
        self.check_open()?;
        Ok(self.position)
    }

    /// Move the cursor. Positions past the end are allowed.
    pub fn set_position(&mut self, position: i64) -> Result<()> {
        self.check_open()?;
        if position < 0 {
            return Err(Error::InvalidArgument(format!(
                "negative position {}",
                position
            )));
        }
        self.position = position as u64;
        Ok(())
    }

    /// Current file size.
    pub fn size(&self) -> Result<u64> {
        self.check_open()?;
        self.node.read_size()
    }

    /// Read into `dst` from the cursor.
    ///
    /// Returns `None` at end of stream, with the cursor moved back to the
    /// size if it was beyond it. Before the end, an empty `dst` reads `Some(0)`.
    pub fn read(&mut self, dst: &mut [u8]) -> Result<Option<usize>> {
        self.check_open()?;
        if !self.options.is_readable() {
            return Err(Error::NonReadableChannel);
        }

        let content = self.node.content()?;
        let size = content.size();
        if self.position >= size {
            self.position = size;
            return Ok(None);
        }

        let n = (size - self.position).min(dst.len() as u64) as usize;
        let mut done = 0;
        while done < n {
            let chunk = self.scratch.min(n - done);
            content
                .buffer()
                .read(self.position + done as u64, &mut dst[done..done + chunk])?;
            done += chunk;
        }
        self.position += n as u64;
        Ok(Some(n))
    }

    /// Write all of `src` at the cursor, growing the file as needed.
    ///
    /// In append mode the cursor first moves to the end of the file. A
    /// cursor beyond the end leaves a zero-filled gap.
    pub fn write(&mut self, src: &[u8]) -> Result<usize> {
        self.check_writable()?;

        let mut content = self.node.content_mut()?;
        let old_size = content.size();
        if self.options.is_append() {
            self.position = old_size;
        }
        if src.is_empty() {
            return Ok(0);
        }
        let end = self
            .position
            .checked_add(src.len() as u64)
            .ok_or_else(|| Error::InvalidArgument("write past the addressable range".to_string()))?;

        if end > old_size {
            content.buffer_mut().ensure_capacity(end)?;
            if self.position > old_size {
                content.zero_fill(old_size, self.position, self.scratch)?;
            }
        }

        let mut done = 0;
        while done < src.len() {
            let chunk = self.scratch.min(src.len() - done);
            content
                .buffer()
                .write(self.position + done as u64, &src[done..done + chunk])?;
            done += chunk;
        }

        if end > old_size {
            content.set_len(end);
        }
        self.position = end;
        Ok(src.len())
    }

    /// Shrink the file to `size`. Never grows it.
    pub fn truncate(&mut self, size: u64) -> Result<()> {
        self.check_writable()?;
        {
            let mut content = self.node.content_mut()?;
            if size < content.size() {
                content.resize(size, self.scratch)?;
            }
        }
        if self.position > size {
            self.position = size;
        }
        Ok(())
    }

    /// Content is never buffered; only checks that the channel is open.
    pub fn sync(&self) -> Result<()> {
        self.check_open()
    }

    /// Close the channel, removing the file if delete-on-close was set.
    ///
    /// Closing again does nothing.
    pub fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        debug!(node = self.node.id(), "channel closed");

        if self.options.is_delete_on_close() {
            match self.node.unlink() {
                // already removed through another handle
                Ok(()) | Err(Error::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl Drop for SeekableChannel {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            debug!(node = self.node.id(), error = %e, "close on drop failed");
        }
    }
}

impl io::Read for SeekableChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(SeekableChannel::read(self, buf)?.unwrap_or(0))
    }
}

impl io::Write for SeekableChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(SeekableChannel::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.sync()?)
    }
}

impl io::Seek for SeekableChannel {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let (base, delta) = match pos {
            io::SeekFrom::Start(offset) => {
                let offset = i64::try_from(offset).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidInput, "seek offset out of range")
                })?;
                (0, offset)
            }
            io::SeekFrom::End(delta) => (self.size()?, delta),
            io::SeekFrom::Current(delta) => (self.position()?, delta),
        };
        let target = i64::try_from(base)
            .ok()
            .and_then(|base| base.checked_add(delta))
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek overflow"))?;
        self.set_position(target)?;
        Ok(target as u64)
    }
}
