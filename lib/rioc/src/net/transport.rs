use std::io::{self, IoSlice, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Vectored payloads below this size are coalesced into a single contiguous
/// write instead of handed to the OS scatter/gather path.
const VECTORED_SEND_MIN: usize = 4096;

/// Reliable ordered byte stream carrying one protocol session.
///
/// `send_all`/`recv_exact` transfer the full length or fail; transient
/// interruptions are retried internally. `WouldBlock` surfaces as an error:
/// the session sockets are blocking, so it only arises from a configured
/// read/write timeout. `sendv_all` delivers the buffer sequence as if
/// concatenated, in order, completely.
pub trait Transport: Send {
    fn send_all(&mut self, data: &[u8]) -> io::Result<()>;

    fn sendv_all(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<()>;

    fn recv_exact(&mut self, buf: &mut [u8]) -> io::Result<()>;

    /// Advisory hint asking the kernel to withhold small segments pending
    /// further writes. Best-effort; a no-op where unsupported.
    fn set_coalesce(&mut self, enabled: bool);

    /// Tears the stream down. Errors are ignored; the session is already
    /// unusable when this is called.
    fn close(&mut self);
}

/// Opens a TCP connection with the session socket options applied. The
/// timeout bounds connection establishment as well as subsequent reads and
/// writes; `None` blocks indefinitely.
pub(crate) fn open_stream(
    host: &str,
    port: u16,
    timeout: Option<Duration>,
) -> io::Result<TcpStream> {
    let mut last_err = None;

    for addr in (host, port).to_socket_addrs()? {
        let attempt = match timeout {
            Some(limit) => TcpStream::connect_timeout(&addr, limit),
            None => TcpStream::connect(&addr),
        };

        match attempt {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                stream.set_read_timeout(timeout)?;
                stream.set_write_timeout(timeout)?;
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, "Address resolved to nothing")
    }))
}

/// Plain TCP transport.
pub struct TcpTransport {
    stream: TcpStream,
    scratch: Vec<u8>,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> TcpTransport {
        TcpTransport {
            stream,
            scratch: Vec::new(),
        }
    }
}

impl Transport for TcpTransport {
    fn send_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data)
    }

    fn sendv_all(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<()> {
        let total: usize = bufs.iter().map(|buf| buf.len()).sum();

        // Small payloads: one contiguous write beats the extra syscall
        // bookkeeping of scatter/gather.
        if total < VECTORED_SEND_MIN {
            self.scratch.clear();
            for buf in bufs {
                self.scratch.extend_from_slice(buf);
            }
            return self.stream.write_all(&self.scratch);
        }

        write_vectored_all(&mut self.stream, bufs)
    }

    fn recv_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.stream.read_exact(buf)
    }

    fn set_coalesce(&mut self, enabled: bool) {
        sockopt::set_cork(&self.stream, enabled);
    }

    fn close(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// Delivers the full sequence of buffers through `write_vectored`, advancing
/// across partial writes so the peer observes the exact concatenation.
pub(crate) fn write_vectored_all<W: Write>(writer: &mut W, bufs: &[IoSlice<'_>]) -> io::Result<()> {
    let mut index = 0;
    let mut offset = 0;
    let mut slices: Vec<IoSlice<'_>> = Vec::with_capacity(bufs.len());

    while index < bufs.len() {
        // Skip buffers that are empty or fully transferred.
        if offset == bufs[index].len() {
            index += 1;
            offset = 0;
            continue;
        }

        slices.clear();
        slices.push(IoSlice::new(&bufs[index][offset..]));
        for buf in &bufs[index + 1..] {
            slices.push(IoSlice::new(buf));
        }

        let written = match writer.write_vectored(&slices) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(count) => count,
            Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };

        // Map the write count back onto the (buffer, offset) cursor.
        let mut remaining = written;
        while remaining > 0 && index < bufs.len() {
            let available = bufs[index].len() - offset;
            if remaining < available {
                offset += remaining;
                remaining = 0;
            } else {
                remaining -= available;
                index += 1;
                offset = 0;
            }
        }
    }

    Ok(())
}

#[cfg(target_os = "linux")]
pub(crate) mod sockopt {
    use std::mem;
    use std::net::TcpStream;
    use std::os::unix::io::AsRawFd;

    /// TCP_CORK: hold partial segments until released or a full packet
    /// accumulates. Failures are ignored, the hint never affects
    /// correctness.
    pub fn set_cork(stream: &TcpStream, enabled: bool) {
        let flag: libc::c_int = enabled as libc::c_int;
        unsafe {
            libc::setsockopt(
                stream.as_raw_fd(),
                libc::IPPROTO_TCP,
                libc::TCP_CORK,
                &flag as *const libc::c_int as *const libc::c_void,
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            );
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) mod sockopt {
    use std::net::TcpStream;

    pub fn set_cork(_stream: &TcpStream, _enabled: bool) {}
}
