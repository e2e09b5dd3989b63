//! Test doubles shared by the protocol engine tests.

use crate::net::transport::Transport;
use std::collections::VecDeque;
use std::io::{self, IoSlice};

/// Transport double capturing everything sent and replaying a scripted
/// response stream. An exhausted script reports `WouldBlock`, mirroring a
/// read timeout on a stalled session.
pub(crate) struct MockTransport {
    pub sent: Vec<u8>,
    pub script: VecDeque<u8>,
    pub coalesce_calls: Vec<bool>,
    pub fail_sends: bool,
}

impl MockTransport {
    pub fn new() -> MockTransport {
        MockTransport {
            sent: Vec::new(),
            script: VecDeque::new(),
            coalesce_calls: Vec::new(),
            fail_sends: false,
        }
    }

    pub fn with_script(script: Vec<u8>) -> MockTransport {
        let mut transport = MockTransport::new();
        transport.script = script.into();
        transport
    }
}

impl Transport for MockTransport {
    fn send_all(&mut self, data: &[u8]) -> io::Result<()> {
        if self.fail_sends {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        self.sent.extend_from_slice(data);
        Ok(())
    }

    fn sendv_all(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<()> {
        if self.fail_sends {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        for buf in bufs {
            self.sent.extend_from_slice(buf);
        }
        Ok(())
    }

    fn recv_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        if self.script.len() < buf.len() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        for byte in buf.iter_mut() {
            *byte = self.script.pop_front().expect("Script length checked above");
        }
        Ok(())
    }

    fn set_coalesce(&mut self, enabled: bool) {
        self.coalesce_calls.push(enabled);
    }

    fn close(&mut self) {}
}
