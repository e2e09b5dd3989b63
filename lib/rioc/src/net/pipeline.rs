use crate::net::batch::Batch;
use crate::net::frame::{BatchHeader, OpHeader};
use crate::net::support::ClientResult;
use crate::net::transport::Transport;
use std::io::IoSlice;

/// Serializes the batch into a single vectored transmission of the form
/// `[BatchHeader, (OpHeader_i, Key_i, [Value_i])...]` and delivers it
/// atomically. The coalesce hint brackets the send so the kernel can merge
/// the header fragments with the payloads.
pub(crate) fn transmit(transport: &mut dyn Transport, batch: &Batch) -> ClientResult<()> {
    let header_bytes = BatchHeader::new(batch.len() as u16).encode();

    let op_headers: Vec<[u8; OpHeader::SIZE]> =
        batch.ops().iter().map(|op| op.header().encode()).collect();

    let mut iov: Vec<IoSlice<'_>> = Vec::with_capacity(1 + batch.len() * 3);
    iov.push(IoSlice::new(&header_bytes));

    for (op, op_header) in batch.ops().iter().zip(&op_headers) {
        iov.push(IoSlice::new(op_header));
        iov.push(IoSlice::new(op.key_bytes()));
        if op.value_len > 0 {
            iov.push(IoSlice::new(batch.value_bytes(op)));
        }
    }

    transport.set_coalesce(true);
    let result = transport.sendv_all(&iov);
    transport.set_coalesce(false);

    result.map_err(Into::into)
}
