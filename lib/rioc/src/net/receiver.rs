use crate::net::batch::Batch;
use crate::net::frame::{Command, ResponseHeader};
use crate::net::support::{
    ClientError, ClientResult, Status, MAX_KEY_LEN, MAX_VALUE_LEN, RANGE_LEN_WIDTH,
};
use crate::net::tracker::{Payload, RangeEntry, TrackerShared};
use crate::net::transport::Transport;
use lumen::logging;

/// Consumes the response stream for one submitted batch. Responses carry no
/// operation tag; the batch's operation list is the authoritative schema, so
/// the Nth response is decoded against the Nth request.
///
/// Fills result slots in order, advancing the tracker's high-water mark
/// after each one, and records the aggregate outcome. On the first
/// transport or decode failure the receiver stops; partially decoded
/// results are released on the way out.
pub(crate) fn run(
    transport: &mut dyn Transport,
    batch: &Batch,
    tracker: &TrackerShared,
    log: &logging::Logger,
) -> ClientResult<()> {
    for (index, op) in batch.ops().iter().enumerate() {
        match receive_one(transport, op.command) {
            Ok((status, payload)) => {
                logging::trace!(log, "response consumed";
                                "context" => "receiver",
                                "index" => index,
                                "status" => status.code());
                tracker.fill_slot(index, status, payload);
            }
            Err(err) => {
                logging::debug!(log, "receiver terminated";
                                "context" => "receiver",
                                "index" => index,
                                "error" => ?err);
                tracker.finish(Err(err));
                return Err(err);
            }
        }
    }

    tracker.finish(Ok(()));
    Ok(())
}

/// Reads and decodes a single response according to the command that
/// originated it.
fn receive_one(
    transport: &mut dyn Transport,
    command: Command,
) -> ClientResult<(Status, Payload)> {
    let mut raw = [0u8; ResponseHeader::SIZE];
    transport.recv_exact(&mut raw)?;
    let header = ResponseHeader::read(&mut &raw[..])?;

    let status = Status::new(header.status);

    // Failed operations carry no payload regardless of command.
    if !status.is_success() {
        return Ok((status, Payload::None));
    }

    let payload = match command {
        Command::Insert | Command::Delete | Command::Batch => Payload::None,
        Command::Get => Payload::Bytes(read_value(transport, header.value_len as usize)?),
        Command::AtomicIncDec => Payload::Counter(read_counter(transport, header.value_len)?),
        Command::RangeQuery => Payload::Range(read_range(transport, header.value_len as usize)?),
    };

    Ok((status, payload))
}

fn read_value(transport: &mut dyn Transport, len: usize) -> ClientResult<Vec<u8>> {
    if len > MAX_VALUE_LEN {
        return Err(ClientError::Overflow);
    }

    let mut data = vec![0u8; len];
    if len > 0 {
        transport.recv_exact(&mut data)?;
    }
    Ok(data)
}

fn read_counter(transport: &mut dyn Transport, value_len: u32) -> ClientResult<i64> {
    // The counter is a typed payload; any length other than 8 means the
    // response stream no longer lines up with the request schema.
    if value_len != 8 {
        return Err(ClientError::Protocol);
    }

    let mut raw = [0u8; 8];
    transport.recv_exact(&mut raw)?;
    Ok(i64::from_ne_bytes(raw))
}

/// Reads `count` range entries of the form
/// `{key_len: u16, key, value_len: native word, value}`.
fn read_range(transport: &mut dyn Transport, count: usize) -> ClientResult<Vec<RangeEntry>> {
    let mut entries = Vec::new();

    for _ in 0..count {
        let mut raw_key_len = [0u8; 2];
        transport.recv_exact(&mut raw_key_len)?;
        let key_len = u16::from_ne_bytes(raw_key_len) as usize;

        if key_len == 0 || key_len > MAX_KEY_LEN {
            return Err(ClientError::Protocol);
        }

        let mut key = vec![0u8; key_len];
        transport.recv_exact(&mut key)?;

        let mut raw_value_len = [0u8; RANGE_LEN_WIDTH];
        transport.recv_exact(&mut raw_value_len)?;
        let value_len = usize::from_ne_bytes(raw_value_len);

        if value_len > MAX_VALUE_LEN {
            return Err(ClientError::Overflow);
        }

        let mut value = vec![0u8; value_len];
        if value_len > 0 {
            transport.recv_exact(&mut value)?;
        }

        entries.push(RangeEntry { key, value });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::testing::MockTransport;
    use byteorder::{NativeEndian, WriteBytesExt};
    use std::io;
    use std::io::Write;

    fn response(script: &mut Vec<u8>, status: i32, value_len: u32) {
        script.write_i32::<NativeEndian>(status).unwrap();
        script.write_u32::<NativeEndian>(value_len).unwrap();
    }

    fn range_entry(script: &mut Vec<u8>, key: &[u8], value: &[u8]) {
        script.write_u16::<NativeEndian>(key.len() as u16).unwrap();
        script.write_all(key).unwrap();
        script.write_all(&value.len().to_ne_bytes()).unwrap();
        script.write_all(value).unwrap();
    }

    fn null_log() -> logging::Logger {
        lumen::logging::null()
    }

    #[test]
    fn test_positional_correspondence() {
        let mut batch = Batch::new();
        batch.add_insert(b"a", b"1", 1).unwrap();
        batch.add_get(b"a").unwrap();
        batch.add_delete(b"a", 2).unwrap();

        let mut script = Vec::new();
        response(&mut script, 0, 0);
        response(&mut script, 0, 1);
        script.push(b'1');
        response(&mut script, 0, 0);

        let mut transport = MockTransport::with_script(script);
        let tracker = TrackerShared::new(batch.len());

        run(&mut transport, &batch, &tracker, &null_log()).unwrap();

        assert!(tracker.is_complete());
        assert!(tracker.wait(None).is_ok());

        let expectations = [
            (Status::SUCCESS, Payload::None),
            (Status::SUCCESS, Payload::Bytes(b"1".to_vec())),
            (Status::SUCCESS, Payload::None),
        ];

        for (index, (status, payload)) in expectations.iter().enumerate() {
            let (slot_status, slot_payload) = tracker.slot_for_tests(index).unwrap();
            assert_eq!(&slot_status, status);
            assert_eq!(&slot_payload, payload);
        }
    }

    #[test]
    fn test_failed_op_has_no_payload() {
        let mut batch = Batch::new();
        batch.add_get(b"missing").unwrap();

        let mut script = Vec::new();
        response(&mut script, -6, 0);

        let mut transport = MockTransport::with_script(script);
        let tracker = TrackerShared::new(1);

        run(&mut transport, &batch, &tracker, &null_log()).unwrap();

        let (status, payload) = tracker.slot_for_tests(0).unwrap();
        assert_eq!(status, Status::NOT_FOUND);
        assert_eq!(payload, Payload::None);
    }

    #[test]
    fn test_empty_value_decodes_to_empty_bytes() {
        let mut batch = Batch::new();
        batch.add_get(b"empty").unwrap();

        let mut script = Vec::new();
        response(&mut script, 0, 0);

        let mut transport = MockTransport::with_script(script);
        let tracker = TrackerShared::new(1);

        run(&mut transport, &batch, &tracker, &null_log()).unwrap();

        let (status, payload) = tracker.slot_for_tests(0).unwrap();
        assert_eq!(status, Status::SUCCESS);
        assert_eq!(payload, Payload::Bytes(Vec::new()));
    }

    #[test]
    fn test_counter_roundtrip() {
        for expected in [-(1i64 << 62), -1, 0, 1, 1i64 << 62] {
            let mut batch = Batch::new();
            batch.add_atomic_inc_dec(b"counter", expected, 1).unwrap();

            let mut script = Vec::new();
            response(&mut script, 0, 8);
            script.extend_from_slice(&expected.to_ne_bytes());

            let mut transport = MockTransport::with_script(script);
            let tracker = TrackerShared::new(1);

            run(&mut transport, &batch, &tracker, &null_log()).unwrap();

            let (status, payload) = tracker.slot_for_tests(0).unwrap();
            assert_eq!(status, Status::SUCCESS);
            assert_eq!(payload, Payload::Counter(expected));
        }
    }

    #[test]
    fn test_counter_with_wrong_length_is_protocol_error() {
        let mut batch = Batch::new();
        batch.add_atomic_inc_dec(b"counter", 1, 1).unwrap();

        let mut script = Vec::new();
        response(&mut script, 0, 4);
        script.extend_from_slice(&[0u8; 4]);

        let mut transport = MockTransport::with_script(script);
        let tracker = TrackerShared::new(1);

        let result = run(&mut transport, &batch, &tracker, &null_log());

        assert_eq!(result.unwrap_err(), ClientError::Protocol);
        assert!(tracker.is_complete());
        assert_eq!(tracker.wait(None).unwrap_err(), ClientError::Protocol);
    }

    #[test]
    fn test_range_decoding() {
        let mut batch = Batch::new();
        batch.add_range_query(b"a", b"c").unwrap();

        let mut script = Vec::new();
        response(&mut script, 0, 3);
        range_entry(&mut script, b"a", b"1");
        range_entry(&mut script, b"b", b"2");
        range_entry(&mut script, b"c", b"3");

        let mut transport = MockTransport::with_script(script);
        let tracker = TrackerShared::new(1);

        run(&mut transport, &batch, &tracker, &null_log()).unwrap();

        let (status, payload) = tracker.slot_for_tests(0).unwrap();
        assert_eq!(status, Status::SUCCESS);
        assert_eq!(
            payload,
            Payload::Range(vec![
                RangeEntry {
                    key: b"a".to_vec(),
                    value: b"1".to_vec(),
                },
                RangeEntry {
                    key: b"b".to_vec(),
                    value: b"2".to_vec(),
                },
                RangeEntry {
                    key: b"c".to_vec(),
                    value: b"3".to_vec(),
                },
            ])
        );
    }

    #[test]
    fn test_range_entry_with_zero_key_is_protocol_error() {
        let mut batch = Batch::new();
        batch.add_range_query(b"a", b"c").unwrap();

        let mut script = Vec::new();
        response(&mut script, 0, 1);
        script.write_u16::<NativeEndian>(0).unwrap();

        let mut transport = MockTransport::with_script(script);
        let tracker = TrackerShared::new(1);

        let result = run(&mut transport, &batch, &tracker, &null_log());

        assert_eq!(result.unwrap_err(), ClientError::Protocol);
    }

    #[test]
    fn test_truncated_stream_surfaces_io_error() {
        let mut batch = Batch::new();
        batch.add_get(b"key").unwrap();

        let mut script = Vec::new();
        response(&mut script, 0, 10);
        script.extend_from_slice(&[1, 2, 3]);

        let mut transport = MockTransport::with_script(script);
        let tracker = TrackerShared::new(1);

        let result = run(&mut transport, &batch, &tracker, &null_log());

        assert_eq!(
            result.unwrap_err(),
            ClientError::Io(io::ErrorKind::WouldBlock)
        );
        assert!(tracker.is_complete());
    }

    #[test]
    fn test_oversize_value_length_is_overflow() {
        let mut batch = Batch::new();
        batch.add_get(b"key").unwrap();

        let mut script = Vec::new();
        response(&mut script, 0, (MAX_VALUE_LEN as u32) + 1);

        let mut transport = MockTransport::with_script(script);
        let tracker = TrackerShared::new(1);

        let result = run(&mut transport, &batch, &tracker, &null_log());

        assert_eq!(result.unwrap_err(), ClientError::Overflow);
    }
}
