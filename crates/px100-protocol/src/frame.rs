//! PX100 frame encoder/decoder.
//!
//! Pure byte-level handling of the request and response frames. No I/O.
//!
//! # Frame format
//!
//! Every request is six bytes:
//!
//! ```text
//! 0xB1 0xB2 <code> <p0> <p1> 0xB6
//! ```
//!
//! Codes below `0x10` are writes and are answered with a single `0x6F`
//! acknowledgement byte. Codes from `0x10` up are reads and are answered
//! with seven bytes carrying a 3-byte big-endian payload:
//!
//! ```text
//! 0xCA 0xCB <b2> <b3> <b4> 0xCE 0xCF
//! ```

use bytes::{BufMut, BytesMut};
use px100_core::{Error, Result};

/// Two header bytes opening every request.
pub const REQUEST_HEADER: [u8; 2] = [0xB1, 0xB2];

/// Trailer byte closing every request.
pub const REQUEST_TRAILER: u8 = 0xB6;

/// Two header bytes opening every read response.
pub const RESPONSE_HEADER: [u8; 2] = [0xCA, 0xCB];

/// Two trailer bytes closing every read response.
pub const RESPONSE_TRAILER: [u8; 2] = [0xCE, 0xCF];

/// The single byte a successful write is answered with.
pub const ACK: u8 = 0x6F;

/// Length of every request frame.
pub const REQUEST_LEN: usize = 6;

/// Length of a read response.
pub const READ_RESPONSE_LEN: usize = 7;

/// Length of a write acknowledgement.
pub const WRITE_RESPONSE_LEN: usize = 1;

/// Lowest register code that is a read.
pub const FIRST_READ_CODE: u8 = 0x10;

/// Returns `true` if `code` addresses a readable register.
pub fn is_read_code(code: u8) -> bool {
    code >= FIRST_READ_CODE
}

/// Number of bytes the instrument answers a request for `code` with.
pub fn expected_response_len(code: u8) -> usize {
    if is_read_code(code) {
        READ_RESPONSE_LEN
    } else {
        WRITE_RESPONSE_LEN
    }
}

/// Encode a request frame.
///
/// # Example
///
/// ```
/// use px100_protocol::frame::encode_frame;
///
/// // Read the voltage register.
/// assert_eq!(encode_frame(0x11, [0, 0]), vec![0xB1, 0xB2, 0x11, 0x00, 0x00, 0xB6]);
/// ```
pub fn encode_frame(code: u8, payload: [u8; 2]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(REQUEST_LEN);
    buf.put_slice(&REQUEST_HEADER);
    buf.put_u8(code);
    buf.put_slice(&payload);
    buf.put_u8(REQUEST_TRAILER);
    buf.to_vec()
}

/// Decode a read response into its 3-byte payload.
///
/// An empty buffer is [`Error::NoAnswer`]; anything else that is not a
/// well-formed seven byte response is [`Error::Frame`].
///
/// # Example
///
/// ```
/// use px100_protocol::frame::decode_read_response;
///
/// let payload = decode_read_response(&[0xCA, 0xCB, 0x00, 0x2E, 0xE0, 0xCE, 0xCF]).unwrap();
/// assert_eq!(payload, [0x00, 0x2E, 0xE0]);
/// ```
pub fn decode_read_response(buf: &[u8]) -> Result<[u8; 3]> {
    if buf.is_empty() {
        return Err(Error::NoAnswer);
    }
    if buf.len() != READ_RESPONSE_LEN {
        return Err(Error::Frame(format!(
            "expected {READ_RESPONSE_LEN} bytes, got {}: {buf:02X?}",
            buf.len()
        )));
    }
    if buf[0..2] != RESPONSE_HEADER || buf[5..7] != RESPONSE_TRAILER {
        return Err(Error::Frame(format!("bad markers: {buf:02X?}")));
    }
    Ok([buf[2], buf[3], buf[4]])
}

/// Check a write acknowledgement.
///
/// Only the single byte `0x6F` is success. An empty buffer is
/// [`Error::NoAnswer`]; every other response is [`Error::WriteRejected`].
pub fn decode_write_ack(buf: &[u8]) -> Result<()> {
    match buf {
        [] => Err(Error::NoAnswer),
        [ACK] => Ok(()),
        other => Err(Error::WriteRejected {
            response: other.to_vec(),
        }),
    }
}
