//! DNS Update wire format
//!
//! Messages are decoded and encoded with `hickory-proto`. This module adds
//! what SRP layers on top: the update lease option, ECDSA P-256 KEY records,
//! SIG(0) verification over the raw message bytes, and the response
//! messages the server sends back.
//!
//! ```text
//! +---------------------+
//! |       Header        |  id, QR/opcode/rcode, ZO/PR/UP/AD counts
//! +---------------------+
//! |        Zone         |  one SOA-typed record naming the domain
//! +---------------------+
//! |    Prerequisite     |  must be empty
//! +---------------------+
//! |       Update        |  PTR / SRV / TXT / AAAA / KEY / delete-all
//! +---------------------+
//! |     Additional      |  OPT (lease option) + SIG(0)
//! +---------------------+
//! ```

pub mod builder;
pub mod name;
pub mod record;
pub mod response;
pub mod update;

pub use hickory_proto::op::Header;

use hickory_proto::op::{MessageType, OpCode};
use hickory_proto::serialize::binary::{BinDecodable, BinDecoder};

use crate::error::{UpdateError, UpdateResult};

/// Length of the fixed DNS header
pub const HEADER_LEN: usize = 12;

/// Header of an update query with id `message_id`
pub fn update_header(message_id: u16) -> Header {
    let mut header = Header::new();
    header
        .set_id(message_id)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Update);
    header
}

/// Decode the header at the start of `message`
pub fn read_header(message: &[u8]) -> UpdateResult<Header> {
    Ok(Header::read(&mut BinDecoder::new(message))?)
}

/// Verify `header` is an update query; anything else is dropped silently
pub fn check_update_query(header: &Header) -> UpdateResult {
    if header.message_type() != MessageType::Query || header.op_code() != OpCode::Update {
        return Err(UpdateError::Drop);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::serialize::binary::BinEncodable;

    #[test]
    fn test_update_header_is_accepted() {
        let header = update_header(0x1234);
        assert_eq!(header.id(), 0x1234);
        assert!(check_update_query(&header).is_ok());

        let bytes = header.to_bytes().unwrap();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(read_header(&bytes).unwrap(), header);
        assert_eq!(read_header(&bytes[..11]), Err(UpdateError::Parse));
    }

    #[test]
    fn test_responses_and_queries_are_dropped() {
        let mut response = update_header(1);
        response.set_message_type(MessageType::Response);
        assert_eq!(check_update_query(&response), Err(UpdateError::Drop));

        let mut query = update_header(1);
        query.set_op_code(OpCode::Query);
        assert_eq!(check_update_query(&query), Err(UpdateError::Drop));
    }
}
