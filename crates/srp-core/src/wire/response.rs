//! Responses sent back to SRP clients

use hickory_proto::op::{Header, Message, MessageType};
use hickory_proto::rr::rdata::opt::EdnsCode;
use hickory_proto::rr::{DNSClass, Name, RData, Record};

use super::record::{LeaseOption, OPT_TTL_DNSSEC_OK, OPTION_CODE_UPDATE_LEASE, UDP_PAYLOAD_SIZE};
use crate::error::{ResponseCode, UpdateError, UpdateResult};

fn response_to(query: &Header, rcode: ResponseCode) -> Message {
    let code: hickory_proto::op::ResponseCode = u16::from(rcode as u8).into();

    let mut message = Message::new();
    message
        .set_id(query.id())
        .set_message_type(MessageType::Response)
        .set_op_code(query.op_code())
        .set_response_code(code);
    message
}

/// Bare response carrying only `rcode`
pub fn encode_response(query: &Header, rcode: ResponseCode) -> UpdateResult<Vec<u8>> {
    Ok(response_to(query, rcode).to_vec()?)
}

/// Success response carrying the granted lease in an OPT record
pub fn encode_lease_response(query: &Header, granted: LeaseOption) -> UpdateResult<Vec<u8>> {
    let mut opt = Record::from_rdata(Name::root(), OPT_TTL_DNSSEC_OK, RData::OPT(granted.to_opt()));
    opt.set_dns_class(DNSClass::for_opt(UDP_PAYLOAD_SIZE));

    let mut message = response_to(query, ResponseCode::Success);
    message.add_additional(opt);

    Ok(message.to_vec()?)
}

/// Decoded server response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    /// Message id echoed from the update
    pub message_id: u16,
    /// Response code
    pub rcode: u8,
    /// Granted lease, when the server sent one
    pub lease: Option<LeaseOption>,
}

impl Response {
    /// Decode a response received from a server
    pub fn parse(message: &[u8]) -> UpdateResult<Self> {
        let message = Message::from_vec(message)?;

        if message.message_type() != MessageType::Response {
            return Err(UpdateError::Parse);
        }

        let lease = message
            .extensions()
            .as_ref()
            .and_then(|edns| edns.option(EdnsCode::from(OPTION_CODE_UPDATE_LEASE)))
            .map(LeaseOption::from_option)
            .transpose()?;

        Ok(Self {
            message_id: message.id(),
            rcode: message.response_code().low(),
            lease,
        })
    }

    /// Response code, when it is one SRP uses
    pub fn response_code(&self) -> Option<ResponseCode> {
        ResponseCode::from_u8(self.rcode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{HEADER_LEN, read_header, update_header};

    #[test]
    fn test_bare_response() {
        let query = update_header(0xbeef);
        let buf = encode_response(&query, ResponseCode::Refused).unwrap();
        assert_eq!(buf.len(), HEADER_LEN);

        let header = read_header(&buf).unwrap();
        assert_eq!(header.message_type(), MessageType::Response);
        assert_eq!(header.op_code(), query.op_code());

        let response = Response::parse(&buf).unwrap();
        assert_eq!(response.message_id, 0xbeef);
        assert_eq!(response.response_code(), Some(ResponseCode::Refused));
        assert_eq!(response.lease, None);
    }

    #[test]
    fn test_lease_response_layout() {
        let query = update_header(1);
        let buf = encode_lease_response(&query, LeaseOption::long(1800, 86400)).unwrap();

        // header + root + type/class/ttl/rdlen + option code/len/data
        assert_eq!(buf.len(), HEADER_LEN + 1 + 10 + 12);
        assert_eq!(&buf[HEADER_LEN + 1..HEADER_LEN + 3], &41u16.to_be_bytes());
        assert_eq!(&buf[HEADER_LEN + 3..HEADER_LEN + 5], &1232u16.to_be_bytes());
        assert_eq!(&buf[HEADER_LEN + 5..HEADER_LEN + 9], &0x8000u32.to_be_bytes());

        let response = Response::parse(&buf).unwrap();
        assert_eq!(response.response_code(), Some(ResponseCode::Success));
        assert_eq!(response.lease, Some(LeaseOption::long(1800, 86400)));
    }

    #[test]
    fn test_short_lease_response_keeps_short_form() {
        let query = update_header(2);
        let buf = encode_lease_response(&query, LeaseOption::short(1800)).unwrap();
        assert_eq!(buf.len(), HEADER_LEN + 1 + 10 + 8);

        let lease = Response::parse(&buf).unwrap().lease.unwrap();
        assert!(lease.short);
        assert_eq!(lease.key_lease, 1800);
    }

    #[test]
    fn test_query_is_not_a_response() {
        let query = update_header(3);
        let buf = hickory_proto::serialize::binary::BinEncodable::to_bytes(&query).unwrap();
        assert_eq!(Response::parse(&buf), Err(UpdateError::Parse));
    }
}
