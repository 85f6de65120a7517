//! Parsing and validation of SRP update messages
//!
//! [`UpdateMessage::parse`] decodes the header and zone section, which is
//! enough to filter foreign or duplicate messages. [`UpdateMessage::to_host`]
//! then walks the update section three times (service discovery, host
//! description, service description), checks the registry for name
//! conflicts, reads the lease option and verifies the SIG(0) signature.
//! Any failure abandons the whole message.

use std::time::Instant;

use hickory_proto::op::{Header, Query};
use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinDecoder, BinEncodable, BinEncoder};

use super::name::{self, is_sub_domain_of, names_match};
use super::record::{
    ALGORITHM_ECDSA_P256_SHA256, ECDSA_SIGNATURE_LEN, KeyRecord, LeaseOption, SigFixed,
    is_empty_rdata, raw_rdata, txt_data,
};
use super::{HEADER_LEN, check_update_query};
use crate::error::{UpdateError, UpdateResult};
use crate::registry::{EntryState, Host, Registry};

/// One record of the update section with its owner in dotted form
#[derive(Debug)]
struct UpdateRecord {
    owner: String,
    record: Record,
}

impl UpdateRecord {
    fn is_delete_all(&self) -> bool {
        self.record.dns_class() == DNSClass::ANY
            && self.record.record_type() == RecordType::ANY
            && self.record.ttl() == 0
            && is_empty_rdata(self.record.data())
    }
}

/// An update whose header and zone section have been checked
#[derive(Debug)]
pub struct UpdateMessage<'a> {
    message: &'a [u8],
    header: Header,
    zone_class: DNSClass,
}

impl<'a> UpdateMessage<'a> {
    /// Decode the header and zone section
    ///
    /// Anything that is not an update query is [`UpdateError::Drop`]. The
    /// zone must name `domain` ([`UpdateError::Security`]) and be SOA-typed.
    pub fn parse(message: &'a [u8], domain: &str) -> UpdateResult<Self> {
        let mut decoder = BinDecoder::new(message);
        let header = Header::read(&mut decoder).map_err(|_| UpdateError::Drop)?;

        check_update_query(&header)?;

        if header.query_count() != 1 {
            return Err(UpdateError::Parse);
        }

        let zone = Query::read(&mut decoder)?;

        if !names_match(&name::from_wire(zone.name())?, domain) {
            return Err(UpdateError::Security);
        }

        if zone.query_type() != RecordType::SOA {
            return Err(UpdateError::Parse);
        }

        Ok(Self {
            message,
            header,
            zone_class: zone.query_class(),
        })
    }

    /// Message header
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Validate the rest of the message into a candidate host
    pub fn to_host(&self, domain: &str, registry: &Registry, rx_time: Instant) -> UpdateResult<Host> {
        if self.header.answer_count() != 0 {
            return Err(UpdateError::Failed);
        }

        let mut decoder = self.body_decoder()?;
        let records = self.read_update_records(&mut decoder)?;
        let mut host = Host::new(rx_time);

        self.process_service_discovery(&records, domain, &mut host)?;
        self.process_host_description(&records, &mut host)?;
        self.process_service_description(&records, domain, &mut host)?;

        if registry.has_name_conflicts(&host) {
            return Err(UpdateError::Duplicated);
        }

        self.process_additional_section(&mut decoder, &mut host)?;

        Ok(host)
    }

    /// Decoder positioned after the zone section
    fn body_decoder(&self) -> UpdateResult<BinDecoder<'a>> {
        let mut decoder = BinDecoder::new(self.message);
        Header::read(&mut decoder)?;
        Query::read(&mut decoder)?;
        Ok(decoder)
    }

    fn read_update_records(&self, decoder: &mut BinDecoder<'a>) -> UpdateResult<Vec<UpdateRecord>> {
        (0..self.header.name_server_count())
            .map(|_| {
                let record = Record::read(decoder)?;
                let owner = name::from_wire(record.name())?;
                Ok(UpdateRecord { owner, record })
            })
            .collect()
    }

    /// PTR records: service instances, base service names and sub-types
    fn process_service_discovery(
        &self,
        records: &[UpdateRecord],
        domain: &str,
        host: &mut Host,
    ) -> UpdateResult {
        for UpdateRecord { owner, record } in records {
            if !is_sub_domain_of(owner, domain) {
                return Err(UpdateError::Security);
            }

            let RData::PTR(ptr) = record.data() else {
                if record.record_type() == RecordType::PTR {
                    return Err(UpdateError::Parse);
                }
                continue;
            };

            let class = record.dns_class();
            if class != DNSClass::NONE && class != self.zone_class {
                return Err(UpdateError::Failed);
            }

            let instance_name = name::from_wire(&ptr.0)?;
            let sub_type = name::split_sub_type(owner);
            let base_name = sub_type.map_or(owner.as_str(), |(_, base)| base);

            if !is_sub_domain_of(&instance_name, base_name) || names_match(&instance_name, base_name) {
                return Err(UpdateError::Failed);
            }

            let deleted = class == DNSClass::NONE;
            let service = host.find_or_add_service(&instance_name);

            if sub_type.is_some() {
                if service.has_sub_type(owner) {
                    return Err(UpdateError::Failed);
                }
                service.sub_types.push(owner.clone());
            } else {
                if service.service_name.is_some() {
                    return Err(UpdateError::Failed);
                }
                service.service_name = Some(owner.clone());
                if deleted {
                    service.state = EntryState::DeletedNameRetained;
                }
            }

            if !deleted {
                host.process_ttl(record.ttl())?;
            }
        }

        for service in &host.services {
            if service.service_name.is_none() {
                return Err(UpdateError::Parse);
            }
            if service.is_deleted() && !service.sub_types.is_empty() {
                return Err(UpdateError::Parse);
            }
        }

        Ok(())
    }

    /// Delete-all, AAAA and KEY records describing the host
    fn process_host_description(&self, records: &[UpdateRecord], host: &mut Host) -> UpdateResult {
        for update in records {
            let UpdateRecord { owner, record } = update;

            if record.dns_class() == DNSClass::ANY {
                if !update.is_delete_all() {
                    return Err(UpdateError::Failed);
                }

                if host.find_service(owner).is_none() {
                    host.set_full_name(owner)?;
                    host.clear_resources();
                }
                continue;
            }

            match record.record_type() {
                RecordType::AAAA => {
                    if record.dns_class() != self.zone_class {
                        return Err(UpdateError::Failed);
                    }

                    host.set_full_name(owner)?;
                    host.process_ttl(record.ttl())?;

                    let RData::AAAA(address) = record.data() else {
                        return Err(UpdateError::Parse);
                    };
                    host.add_address(address.0);
                }
                RecordType::KEY => {
                    if record.dns_class() != self.zone_class {
                        return Err(UpdateError::Failed);
                    }

                    host.process_ttl(record.ttl())?;
                    host.set_key(KeyRecord::parse(raw_rdata(record.data())?)?)?;
                }
                _ => {}
            }
        }

        if host.full_name.is_empty() || host.key.is_none() {
            return Err(UpdateError::Failed);
        }

        Ok(())
    }

    /// Delete-all, SRV and TXT records describing each service
    fn process_service_description(
        &self,
        records: &[UpdateRecord],
        domain: &str,
        host: &mut Host,
    ) -> UpdateResult {
        for update in records {
            let UpdateRecord { owner, record } = update;

            if record.dns_class() == DNSClass::ANY {
                if !update.is_delete_all() {
                    return Err(UpdateError::Failed);
                }

                if let Some(service) = host.find_service_mut(owner) {
                    service.clear_resources();
                    service.parsed.delete_all = true;
                }
                continue;
            }

            match record.record_type() {
                RecordType::SRV => {
                    if record.dns_class() != self.zone_class {
                        return Err(UpdateError::Failed);
                    }
                    host.process_ttl(record.ttl())?;

                    if !is_sub_domain_of(owner, domain) {
                        return Err(UpdateError::Security);
                    }

                    let RData::SRV(srv) = record.data() else {
                        return Err(UpdateError::Parse);
                    };

                    if !host.matches(&name::from_wire(srv.target())?) {
                        return Err(UpdateError::Failed);
                    }

                    let service = host.find_service_mut(owner).ok_or(UpdateError::Failed)?;

                    if service.parsed.srv {
                        return Err(UpdateError::Failed);
                    }

                    service.priority = srv.priority();
                    service.weight = srv.weight();
                    service.port = srv.port();
                    service.ttl = record.ttl();
                    service.parsed.srv = true;
                }
                RecordType::TXT => {
                    if record.dns_class() != self.zone_class {
                        return Err(UpdateError::Failed);
                    }
                    host.process_ttl(record.ttl())?;

                    let data = match record.data() {
                        RData::TXT(txt) => txt_data(txt),
                        other if is_empty_rdata(other) => Vec::new(),
                        _ => return Err(UpdateError::Parse),
                    };

                    let service = host.find_service_mut(owner).ok_or(UpdateError::Failed)?;

                    if service.parsed.txt {
                        return Err(UpdateError::Failed);
                    }

                    service.txt_data = data;
                    service.parsed.txt = true;
                }
                _ => {}
            }
        }

        for service in &host.services {
            let parsed = service.parsed;

            if !parsed.delete_all || parsed.srv != parsed.txt {
                return Err(UpdateError::Failed);
            }
            if !service.is_deleted() && !parsed.srv {
                return Err(UpdateError::Failed);
            }
        }

        Ok(())
    }

    /// OPT lease option and SIG(0) signature
    fn process_additional_section(&self, decoder: &mut BinDecoder<'a>, host: &mut Host) -> UpdateResult {
        if self.header.additional_count() != 2 {
            return Err(UpdateError::Failed);
        }

        let opt = Record::read(decoder)?;
        if opt.record_type() != RecordType::OPT || !opt.name().is_root() {
            return Err(UpdateError::Parse);
        }

        let lease = match opt.data() {
            RData::OPT(options) => LeaseOption::find_in(options)?,
            _ => return Err(UpdateError::Failed),
        };

        host.lease = lease.lease;
        host.key_lease = lease.key_lease;
        host.use_short_lease_option = lease.short;
        host.state = if lease.lease == 0 {
            EntryState::DeletedNameRetained
        } else {
            EntryState::Active
        };

        for service in &mut host.services {
            service.lease = lease.lease;
            service.key_lease = lease.key_lease;
        }

        if lease.lease > 0 && host.addresses.is_empty() {
            return Err(UpdateError::Failed);
        }

        let sig_offset = decoder.index();
        let sig = Record::read(decoder)?;
        if sig.record_type() != RecordType::SIG {
            return Err(UpdateError::Parse);
        }

        let rdata = raw_rdata(sig.data())?;
        let mut rdata = BinDecoder::new(rdata);
        let fixed = SigFixed::read(&mut rdata)?;
        let signer = Name::read(&mut rdata)?;

        if rdata.len() != ECDSA_SIGNATURE_LEN {
            return Err(UpdateError::Parse);
        }
        let signature = rdata.read_slice(ECDSA_SIGNATURE_LEN)?.unverified();

        if fixed.algorithm != ALGORITHM_ECDSA_P256_SHA256 || fixed.type_covered != 0 {
            return Err(UpdateError::Failed);
        }

        let additional_count = self.header.additional_count() - 1;
        let signed = signed_data(self.message, sig_offset, additional_count, &fixed, &signer)?;
        let key = host.key.as_ref().ok_or(UpdateError::Failed)?;

        key.key.verify(&signed, signature)
    }
}

/// Bytes covered by a SIG(0) signature
///
/// The fixed SIG RDATA, the uncompressed signer name, the message header
/// with its additional count replaced by `additional_count` (the count
/// without the SIG record), and the message from the end of the header up
/// to the SIG record at `sig_offset`.
pub fn signed_data(
    message: &[u8],
    sig_offset: usize,
    additional_count: u16,
    fixed: &SigFixed,
    signer: &Name,
) -> UpdateResult<Vec<u8>> {
    let counts_end = HEADER_LEN - 2;
    let header = message.get(..counts_end).ok_or(UpdateError::Parse)?;
    let body = message.get(HEADER_LEN..sig_offset).ok_or(UpdateError::Parse)?;

    let mut data = Vec::with_capacity(sig_offset + 64);
    {
        let mut encoder = BinEncoder::new(&mut data);
        fixed.emit(&mut encoder)?;
        signer.emit(&mut encoder)?;
    }

    data.extend_from_slice(header);
    data.extend_from_slice(&additional_count.to_be_bytes());
    data.extend_from_slice(body);

    Ok(data)
}
