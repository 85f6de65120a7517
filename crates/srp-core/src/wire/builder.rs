//! Client-side construction of signed SRP updates
//!
//! The server never builds updates; this is what an SRP client (or a test)
//! uses to produce messages the server accepts.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use srp_core::wire::builder::{ServiceSpec, SrpClientKey, UpdateBuilder};
//!
//! let key = SrpClientKey::generate()?;
//! let message = UpdateBuilder::new("default.service.arpa.", "foo")
//!     .address("fd00::1".parse()?)
//!     .service(ServiceSpec::new("inst", "_test._udp").port(1234))
//!     .lease(3600, 7200)
//!     .build(&key)?;
//! ```

use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::rdata::{AAAA, NULL, PTR, SRV, TXT};
use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType};
use hickory_proto::serialize::binary::{BinEncodable, BinEncoder};
use ring::rand::SystemRandom;
use ring::signature::{ECDSA_P256_SHA256_FIXED_SIGNING, EcdsaKeyPair, KeyPair};
use std::net::Ipv6Addr;

use super::name::to_wire;
use super::record::{
    ALGORITHM_ECDSA_P256_SHA256, EcdsaKey, KeyRecord, LeaseOption, SigFixed, UDP_PAYLOAD_SIZE,
};
use super::update::signed_data;
use crate::error::{Error, Result};

/// ECDSA P-256 key pair of an SRP client
pub struct SrpClientKey {
    pair: EcdsaKeyPair,
    public: EcdsaKey,
    rng: SystemRandom,
}

impl SrpClientKey {
    /// Generate a fresh key pair
    pub fn generate() -> Result<Self> {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
            .map_err(|_| Error::Other("ECDSA key generation failed".to_string()))?;

        Self::from_pkcs8(pkcs8.as_ref())
    }

    /// Load a key pair from a PKCS#8 document
    pub fn from_pkcs8(pkcs8: &[u8]) -> Result<Self> {
        let rng = SystemRandom::new();
        let pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8, &rng)
            .map_err(|e| Error::Other(format!("Invalid PKCS#8 key: {}", e)))?;
        let public = EcdsaKey::from_slice(pair.public_key().as_ref())
            .ok_or_else(|| Error::Other("Unexpected public key encoding".to_string()))?;

        Ok(Self { pair, public, rng })
    }

    /// Public half
    pub fn public_key(&self) -> EcdsaKey {
        self.public
    }

    /// Fixed-size signature over `data`
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let signature = self
            .pair
            .sign(&self.rng, data)
            .map_err(|_| Error::Other("ECDSA signing failed".to_string()))?;
        Ok(signature.as_ref().to_vec())
    }
}

impl std::fmt::Debug for SrpClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SrpClientKey")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// One service instance to register or remove
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    instance_label: String,
    service_type: String,
    sub_types: Vec<String>,
    txt: Vec<Vec<u8>>,
    port: u16,
    weight: u16,
    priority: u16,
    ttl: Option<u32>,
    deleted: bool,
}

impl ServiceSpec {
    /// Service `<instance_label>.<service_type>`, e.g. `inst` + `_test._udp`
    pub fn new(instance_label: impl Into<String>, service_type: impl Into<String>) -> Self {
        Self {
            instance_label: instance_label.into(),
            service_type: service_type.into(),
            sub_types: Vec::new(),
            txt: Vec::new(),
            port: 0,
            weight: 0,
            priority: 0,
            ttl: None,
            deleted: false,
        }
    }

    /// Add a sub-type label
    pub fn sub_type(mut self, label: impl Into<String>) -> Self {
        self.sub_types.push(label.into());
        self
    }

    /// Add a TXT entry
    pub fn txt_entry(mut self, entry: impl Into<Vec<u8>>) -> Self {
        self.txt.push(entry.into());
        self
    }

    /// SRV port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// SRV weight
    pub fn weight(mut self, weight: u16) -> Self {
        self.weight = weight;
        self
    }

    /// SRV priority
    pub fn priority(mut self, priority: u16) -> Self {
        self.priority = priority;
        self
    }

    /// TTL of this service's records, overriding the update TTL
    pub fn ttl(mut self, ttl: u32) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Remove the service instead of registering it
    pub fn deleted(mut self) -> Self {
        self.deleted = true;
        self
    }
}

/// Builder for a signed SRP update
#[derive(Debug, Clone)]
pub struct UpdateBuilder {
    domain: String,
    zone: Option<String>,
    host_label: String,
    message_id: u16,
    addresses: Vec<Ipv6Addr>,
    services: Vec<ServiceSpec>,
    lease: LeaseOption,
    ttl: u32,
}

impl UpdateBuilder {
    /// Update for host `<host_label>.<domain>`
    pub fn new(domain: impl Into<String>, host_label: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            zone: None,
            host_label: host_label.into(),
            message_id: 0,
            addresses: Vec::new(),
            services: Vec::new(),
            lease: LeaseOption::long(7200, 1_209_600),
            ttl: 7200,
        }
    }

    /// Message id
    pub fn message_id(mut self, message_id: u16) -> Self {
        self.message_id = message_id;
        self
    }

    /// Zone section name when it should differ from the domain
    pub fn zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    /// Add a host address
    pub fn address(mut self, address: Ipv6Addr) -> Self {
        self.addresses.push(address);
        self
    }

    /// Add a service
    pub fn service(mut self, service: ServiceSpec) -> Self {
        self.services.push(service);
        self
    }

    /// Request a lease and key lease with the 8-byte lease option
    pub fn lease(mut self, lease: u32, key_lease: u32) -> Self {
        self.lease = LeaseOption::long(lease, key_lease);
        self
    }

    /// Request a lease with the 4-byte lease option
    pub fn short_lease(mut self, lease: u32) -> Self {
        self.lease = LeaseOption::short(lease);
        self
    }

    /// TTL of the records
    pub fn ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Full host name
    pub fn host_name(&self) -> String {
        format!("{}.{}", self.host_label, self.domain)
    }

    /// Build and sign the update with `key`
    pub fn build(&self, key: &SrpClientKey) -> Result<Vec<u8>> {
        self.build_signed_by(key.public_key(), key)
    }

    /// Build an update carrying `record_key` in its KEY record but signed
    /// by `signer`
    pub fn build_signed_by(&self, record_key: EcdsaKey, signer: &SrpClientKey) -> Result<Vec<u8>> {
        let host_name = to_wire(&self.host_name())?;
        let zone = to_wire(self.zone.as_deref().unwrap_or(&self.domain))?;

        let mut message = Message::new();
        message
            .set_id(self.message_id)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Update);

        let mut zone = Query::query(zone, RecordType::SOA);
        zone.set_query_class(DNSClass::IN);
        message.add_query(zone);

        for service in &self.services {
            let service_name = to_wire(&format!("{}.{}", service.service_type, self.domain))?;
            let instance_name = to_wire(&format!(
                "{}.{}.{}",
                service.instance_label, service.service_type, self.domain
            ))?;
            let ttl = service.ttl.unwrap_or(self.ttl);
            let ptr = RData::PTR(PTR(instance_name));

            if service.deleted {
                let mut record = Record::from_rdata(service_name, 0, ptr);
                record.set_dns_class(DNSClass::NONE);
                message.add_name_server(record);
                continue;
            }

            for sub_type in &service.sub_types {
                let owner = to_wire(&format!(
                    "{}._sub.{}.{}",
                    sub_type, service.service_type, self.domain
                ))?;
                message.add_name_server(Record::from_rdata(owner, ttl, ptr.clone()));
            }
            message.add_name_server(Record::from_rdata(service_name, ttl, ptr));
        }

        for service in &self.services {
            let instance_name = to_wire(&format!(
                "{}.{}.{}",
                service.instance_label, service.service_type, self.domain
            ))?;
            let ttl = service.ttl.unwrap_or(self.ttl);

            message.add_name_server(delete_all(instance_name.clone()));

            if service.deleted {
                continue;
            }

            let srv = SRV::new(service.priority, service.weight, service.port, host_name.clone());
            message.add_name_server(Record::from_rdata(instance_name.clone(), ttl, RData::SRV(srv)));

            let txt = TXT::from_bytes(service.txt.iter().map(Vec::as_slice).collect());
            message.add_name_server(Record::from_rdata(instance_name, ttl, RData::TXT(txt)));
        }

        message.add_name_server(delete_all(host_name.clone()));
        for address in &self.addresses {
            let aaaa = RData::AAAA(AAAA(*address));
            message.add_name_server(Record::from_rdata(host_name.clone(), self.ttl, aaaa));
        }
        let key = raw_record(RecordType::KEY, KeyRecord::new(record_key).to_rdata());
        message.add_name_server(Record::from_rdata(host_name.clone(), self.ttl, key));

        let mut opt = Record::from_rdata(Name::root(), 0, RData::OPT(self.lease.to_opt()));
        opt.set_dns_class(DNSClass::for_opt(UDP_PAYLOAD_SIZE));
        message.add_additional(opt);

        // Everything ahead of the SIG record, with an additional count of one.
        let unsigned = message.to_vec()?;

        let fixed = SigFixed {
            algorithm: ALGORITHM_ECDSA_P256_SHA256,
            ..SigFixed::default()
        };
        let signature = signer.sign(&signed_data(&unsigned, unsigned.len(), 1, &fixed, &host_name)?)?;

        let mut sig = Vec::new();
        {
            let mut encoder = BinEncoder::new(&mut sig);
            fixed.emit(&mut encoder)?;
            host_name.emit(&mut encoder)?;
        }
        sig.extend_from_slice(&signature);

        let mut sig = Record::from_rdata(Name::root(), 0, raw_record(RecordType::SIG, sig));
        sig.set_dns_class(DNSClass::ANY);
        message.add_additional(sig);

        Ok(message.to_vec()?)
    }
}

/// "Delete all RRsets from a name" pseudo-record
fn delete_all(owner: Name) -> Record {
    let mut record = Record::update0(owner, 0, RecordType::ANY);
    record.set_dns_class(DNSClass::ANY);
    record
}

fn raw_record(code: RecordType, rdata: Vec<u8>) -> RData {
    RData::Unknown {
        code,
        rdata: NULL::with(rdata),
    }
}
