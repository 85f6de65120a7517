//! SRP record payloads
//!
//! `hickory-proto` decodes the standard records. KEY and SIG RDATA arrive
//! undecoded and are read here, along with the update lease option carried
//! in the OPT record.

use hickory_proto::rr::RData;
use hickory_proto::rr::rdata::TXT;
use hickory_proto::rr::rdata::opt::{EdnsCode, EdnsOption, OPT};
use hickory_proto::serialize::binary::{BinDecoder, BinEncoder};
use ring::signature::{self, UnparsedPublicKey};

use crate::error::{UpdateError, UpdateResult};

/// DNSSEC algorithm number of ECDSA P-256 with SHA-256
pub const ALGORITHM_ECDSA_P256_SHA256: u8 = 13;
/// KEY protocol field value for DNSSEC
pub const KEY_PROTOCOL_DNSSEC: u8 = 3;

/// KEY flags: authentication and confidentiality permitted, non-zone owner,
/// general signatory
pub const KEY_FLAGS_NON_ZONE_GENERAL: [u8; 2] = [0x02, 0x01];

/// EDNS(0) option code of the update lease option
pub const OPTION_CODE_UPDATE_LEASE: u16 = 2;

/// UDP payload size advertised in the OPT of a response
pub const UDP_PAYLOAD_SIZE: u16 = 1232;

/// OPT TTL field with only the DNSSEC-OK bit set
pub const OPT_TTL_DNSSEC_OK: u32 = 0x0000_8000;

/// Length of an uncompressed P-256 public key without the 0x04 prefix
pub const ECDSA_KEY_LEN: usize = 64;
/// Length of a fixed-size P-256 signature
pub const ECDSA_SIGNATURE_LEN: usize = 64;

/// RDATA length of a KEY record carrying an ECDSA P-256 key
pub const KEY_RDATA_LEN: usize = 4 + ECDSA_KEY_LEN;
/// Length of the SIG RDATA ahead of the signer name
pub const SIG_FIXED_LEN: usize = 18;

/// RDATA that `hickory-proto` left undecoded
///
/// An empty RDATA reads as a zero-length slice.
pub fn raw_rdata(data: &RData) -> UpdateResult<&[u8]> {
    match data {
        RData::Unknown { rdata, .. } => Ok(rdata.anything()),
        RData::Update0(_) => Ok(&[]),
        _ => Err(UpdateError::Parse),
    }
}

/// Whether a record carries no RDATA
pub fn is_empty_rdata(data: &RData) -> bool {
    raw_rdata(data).is_ok_and(<[u8]>::is_empty)
}

/// ECDSA P-256 public key (X ‖ Y)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EcdsaKey(pub [u8; ECDSA_KEY_LEN]);

impl EcdsaKey {
    /// Key from a 64-byte X ‖ Y slice, or from the 65-byte uncompressed
    /// SEC1 form with its 0x04 prefix
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes = match bytes.len() {
            65 if bytes[0] == 0x04 => &bytes[1..],
            ECDSA_KEY_LEN => bytes,
            _ => return None,
        };

        let mut key = [0u8; ECDSA_KEY_LEN];
        key.copy_from_slice(bytes);
        Some(Self(key))
    }

    /// Verify a fixed-size signature over `data`
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> UpdateResult {
        let mut public_key = Vec::with_capacity(1 + ECDSA_KEY_LEN);
        public_key.push(0x04);
        public_key.extend_from_slice(&self.0);

        UnparsedPublicKey::new(&signature::ECDSA_P256_SHA256_FIXED, public_key)
            .verify(data, signature)
            .map_err(|_| UpdateError::Security)
    }
}

impl std::fmt::Debug for EcdsaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EcdsaKey(")?;
        for byte in &self.0[..4] {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "..)")
    }
}

/// KEY record RDATA
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRecord {
    /// Flags (use, owner and signatory)
    pub flags: [u8; 2],
    /// Protocol
    pub protocol: u8,
    /// Algorithm
    pub algorithm: u8,
    /// Public key
    pub key: EcdsaKey,
}

impl KeyRecord {
    /// KEY record for `key` as SRP clients and publishers encode it
    pub fn new(key: EcdsaKey) -> Self {
        Self {
            flags: KEY_FLAGS_NON_ZONE_GENERAL,
            protocol: KEY_PROTOCOL_DNSSEC,
            algorithm: ALGORITHM_ECDSA_P256_SHA256,
            key,
        }
    }

    /// Decode KEY RDATA; only ECDSA P-256 keys are accepted
    pub fn parse(rdata: &[u8]) -> UpdateResult<Self> {
        if rdata.len() != KEY_RDATA_LEN || rdata[3] != ALGORITHM_ECDSA_P256_SHA256 {
            return Err(UpdateError::Parse);
        }

        let key = EcdsaKey::from_slice(&rdata[4..]).ok_or(UpdateError::Parse)?;

        Ok(Self {
            flags: [rdata[0], rdata[1]],
            protocol: rdata[2],
            algorithm: rdata[3],
            key,
        })
    }

    /// Encoded RDATA
    pub fn to_rdata(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(KEY_RDATA_LEN);
        buf.extend_from_slice(&self.flags);
        buf.push(self.protocol);
        buf.push(self.algorithm);
        buf.extend_from_slice(&self.key.0);
        buf
    }
}

/// Update lease EDNS(0) option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseOption {
    /// Requested or granted lease (seconds)
    pub lease: u32,
    /// Requested or granted key lease (seconds)
    pub key_lease: u32,
    /// Whether the 4-byte form (lease only) is used
    pub short: bool,
}

impl LeaseOption {
    /// Long form carrying both values
    pub fn long(lease: u32, key_lease: u32) -> Self {
        Self {
            lease,
            key_lease,
            short: false,
        }
    }

    /// Short form; the key lease equals the lease
    pub fn short(lease: u32) -> Self {
        Self {
            lease,
            key_lease: lease,
            short: true,
        }
    }

    /// Find and decode the lease option among the options of an OPT record
    ///
    /// A missing option is [`UpdateError::Failed`]; an option of the wrong
    /// length, or one granting a lease beyond its key lease, is
    /// [`UpdateError::Parse`].
    pub fn find_in(opt: &OPT) -> UpdateResult<Self> {
        opt.get(EdnsCode::from(OPTION_CODE_UPDATE_LEASE))
            .ok_or(UpdateError::Failed)
            .and_then(Self::from_option)
    }

    /// Decode the lease option once located
    pub fn from_option(option: &EdnsOption) -> UpdateResult<Self> {
        match option {
            EdnsOption::Unknown(_, data) => Self::parse(data),
            _ => Err(UpdateError::Parse),
        }
    }

    /// Decode the option data
    pub fn parse(data: &[u8]) -> UpdateResult<Self> {
        let mut decoder = BinDecoder::new(data);

        let option = match data.len() {
            4 => Self::short(decoder.read_u32()?.unverified()),
            8 => Self::long(
                decoder.read_u32()?.unverified(),
                decoder.read_u32()?.unverified(),
            ),
            _ => return Err(UpdateError::Parse),
        };

        if option.lease > option.key_lease {
            return Err(UpdateError::Parse);
        }

        Ok(option)
    }

    /// OPT record options carrying this lease
    pub fn to_opt(&self) -> OPT {
        let mut data = self.lease.to_be_bytes().to_vec();
        if !self.short {
            data.extend_from_slice(&self.key_lease.to_be_bytes());
        }

        let mut opt = OPT::default();
        opt.insert(EdnsOption::Unknown(OPTION_CODE_UPDATE_LEASE, data));
        opt
    }
}

/// Fixed part of SIG RDATA ahead of the signer name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SigFixed {
    /// Type covered; zero for SIG(0)
    pub type_covered: u16,
    /// Signing algorithm
    pub algorithm: u8,
    /// Labels
    pub labels: u8,
    /// Original TTL
    pub original_ttl: u32,
    /// Signature expiration
    pub expiration: u32,
    /// Signature inception
    pub inception: u32,
    /// Key tag
    pub key_tag: u16,
}

impl SigFixed {
    pub(crate) fn read(decoder: &mut BinDecoder<'_>) -> UpdateResult<Self> {
        Ok(Self {
            type_covered: decoder.read_u16()?.unverified(),
            algorithm: decoder.read_u8()?.unverified(),
            labels: decoder.read_u8()?.unverified(),
            original_ttl: decoder.read_u32()?.unverified(),
            expiration: decoder.read_u32()?.unverified(),
            inception: decoder.read_u32()?.unverified(),
            key_tag: decoder.read_u16()?.unverified(),
        })
    }

    /// Encode the fixed part
    pub fn emit(&self, encoder: &mut BinEncoder<'_>) -> UpdateResult {
        encoder.emit_u16(self.type_covered)?;
        encoder.emit(self.algorithm)?;
        encoder.emit(self.labels)?;
        encoder.emit_u32(self.original_ttl)?;
        encoder.emit_u32(self.expiration)?;
        encoder.emit_u32(self.inception)?;
        encoder.emit_u16(self.key_tag)?;
        Ok(())
    }
}

/// TXT character strings as length-prefixed bytes
pub fn txt_data(txt: &TXT) -> Vec<u8> {
    let mut data = Vec::new();

    for entry in txt.txt_data() {
        data.push(entry.len() as u8);
        data.extend_from_slice(entry);
    }

    data
}
