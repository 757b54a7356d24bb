//! Device identities derived from certificate hashes.
//!
//! A device id is the SHA-256 of the peer's DER certificate, rendered
//! as a check-summed base32 string: the 52 data characters are split
//! into 4 groups of 13, each group gets a Luhn mod-32 check character,
//! and the result is printed as 8 dash-separated groups of 7.

use std::fmt;
use std::str::FromStr;

use crate::error::{GenericError, GenericResult};
use crate::sha::Sha256Hash;

const BASE32_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Length of a device id hash.
pub const DEVICE_ID_LEN: usize = 32;

/// Number of base32 data characters in a device id string.
const DATA_CHARS: usize = 52;

/// Number of characters per check group (data only).
const GROUP_DATA_CHARS: usize = 13;

/// Total characters in the check-summed form.
const CHECKED_CHARS: usize = 56;

/// Short device id, the first 8 bytes of the full id in big-endian.
pub type ShortId = u64;

/// Identity of a device, the SHA-256 over its DER certificate.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId {
    hash: [u8; DEVICE_ID_LEN],
}

impl DeviceId {
    /// Derive a device id from the given DER certificate bytes.
    pub fn from_der_cert(der: &[u8]) -> DeviceId {
        let hash: [u8; DEVICE_ID_LEN] = Sha256Hash::from_bytes(der).into();

        DeviceId { hash }
    }

    /// Create a device id directly from the given hash.
    pub fn from_hash(hash: &[u8]) -> GenericResult<DeviceId> {
        if hash.len() != DEVICE_ID_LEN {
            Err(GenericError::InvalidLength(DEVICE_ID_LEN))
        } else {
            let mut my_hash = [0u8; DEVICE_ID_LEN];
            my_hash.copy_from_slice(hash);

            Ok(DeviceId { hash: my_hash })
        }
    }

    /// Short form of the id, the first 8 bytes in big-endian.
    pub fn short_id(&self) -> ShortId {
        let mut value = 0u64;
        for byte in self.hash[..8].iter() {
            value = (value << 8) | (*byte as u64);
        }

        value
    }

    /// The 7 character display prefix used in conflict copy names.
    pub fn short_str(&self) -> String {
        let mut encoded = base32_encode(&self.hash);
        encoded.truncate(7);

        encoded
    }
}

impl AsRef<[u8]> for DeviceId {
    fn as_ref(&self) -> &[u8] {
        &self.hash
    }
}

impl From<[u8; DEVICE_ID_LEN]> for DeviceId {
    fn from(hash: [u8; DEVICE_ID_LEN]) -> DeviceId {
        DeviceId { hash }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let data = base32_encode(&self.hash);
        debug_assert_eq!(data.len(), DATA_CHARS);

        let mut checked = String::with_capacity(CHECKED_CHARS);
        for group in data.as_bytes().chunks(GROUP_DATA_CHARS) {
            checked.push_str(::std::str::from_utf8(group).unwrap());
            checked.push(luhn32(group));
        }

        for (index, chunk) in checked.as_bytes().chunks(7).enumerate() {
            if index != 0 {
                write!(f, "-")?;
            }
            write!(f, "{}", ::std::str::from_utf8(chunk).unwrap())?;
        }

        Ok(())
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "DeviceId({})", self.short_str())
    }
}

impl FromStr for DeviceId {
    type Err = GenericError;

    fn from_str(s: &str) -> GenericResult<DeviceId> {
        let stripped: String = s
            .chars()
            .filter(|c| *c != '-' && *c != ' ')
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if stripped.len() != CHECKED_CHARS {
            return Err(GenericError::InvalidLength(CHECKED_CHARS));
        }

        let mut data = String::with_capacity(DATA_CHARS);
        for (index, group) in stripped.as_bytes().chunks(GROUP_DATA_CHARS + 1).enumerate() {
            let (payload, check) = group.split_at(GROUP_DATA_CHARS);

            if luhn32(payload) != check[0] as char {
                return Err(GenericError::InvalidCheckCharacter(index));
            }
            data.push_str(::std::str::from_utf8(payload).unwrap());
        }

        let bytes = base32_decode(&data)?;
        DeviceId::from_hash(&bytes[..DEVICE_ID_LEN])
    }
}

/// Render the 7 character display prefix of a short id.
///
/// The prefix only depends on the first 35 bits of the id, so the short
/// form of a full `DeviceId` and of its `ShortId` agree.
pub fn format_short_id(id: ShortId) -> String {
    let mut bytes = [0u8; 8];
    for (index, slot) in bytes.iter_mut().enumerate() {
        *slot = (id >> (56 - index * 8)) as u8;
    }

    let mut encoded = base32_encode(&bytes);
    encoded.truncate(7);

    encoded
}

/// Base32 (RFC 4648, no padding) encoding of the given bytes.
fn base32_encode(bytes: &[u8]) -> String {
    let mut output = String::with_capacity((bytes.len() * 8 + 4) / 5);
    let mut accum = 0u32;
    let mut accum_bits = 0u32;

    for byte in bytes.iter() {
        accum = (accum << 8) | (*byte as u32);
        accum_bits += 8;

        while accum_bits >= 5 {
            accum_bits -= 5;
            let index = ((accum >> accum_bits) & 0x1F) as usize;
            output.push(BASE32_ALPHABET[index] as char);
        }
    }

    if accum_bits > 0 {
        let index = ((accum << (5 - accum_bits)) & 0x1F) as usize;
        output.push(BASE32_ALPHABET[index] as char);
    }

    output
}

/// Base32 decoding; trailing partial bits are discarded.
fn base32_decode(data: &str) -> GenericResult<Vec<u8>> {
    let mut output = Vec::with_capacity(data.len() * 5 / 8);
    let mut accum = 0u32;
    let mut accum_bits = 0u32;

    for (index, symbol) in data.bytes().enumerate() {
        let value = match BASE32_ALPHABET.iter().position(|a| *a == symbol) {
            Some(value) => value as u32,
            None => return Err(GenericError::InvalidCharacter(index)),
        };

        accum = (accum << 5) | value;
        accum_bits += 5;

        if accum_bits >= 8 {
            accum_bits -= 8;
            output.push((accum >> accum_bits) as u8);
        }
    }

    Ok(output)
}

/// Luhn mod-32 check character over the base32 alphabet.
fn luhn32(payload: &[u8]) -> char {
    let n = 32u32;
    let mut factor = 1u32;
    let mut sum = 0u32;

    for symbol in payload.iter() {
        let codepoint = BASE32_ALPHABET
            .iter()
            .position(|a| a == symbol)
            .expect("bep_util: Non Base32 Character Given To Luhn Check") as u32;
        let addend = factor * codepoint;

        factor = if factor == 2 { 1 } else { 2 };
        sum += addend / n + addend % n;
    }

    let check = (n - sum % n) % n;

    BASE32_ALPHABET[check as usize] as char
}
