//! BLAKE2b-256 hashing for repodata documents and JLAP lines

use crate::error::PatchError;
use crate::types::Digest;
use blake2::digest::consts::U32;
use blake2::digest::Digest as _;
use blake2::digest::Mac;
use blake2::{Blake2b, Blake2bMac};

/// Plain hash of document bytes, as published in a JLAP footer's `latest`.
pub fn blake2_256(bytes: &[u8]) -> Digest {
    Blake2b::<U32>::digest(bytes).into()
}

/// Keyed hash chaining one JLAP line onto the previous checksum.
pub fn keyed_blake2_256(data: &[u8], key: &Digest) -> Result<Digest, PatchError> {
    let mut mac = <Blake2bMac<U32> as Mac>::new_from_slice(key)
        .map_err(|_| PatchError::MalformedStream("checksum key rejected".to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}
