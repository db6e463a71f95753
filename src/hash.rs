use std::fmt;
use std::str::FromStr;

use derive_more::Display;
use ring::digest;
use thiserror::Error;

const MD5_SIZE: usize = 128 / 8;
const SHA1_SIZE: usize = 160 / 8;
const SHA256_SIZE: usize = 256 / 8;
const SHA512_SIZE: usize = 512 / 8;
const LARGEST_ALGORITHM: Algorithm = Algorithm::Sha512;

/// A digest algorithm a derivation output may declare.
///
/// Only SHA-256 is ever computed by this crate (for content addressing);
/// the others exist so fixed-output hashes declared with them parse,
/// validate and round-trip.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash, Display, Default)]
pub enum Algorithm {
    #[display("md5")]
    Md5,
    #[display("sha1")]
    Sha1,
    #[default]
    #[display("sha256")]
    Sha256,
    #[display("sha512")]
    Sha512,
}

impl Algorithm {
    /// Size in bytes of a digest of this algorithm.
    #[inline]
    pub const fn size(&self) -> usize {
        match self {
            Algorithm::Md5 => MD5_SIZE,
            Algorithm::Sha1 => SHA1_SIZE,
            Algorithm::Sha256 => SHA256_SIZE,
            Algorithm::Sha512 => SHA512_SIZE,
        }
    }

    /// Length of the bare base-16 form of a digest of this algorithm.
    #[inline]
    pub const fn base16_len(&self) -> usize {
        self.size() * 2
    }
}

#[derive(Error, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
#[error("unsupported digest algorithm '{0}'")]
pub struct UnknownAlgorithm(pub String);

impl FromStr for Algorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("sha256") {
            Ok(Algorithm::Sha256)
        } else if s.eq_ignore_ascii_case("sha512") {
            Ok(Algorithm::Sha512)
        } else if s.eq_ignore_ascii_case("sha1") {
            Ok(Algorithm::Sha1)
        } else if s.eq_ignore_ascii_case("md5") {
            Ok(Algorithm::Md5)
        } else {
            Err(UnknownAlgorithm(s.to_owned()))
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum ParseHashError {
    #[error("{0}")]
    Algorithm(
        #[from]
        #[source]
        UnknownAlgorithm,
    ),
    #[error("hash '{hash}' has wrong length for hash type '{algorithm}'")]
    WrongLength { algorithm: Algorithm, hash: String },
    #[error("invalid base-16 digit in hash '{0}'")]
    BadDigit(String),
}

/// A digest value tagged with its algorithm. Stored inline, sized for the
/// largest supported algorithm.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct Hash {
    algorithm: Algorithm,
    data: [u8; LARGEST_ALGORITHM.size()],
}

impl Hash {
    pub fn new(algorithm: Algorithm, digest: &[u8]) -> Hash {
        debug_assert_eq!(digest.len(), algorithm.size());
        let mut data = [0u8; LARGEST_ALGORITHM.size()];
        data[..algorithm.size()].copy_from_slice(digest);
        Hash { algorithm, data }
    }

    /// Parses a bare (unprefixed) base-16 digest of the given algorithm.
    pub fn parse_hex(s: &str, algorithm: Algorithm) -> Result<Hash, ParseHashError> {
        if s.len() != algorithm.base16_len() {
            return Err(ParseHashError::WrongLength {
                algorithm,
                hash: s.to_owned(),
            });
        }
        let mut data = [0u8; LARGEST_ALGORITHM.size()];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hi = hex_digit(chunk[0]).ok_or_else(|| ParseHashError::BadDigit(s.to_owned()))?;
            let lo = hex_digit(chunk[1]).ok_or_else(|| ParseHashError::BadDigit(s.to_owned()))?;
            data[i] = hi << 4 | lo;
        }
        Ok(Hash { algorithm, data })
    }

    #[inline]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    #[inline]
    pub fn digest_bytes(&self) -> &[u8] {
        &self.data[..self.algorithm.size()]
    }
}

fn hex_digit(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        _ => None,
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        self.digest_bytes()
    }
}

impl fmt::LowerHex for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.digest_bytes() {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({}:{:x})", self.algorithm, self)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:x}", self.algorithm, self)
    }
}

impl From<Sha256> for Hash {
    fn from(value: Sha256) -> Self {
        Hash::new(Algorithm::Sha256, value.as_ref())
    }
}

/// A SHA-256 digest. The content-addressing digest type: term hashing and
/// store path derivation only ever produce this.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct Sha256([u8; SHA256_SIZE]);

impl Sha256 {
    pub fn digest<B: AsRef<[u8]>>(data: B) -> Sha256 {
        let mut out = [0u8; SHA256_SIZE];
        out.copy_from_slice(digest::digest(&digest::SHA256, data.as_ref()).as_ref());
        Sha256(out)
    }

    #[inline]
    pub fn digest_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Sha256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; SHA256_SIZE]> for Sha256 {
    fn from(digest: [u8; SHA256_SIZE]) -> Self {
        Sha256(digest)
    }
}

impl fmt::LowerHex for Sha256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Sha256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sha256({:x})", self)
    }
}
