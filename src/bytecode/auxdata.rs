//! Decoding of the CBOR auxiliary data appended by compilers to the end of
//! runtime and creation bytecode.
//!
//! The trailer consists of a CBOR encoded map followed by
//! the 2-byte big-endian length of that map.

use minicbor::{data::Type, Decode, Decoder};
use semver::Version;
use thiserror::Error;

/// Number of bytes used to encode the length of the auxiliary data.
const LENGTH_BYTES: usize = 2;

/// Values of the auxiliary data map relevant for verification.
/// Keys not listed here are skipped during decoding.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct AuxData {
    pub ipfs: Option<Vec<u8>>,
    pub bzzr0: Option<Vec<u8>>,
    pub bzzr1: Option<Vec<u8>>,
    pub experimental: bool,
    pub solc: Option<Version>,
}

impl AuxData {
    pub fn from_cbor(encoded: &[u8]) -> Result<(Self, usize), minicbor::decode::Error> {
        let mut context = DecodeContext::default();
        let result = minicbor::decode_with(encoded, &mut context)?;

        Ok((result, context.used_size))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq, Hash)]
enum ParseError {
    #[error("invalid auxdata type; expected \"map\", found \"{0}\"")]
    InvalidAuxdataType(Type),
    #[error("indefinite length maps are not supported")]
    IndefiniteMap,
    #[error("invalid {key} type; expected \"{expected}\", found=\"{actual}\"")]
    InvalidValueType {
        key: &'static str,
        expected: Type,
        actual: Type,
    },
}

impl From<ParseError> for minicbor::decode::Error {
    fn from(error: ParseError) -> minicbor::decode::Error {
        minicbor::decode::Error::custom(error)
    }
}

#[derive(Default, Debug, Clone, PartialEq, Eq)]
struct DecodeContext {
    used_size: usize,
}

impl<'b> Decode<'b, DecodeContext> for AuxData {
    fn decode(
        d: &mut Decoder<'b>,
        ctx: &mut DecodeContext,
    ) -> Result<Self, minicbor::decode::Error> {
        match d.datatype()? {
            Type::Map => {}
            ty => Err(ParseError::InvalidAuxdataType(ty))?,
        }

        let entries = d.map()?.ok_or(ParseError::IndefiniteMap)?;

        let mut auxdata = AuxData::default();
        for _ in 0..entries {
            if d.datatype()? != Type::String {
                // Not a key we know about; skip both the key and its value
                d.skip()?;
                d.skip()?;
                continue;
            }
            match d.str()? {
                "ipfs" => auxdata.ipfs = Some(decode_bytes(d, "ipfs")?),
                "bzzr0" => auxdata.bzzr0 = Some(decode_bytes(d, "bzzr0")?),
                "bzzr1" => auxdata.bzzr1 = Some(decode_bytes(d, "bzzr1")?),
                "experimental" => {
                    validate_value_datatype(d, "experimental", Type::Bool)?;
                    auxdata.experimental = d.bool()?;
                }
                "solc" => auxdata.solc = decode_solc_version(d)?,
                _ => d.skip()?,
            }
        }

        ctx.used_size = d.position();
        Ok(auxdata)
    }
}

fn validate_value_datatype(
    d: &mut Decoder,
    key: &'static str,
    expected: Type,
) -> Result<(), minicbor::decode::Error> {
    let ty = d.datatype()?;
    if ty != expected {
        Err(ParseError::InvalidValueType {
            key,
            expected,
            actual: ty,
        })?
    }

    Ok(())
}

fn decode_bytes(d: &mut Decoder, key: &'static str) -> Result<Vec<u8>, minicbor::decode::Error> {
    validate_value_datatype(d, key, Type::Bytes)?;
    Ok(d.bytes()?.to_vec())
}

/// Release builds encode the version as 3 raw bytes,
/// prerelease builds as the full version string.
fn decode_solc_version(d: &mut Decoder) -> Result<Option<Version>, minicbor::decode::Error> {
    match d.datatype()? {
        Type::Bytes => {
            let raw = d.bytes()?;
            match raw {
                [major, minor, patch] => Ok(Some(Version::new(
                    *major as u64,
                    *minor as u64,
                    *patch as u64,
                ))),
                _ => Ok(None),
            }
        }
        Type::String => Ok(Version::parse(d.str()?).ok()),
        _ => {
            d.skip()?;
            Ok(None)
        }
    }
}

/// Splits bytecode into the code itself and the decoded auxiliary data trailer.
///
/// Returns [`None`] if the bytecode does not end with a valid trailer.
pub fn split(bytecode: &[u8]) -> Option<(&[u8], AuxData)> {
    let len = bytecode.len();
    if len < LENGTH_BYTES {
        return None;
    }

    let mut encoded_length_bytes = [0u8; LENGTH_BYTES];
    encoded_length_bytes.copy_from_slice(&bytecode[len - LENGTH_BYTES..]);
    let encoded_length = u16::from_be_bytes(encoded_length_bytes) as usize;
    if encoded_length == 0 || encoded_length + LENGTH_BYTES > len {
        return None;
    }

    let start = len - LENGTH_BYTES - encoded_length;
    let (auxdata, used_size) = AuxData::from_cbor(&bytecode[start..len - LENGTH_BYTES]).ok()?;
    if used_size != encoded_length {
        return None;
    }

    Some((&bytecode[..start], auxdata))
}

/// Removes the auxiliary data trailer if one is present.
/// Bytecode without a valid trailer is returned unchanged.
pub fn trim(bytecode: &[u8]) -> &[u8] {
    split(bytecode)
        .map(|(code, _)| code)
        .unwrap_or(bytecode)
}
