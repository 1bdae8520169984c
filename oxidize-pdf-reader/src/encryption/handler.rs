//! Encryption dictionary parsing and per-object decryption
//!
//! [`EncryptionParams`] validates an `/Encrypt` dictionary and refuses any
//! configuration it cannot decrypt. [`EncryptionHandler`] is the
//! authenticated state: the file key plus the cipher, fixed once a password
//! has been accepted.

use super::aes::{decrypt_aes_cbc, AesCbcReader};
use super::permissions::Permissions;
use super::rc4::{rc4, Rc4Reader};
use super::standard_security::{
    compute_object_key, password_to_bytes, SecurityHandlerRevision, StandardSecurity,
};
use crate::error::{ParseError, ParseResult};
use crate::objects::ObjectId;
use crate::parser::objects::{PdfDictionary, PdfObject, PdfString};
use std::io::Read;
use tracing::debug;

/// Cipher applied to strings and streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    /// `Identity`: data is stored in the clear
    Identity,
    Rc4,
    AesV2,
}

impl CryptMethod {
    fn from_cfm(cfm: &str) -> ParseResult<Self> {
        match cfm {
            "None" => Ok(CryptMethod::Identity),
            "V2" => Ok(CryptMethod::Rc4),
            "AESV2" => Ok(CryptMethod::AesV2),
            other => Err(ParseError::EncryptionNotSupported(format!(
                "crypt filter method {other}"
            ))),
        }
    }
}

/// A validated `/Encrypt` dictionary
#[derive(Debug, Clone)]
pub struct EncryptionParams {
    pub version: i64,
    pub method: CryptMethod,
    pub security: StandardSecurity,
}

impl EncryptionParams {
    /// Validate the encryption dictionary. Values must already be direct.
    pub fn from_dict(dict: &PdfDictionary, file_id: &[u8]) -> ParseResult<Self> {
        let unsupported = |msg: String| ParseError::EncryptionNotSupported(msg);

        match dict.get("Filter").and_then(PdfObject::as_name) {
            Some("Standard") => {}
            Some(other) => return Err(unsupported(format!("security handler {other}"))),
            None => return Err(unsupported("missing /Filter".to_string())),
        }

        let version = dict.get("V").and_then(PdfObject::as_integer).unwrap_or(0);
        let r = dict
            .get("R")
            .and_then(PdfObject::as_integer)
            .ok_or_else(|| unsupported("missing /R".to_string()))?;
        let revision = SecurityHandlerRevision::from_number(r)
            .ok_or_else(|| unsupported(format!("revision {r}")))?;

        let length_bits = dict.get("Length").and_then(PdfObject::as_integer);
        let (method, key_length) = match version {
            1 => (CryptMethod::Rc4, 5),
            2 => {
                let bits = length_bits.unwrap_or(40);
                if bits % 8 != 0 || !(40..=128).contains(&bits) {
                    return Err(unsupported(format!("key length {bits}")));
                }
                (CryptMethod::Rc4, (bits / 8) as usize)
            }
            4 => {
                let (method, cf_length) = Self::uniform_crypt_method(dict)?;
                let fallback = match length_bits {
                    Some(bits) => Self::key_length_from(bits)?,
                    None => 16,
                };
                let key_length = cf_length.unwrap_or(fallback);
                if method == CryptMethod::AesV2 && key_length != 16 {
                    return Err(unsupported(format!("AESV2 with a {key_length}-byte key")));
                }
                (method, key_length)
            }
            other => return Err(unsupported(format!("algorithm version {other}"))),
        };

        let owner_hash = Self::hash_entry(dict, "O")?;
        let user_hash = Self::hash_entry(dict, "U")?;
        let permissions = dict
            .get("P")
            .and_then(PdfObject::as_integer)
            .ok_or_else(|| ParseError::MissingKey("P".to_string()))?;
        let encrypt_metadata = dict
            .get("EncryptMetadata")
            .and_then(PdfObject::as_bool)
            .unwrap_or(true);

        Ok(Self {
            version,
            method,
            security: StandardSecurity {
                revision,
                key_length,
                owner_hash,
                user_hash,
                permissions: permissions as i32,
                file_id: file_id.to_vec(),
                encrypt_metadata,
            },
        })
    }

    /// V4 is accepted only when streams and strings use the same method and
    /// key length. The length is `None` when no crypt filter declares one.
    fn uniform_crypt_method(dict: &PdfDictionary) -> ParseResult<(CryptMethod, Option<usize>)> {
        let filters = dict.get("CF").and_then(PdfObject::as_dict);
        let lookup = |key: &str| -> ParseResult<(CryptMethod, Option<usize>)> {
            let name = dict
                .get(key)
                .and_then(PdfObject::as_name)
                .unwrap_or("Identity");
            if name == "Identity" {
                return Ok((CryptMethod::Identity, None));
            }
            let filter = filters
                .and_then(|cf| cf.get(name))
                .and_then(PdfObject::as_dict)
                .ok_or_else(|| {
                    ParseError::EncryptionNotSupported(format!("crypt filter {name} not defined"))
                })?;
            let cfm = filter
                .get("CFM")
                .and_then(PdfObject::as_name)
                .unwrap_or("None");
            let length = filter
                .get("Length")
                .and_then(PdfObject::as_integer)
                .map(Self::key_length_from)
                .transpose()?;
            Ok((CryptMethod::from_cfm(cfm)?, length))
        };

        let (streams, stream_length) = lookup("StmF")?;
        let (strings, string_length) = lookup("StrF")?;
        if streams != strings {
            return Err(ParseError::EncryptionNotSupported(format!(
                "streams use {streams:?} but strings use {strings:?}"
            )));
        }
        match (stream_length, string_length) {
            (Some(a), Some(b)) if a != b => Err(ParseError::EncryptionNotSupported(format!(
                "streams use {a}-byte keys but strings use {b}-byte keys"
            ))),
            (a, b) => Ok((streams, a.or(b))),
        }
    }

    /// Key length in bytes from a `/Length` given in bits (40 and up) or bytes
    /// `/Length` of a V4 file or crypt filter: bytes below 40, bits from 40 up
    fn key_length_from(length: i64) -> ParseResult<usize> {
        let bytes = if length >= 40 {
            if length % 8 != 0 {
                return Err(ParseError::EncryptionNotSupported(format!("key length {length} bits")));
            }
            length / 8
        } else {
            length
        };
        if !(5..=16).contains(&bytes) {
            return Err(ParseError::EncryptionNotSupported(format!("key length {length}")));
        }
        Ok(bytes as usize)
    }

    fn hash_entry(dict: &PdfDictionary, key: &str) -> ParseResult<Vec<u8>> {
        let bytes = dict
            .get(key)
            .and_then(PdfObject::as_string)
            .ok_or_else(|| ParseError::MissingKey(key.to_string()))?
            .as_bytes();
        if bytes.len() < 32 {
            return Err(ParseError::EncryptionNotSupported(format!(
                "/{key} is {} bytes, expected 32",
                bytes.len()
            )));
        }
        Ok(bytes.to_vec())
    }

    pub fn permissions(&self) -> Permissions {
        Permissions::from_p(i64::from(self.security.permissions))
    }
}

/// Authenticated decryption state for an open document
#[derive(Debug, Clone)]
pub struct EncryptionHandler {
    key: Vec<u8>,
    method: CryptMethod,
    encrypt_metadata: bool,
    permissions: Permissions,
}

impl EncryptionHandler {
    /// Try `password` as the user password, then as the owner password
    pub fn authenticate(params: &EncryptionParams, password: &str) -> ParseResult<Self> {
        let bytes = password_to_bytes(password);
        let key = params
            .security
            .authenticate_user(&bytes)
            .or_else(|| params.security.authenticate_owner(&bytes))
            .ok_or(ParseError::InvalidPassword)?;

        Ok(Self {
            key,
            method: params.method,
            encrypt_metadata: params.security.encrypt_metadata,
            permissions: params.permissions(),
        })
    }

    pub fn method(&self) -> CryptMethod {
        self.method
    }

    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    pub fn encrypts_metadata(&self) -> bool {
        self.encrypt_metadata
    }

    fn object_key(&self, id: ObjectId) -> Vec<u8> {
        compute_object_key(&self.key, id, self.method == CryptMethod::AesV2)
    }

    /// Decrypt one string or buffered stream belonging to object `id`
    pub fn decrypt_bytes(&self, id: ObjectId, data: &[u8]) -> ParseResult<Vec<u8>> {
        match self.method {
            CryptMethod::Identity => Ok(data.to_vec()),
            CryptMethod::Rc4 => Ok(rc4(&self.object_key(id), data)),
            CryptMethod::AesV2 => decrypt_aes_cbc(&self.object_key(id), data),
        }
    }

    /// Decrypt every string inside `object` in place
    pub fn decrypt_object(&self, id: ObjectId, object: &mut PdfObject) {
        if self.method == CryptMethod::Identity {
            return;
        }
        match object {
            PdfObject::String(s) => {
                let plain = self.decrypt_bytes(id, s.as_bytes()).unwrap_or_else(|e| {
                    debug!("Could not decrypt string in {id}: {e}");
                    Vec::new()
                });
                *s = PdfString(plain);
            }
            PdfObject::Array(array) => {
                for item in array.0.iter_mut() {
                    self.decrypt_object(id, item);
                }
            }
            PdfObject::Dictionary(dict) => self.decrypt_dict(id, dict),
            PdfObject::Stream(stream) => self.decrypt_dict(id, &mut stream.dict),
            _ => {}
        }
    }

    fn decrypt_dict(&self, id: ObjectId, dict: &mut PdfDictionary) {
        for value in dict.0.values_mut() {
            self.decrypt_object(id, value);
        }
    }

    /// Wrap raw stream bytes of object `id` in the matching decryptor
    pub fn decrypt_reader(
        &self,
        id: ObjectId,
        input: Box<dyn Read + Send>,
    ) -> Box<dyn Read + Send> {
        match self.method {
            CryptMethod::Identity => input,
            CryptMethod::Rc4 => Box::new(Rc4Reader::new(input, &self.object_key(id))),
            CryptMethod::AesV2 => Box::new(AesCbcReader::new(input, &self.object_key(id))),
        }
    }
}
