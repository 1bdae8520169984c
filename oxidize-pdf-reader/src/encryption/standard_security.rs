//! Standard Security Handler, revisions 2 to 4 (ISO 32000-1 Section 7.6.3)
//!
//! Password handling and key derivation: Algorithm 2 (file key), 3 (`O`
//! value), 4/5 (`U` value), 6/7 (user/owner authentication) and 1 (per-object
//! key).

use super::rc4::rc4;
use crate::objects::ObjectId;

/// Padding used in password processing
pub const PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// Security handler revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SecurityHandlerRevision {
    /// RC4 40-bit
    R2 = 2,
    /// RC4 up to 128-bit
    R3 = 3,
    /// Crypt filters, `EncryptMetadata`
    R4 = 4,
}

impl SecurityHandlerRevision {
    pub fn from_number(r: i64) -> Option<Self> {
        match r {
            2 => Some(Self::R2),
            3 => Some(Self::R3),
            4 => Some(Self::R4),
            _ => None,
        }
    }
}

/// Everything from the encryption dictionary the key algorithms need
#[derive(Debug, Clone)]
pub struct StandardSecurity {
    pub revision: SecurityHandlerRevision,
    /// File key length in bytes
    pub key_length: usize,
    pub owner_hash: Vec<u8>,
    pub user_hash: Vec<u8>,
    pub permissions: i32,
    /// First element of the trailer `/ID` array
    pub file_id: Vec<u8>,
    pub encrypt_metadata: bool,
}

/// Map a password to the bytes the algorithms hash.
///
/// Characters are taken as Latin-1; anything above U+00FF becomes `?`.
pub fn password_to_bytes(password: &str) -> Vec<u8> {
    password
        .chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

/// Pad or truncate a password to 32 bytes
pub fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = [0u8; 32];
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PADDING[..32 - len]);
    padded
}

impl StandardSecurity {
    /// Algorithm 2: file encryption key from a user password
    pub fn compute_encryption_key(&self, password: &[u8]) -> Vec<u8> {
        let mut data = Vec::with_capacity(32 + self.owner_hash.len() + 4 + self.file_id.len() + 4);
        data.extend_from_slice(&pad_password(password));
        data.extend_from_slice(&self.owner_hash);
        data.extend_from_slice(&self.permissions.to_le_bytes());
        data.extend_from_slice(&self.file_id);
        if self.revision >= SecurityHandlerRevision::R4 && !self.encrypt_metadata {
            data.extend_from_slice(&[0xFF; 4]);
        }

        let n = self.key_length;
        let mut hash = md5::compute(&data).0;
        if self.revision >= SecurityHandlerRevision::R3 {
            for _ in 0..50 {
                hash = md5::compute(&hash[..n]).0;
            }
        }
        hash[..n].to_vec()
    }

    /// Algorithms 4 and 5: the `U` value produced by a file key
    pub fn compute_user_hash(&self, key: &[u8]) -> Vec<u8> {
        if self.revision == SecurityHandlerRevision::R2 {
            return rc4(key, &PADDING);
        }

        let mut data = PADDING.to_vec();
        data.extend_from_slice(&self.file_id);
        let hash = md5::compute(&data);
        let mut result = rc4(key, &hash.0);
        for round in 1..=19u8 {
            let round_key: Vec<u8> = key.iter().map(|b| b ^ round).collect();
            result = rc4(&round_key, &result);
        }
        // The remaining 16 bytes are arbitrary padding
        result.resize(32, 0);
        result
    }

    /// Algorithm 3: the `O` value for an owner and user password pair
    pub fn compute_owner_hash(&self, owner_password: &[u8], user_password: &[u8]) -> Vec<u8> {
        let key = self.owner_key(owner_password);
        let mut result = rc4(&key, &pad_password(user_password));
        if self.revision >= SecurityHandlerRevision::R3 {
            for round in 1..=19u8 {
                let round_key: Vec<u8> = key.iter().map(|b| b ^ round).collect();
                result = rc4(&round_key, &result);
            }
        }
        result
    }

    /// RC4 key derived from the owner password (Algorithm 3 steps a to d)
    fn owner_key(&self, owner_password: &[u8]) -> Vec<u8> {
        let mut hash = md5::compute(pad_password(owner_password)).0;
        if self.revision >= SecurityHandlerRevision::R3 {
            for _ in 0..50 {
                hash = md5::compute(hash).0;
            }
        }
        let n = if self.revision == SecurityHandlerRevision::R2 {
            5
        } else {
            self.key_length
        };
        hash[..n].to_vec()
    }

    /// Algorithm 6: the file key when `password` is the user password
    pub fn authenticate_user(&self, password: &[u8]) -> Option<Vec<u8>> {
        let key = self.compute_encryption_key(password);
        let expected = self.compute_user_hash(&key);
        let matches = match self.revision {
            SecurityHandlerRevision::R2 => self.user_hash.get(..32) == Some(&expected[..]),
            _ => self.user_hash.get(..16) == Some(&expected[..16]),
        };
        matches.then_some(key)
    }

    /// Algorithm 7: the file key when `password` is the owner password
    pub fn authenticate_owner(&self, password: &[u8]) -> Option<Vec<u8>> {
        let key = self.owner_key(password);
        let mut user_password = self.owner_hash.get(..32)?.to_vec();
        if self.revision == SecurityHandlerRevision::R2 {
            user_password = rc4(&key, &user_password);
        } else {
            for round in (0..=19u8).rev() {
                let round_key: Vec<u8> = key.iter().map(|b| b ^ round).collect();
                user_password = rc4(&round_key, &user_password);
            }
        }
        self.authenticate_user(&user_password)
    }
}

/// Algorithm 1: the key for one object's strings and streams
pub fn compute_object_key(file_key: &[u8], id: ObjectId, aes: bool) -> Vec<u8> {
    let mut data = Vec::with_capacity(file_key.len() + 9);
    data.extend_from_slice(file_key);
    data.extend_from_slice(&id.number().to_le_bytes()[..3]);
    data.extend_from_slice(&id.generation().to_le_bytes());
    if aes {
        data.extend_from_slice(b"sAlT");
    }
    let hash = md5::compute(&data);
    let n = (file_key.len() + 5).min(16);
    hash.0[..n].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn handler(revision: SecurityHandlerRevision, key_length: usize) -> StandardSecurity {
        StandardSecurity {
            revision,
            key_length,
            owner_hash: Vec::new(),
            user_hash: Vec::new(),
            permissions: -4,
            file_id: b"0123456789abcdef".to_vec(),
            encrypt_metadata: true,
        }
    }

    /// Fill in O and U the way a writer would
    fn seal(mut sec: StandardSecurity, owner: &[u8], user: &[u8]) -> StandardSecurity {
        sec.owner_hash = sec.compute_owner_hash(owner, user);
        let key = sec.compute_encryption_key(user);
        sec.user_hash = sec.compute_user_hash(&key);
        sec
    }

    #[test]
    fn test_pad_password() {
        let padded = pad_password(b"test");
        assert_eq!(&padded[..4], b"test");
        assert_eq!(&padded[4..], &PADDING[..28]);
        assert_eq!(pad_password(b""), PADDING);
        let long = [b'x'; 40];
        assert_eq!(pad_password(&long), [b'x'; 32]);
    }

    #[test]
    fn test_password_to_bytes() {
        assert_eq!(password_to_bytes("abc"), b"abc");
        assert_eq!(password_to_bytes("caf\u{e9}"), vec![b'c', b'a', b'f', 0xE9]);
        assert_eq!(password_to_bytes("\u{20ac}1"), b"?1");
    }

    #[test]
    fn test_user_and_owner_authentication() {
        for (revision, len) in [
            (SecurityHandlerRevision::R2, 5),
            (SecurityHandlerRevision::R3, 16),
            (SecurityHandlerRevision::R3, 7),
            (SecurityHandlerRevision::R4, 16),
        ] {
            let sec = seal(handler(revision, len), b"owner", b"user");
            let key = sec.authenticate_user(b"user").expect("user password");
            assert_eq!(key.len(), len);
            assert_eq!(sec.authenticate_owner(b"owner"), Some(key), "{revision:?}");
            assert!(sec.authenticate_user(b"wrong").is_none());
            assert!(sec.authenticate_owner(b"wrong").is_none());
        }
    }

    #[test]
    fn test_empty_user_password() {
        let sec = seal(handler(SecurityHandlerRevision::R3, 16), b"owner", b"");
        assert!(sec.authenticate_user(b"").is_some());
    }

    #[test]
    fn test_encrypt_metadata_changes_key() {
        let mut sec = handler(SecurityHandlerRevision::R4, 16);
        let with = sec.compute_encryption_key(b"");
        sec.encrypt_metadata = false;
        assert_ne!(with, sec.compute_encryption_key(b""));
    }

    #[test]
    fn test_object_key() {
        let file_key = [0x11u8; 5];
        let key = compute_object_key(&file_key, ObjectId::new(7, 0), false);
        assert_eq!(key.len(), 10);

        let mut input = file_key.to_vec();
        input.extend_from_slice(&[7, 0, 0, 0, 0]);
        assert_eq!(key, md5::compute(&input).0[..10].to_vec());

        let aes_key = compute_object_key(&[0u8; 16], ObjectId::new(7, 0), true);
        assert_eq!(aes_key.len(), 16);
        assert_ne!(aes_key, compute_object_key(&[0u8; 16], ObjectId::new(7, 0), false));
    }
}
