//! PDF decryption for the Standard Security Handler (revisions 2 to 4)

mod aes;
mod handler;
mod permissions;
mod rc4;
mod standard_security;

pub use self::aes::{decrypt_aes_cbc, AesCbcReader};
pub use handler::{CryptMethod, EncryptionHandler, EncryptionParams};
pub use permissions::Permissions;
pub use rc4::{rc4, Rc4, Rc4Reader};
pub use standard_security::{
    compute_object_key, pad_password, password_to_bytes, SecurityHandlerRevision,
    StandardSecurity, PADDING,
};
