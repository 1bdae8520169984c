//! Object identities shared by the xref table, the cache and the value model

mod primitive;

pub use primitive::ObjectId;
