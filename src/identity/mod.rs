//! Identity/session service boundary: secret hashing and session token
//! issue/verify, plus the request extractor that turns a bearer token into
//! a live principal.

pub mod extractors;
pub mod jwt;
pub mod password;
