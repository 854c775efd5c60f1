//! AWS side of a login: profile files and STS

pub mod profile;
pub mod sts;
