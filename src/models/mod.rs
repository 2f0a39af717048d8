//! Domain model module declarations.

pub mod result;
pub mod session;
pub mod statement;
pub mod verification;
