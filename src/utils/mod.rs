//! Small shared helpers.

pub mod mime;
pub mod plural;
