//! Repository layer: query functions organized by table.

pub mod invites;
pub mod mappings;
pub mod signing_keys;
