//! Domain models shared between the API, the invitation core, and storage.

pub mod invite;
pub mod mapping;
pub mod matrix_id;

pub use invite::{ThreePidInvite, ThreePidInviteReply, invite_id};
pub use mapping::ThreePidMapping;
pub use matrix_id::MatrixId;
