//! Identity and role handling: password hashing, signed tokens and the
//! capability checks every handler goes through.

pub mod password;
pub mod policy;
pub mod token;

pub use policy::CurrentUser;
