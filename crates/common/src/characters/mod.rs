//! The four roles of the protocol
//!
//! Each role is a struct composed from the capability traits in [`powers`]:
//!
//! - [`Alice`] signs, encrypts and delegates: she creates policies and grants
//!   them to Bob.
//! - [`Bob`] signs his requests and decrypts what the Ursulas re-encrypt.
//! - [`Enrico`] encrypts under a policy key and signs what he produced.
//! - [`Ursula`] holds key fragments and re-encrypts capsules.

mod alice;
mod bob;
mod enrico;
pub mod powers;
mod ursula;

pub use alice::{Alice, PolicyParams};
pub use bob::Bob;
pub use enrico::Enrico;
pub use powers::{CanDecrypt, CanEncrypt, CanReencrypt, CanSign, Refusal};
pub use ursula::{unix_now, Ursula};
