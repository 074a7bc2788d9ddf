pub mod encrypt_message;

pub use encrypt_message::{EncryptMessageRequest, EncryptMessageResponse};
