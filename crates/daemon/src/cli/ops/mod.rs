pub mod alice;
pub mod bob;
pub mod daemon;
pub mod enrico;
pub mod health;
pub mod init;
pub mod node;
pub mod version;

pub use alice::Alice;
pub use bob::Bob;
pub use daemon::Daemon;
pub use enrico::Enrico;
pub use health::Health;
pub use init::Init;
pub use node::Node;
pub use version::Version;
