pub mod card;
pub mod forget_nodes;
pub mod known_nodes;

pub use card::{CardRequest, CardResponse};
pub use forget_nodes::{ForgetNodesRequest, ForgetNodesResponse};
pub use known_nodes::{KnownNode, KnownNodesRequest, KnownNodesResponse};
