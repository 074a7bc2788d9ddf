//! Character control surface, version 0
//!
//! Every success is wrapped as `{"result": .., "version": ..}` and every
//! failure as `{"error": {"category": .., "message": ..}, "version": ..}`.
//! Keys travel as hex; treasure maps, message kits, signatures and
//! plaintexts as standard base64.

use axum::routing::{delete, get, post, put};
use axum::Router;

pub mod alice;
pub mod bob;
mod control;
pub mod enrico;
pub mod node;

pub use control::{ControlError, Envelope, Payload};

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    let alice = Router::new()
        .route("/create_policy", put(alice::create_policy::handler))
        .route(
            "/derive_policy_pubkey/:label",
            post(alice::derive_policy_pubkey::handler),
        )
        .route("/grant", put(alice::grant::handler))
        .route("/revoke", delete(alice::revoke::handler));

    let bob = Router::new()
        .route("/join_policy", post(bob::join_policy::handler))
        .route("/public_keys", get(bob::public_keys::handler))
        .route("/retrieve", post(bob::retrieve::handler));

    let enrico = Router::new().route("/encrypt_message", post(enrico::encrypt_message::handler));

    let node = Router::new()
        .route(
            "/known_nodes",
            get(node::known_nodes::handler).delete(node::forget_nodes::handler),
        )
        .route("/card", get(node::card::handler));

    Router::new()
        .nest("/alice", alice)
        .nest("/bob", bob)
        .nest("/enrico", enrico)
        .nest("/node", node)
        .with_state(state)
}
