/// In-process harness for protocol tests
///
/// A [`TestNetwork`] runs Ursulas behind a [`MemoryTransport`], so policies
/// can be granted and retrieved without sockets. Nodes can be taken offline,
/// slowed down or told to refuse arrangements.
///
/// # Example
///
/// ```rust,ignore
/// use common::testkit::TestNetwork;
///
/// #[tokio::test]
/// async fn test_grant() -> anyhow::Result<()> {
///     let net = TestNetwork::with_ursulas(3);
///     let alice = net.alice();
///     let bob = net.bob();
///
///     net.set_offline(&net.ids()[0], true);
///     // ...grant a 2-of-2 policy, the negotiator falls back to the third node
///     Ok(())
/// }
/// ```
mod network;
mod transport;

pub use network::TestNetwork;
pub use transport::{MemoryTransport, NodeBehavior};
