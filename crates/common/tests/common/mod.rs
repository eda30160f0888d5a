//! Shared test utilities for sharing and federated integration tests
#![allow(dead_code)]

use common::crypto::KeyPair;
use common::federated::{AggregationStrategy, Coordinator, FederatedSettings};
use common::sharing::{Identity, MemoryBlobStore, MemoryKeyDirectory, Session, ShareRegistry};

/// Route library logs to the test harness; set RUST_LOG to see them
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub type Registry = ShareRegistry<MemoryBlobStore, MemoryKeyDirectory>;
pub type TestSession = Session<MemoryBlobStore, MemoryKeyDirectory>;

pub fn registry() -> Registry {
    init_tracing();
    ShareRegistry::new(MemoryBlobStore::new(), MemoryKeyDirectory::new())
}

/// Create a user with a fresh key pair and publish its public key
pub async fn user(registry: &Registry, user_id: u64, username: &str) -> TestSession {
    let session = Session::new(
        Identity::new(user_id, username),
        KeyPair::generate().unwrap(),
        registry.clone(),
    );
    session.publish_key().await.unwrap();
    session
}

/// A registry with alice and bob, both with published keys
pub async fn setup_alice_and_bob() -> (Registry, TestSession, TestSession) {
    let registry = registry();
    let alice = user(&registry, 1, "alice").await;
    let bob = user(&registry, 2, "bob").await;
    (registry, alice, bob)
}

/// A coordinator over one feature with an initialised model and registered clients
pub fn coordinator(min_clients: usize, clients: &[&str]) -> Coordinator {
    init_tracing();
    let coordinator = Coordinator::new(FederatedSettings {
        num_features: 1,
        min_clients_for_round: min_clients,
        max_rounds: 50,
        strategy: AggregationStrategy::FedAvg,
    })
    .unwrap();
    coordinator.init_model(1).unwrap();
    for client in clients {
        coordinator.register_client(client);
    }
    coordinator
}
