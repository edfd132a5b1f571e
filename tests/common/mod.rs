#![allow(dead_code)]

use std::sync::Arc;

use rememberpass::compute::InMemoryComputeLayer;
use rememberpass::ledger::InMemoryLedger;
use rememberpass::signer::LocalSigner;
use rememberpass::typed_data::Eip712Domain;
use rememberpass::{Address, ComputeContext, Vault, VaultConfig};

pub const CONTRACT: Address = Address::from_bytes([0xc0; 20]);
pub const VERIFIER: Address = Address::from_bytes([0xd0; 20]);

pub fn domain() -> Eip712Domain {
    Eip712Domain::decryption(31337, VERIFIER)
}

pub fn context() -> ComputeContext {
    ComputeContext {
        contract: CONTRACT,
        domain: domain(),
    }
}

pub fn alice() -> LocalSigner {
    LocalSigner::from_seed(&[0xa1; 32]).unwrap()
}

pub fn bob() -> LocalSigner {
    LocalSigner::from_seed(&[0xb0; 32]).unwrap()
}

pub struct Fixture {
    pub compute: Arc<InMemoryComputeLayer>,
    pub ledger: Arc<InMemoryLedger>,
    pub vault: Vault,
    pub alice: LocalSigner,
    pub bob: LocalSigner,
}

pub fn fixture() -> Fixture {
    fixture_with(InMemoryComputeLayer::new(domain()), VaultConfig::default())
}

/// Both alice and bob are registered with the compute layer.
pub fn fixture_with(compute: InMemoryComputeLayer, config: VaultConfig) -> Fixture {
    let compute = Arc::new(compute);
    let ledger = Arc::new(InMemoryLedger::new());
    let alice = alice();
    let bob = bob();
    compute.trust_signer(&alice);
    compute.trust_signer(&bob);
    let vault = Vault::new(ledger.clone(), compute.clone(), context(), config).unwrap();
    Fixture {
        compute,
        ledger,
        vault,
        alice,
        bob,
    }
}
