//! Minimal example: two owners sharing one in-memory ledger.
//!
//! Stores a secret per owner, reveals it with a freshly signed token, and
//! shows that neither the ledger nor the audit log holds anything usable.
//! Run with: `cargo run --example vault_demo`

use std::sync::Arc;

use rememberpass::audit::FileAuditSink;
use rememberpass::compute::InMemoryComputeLayer;
use rememberpass::ledger::InMemoryLedger;
use rememberpass::signer::{LocalSigner, StructuredSigner};
use rememberpass::typed_data::Eip712Domain;
use rememberpass::{Address, ComputeContext, Vault, VaultConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Setup
    let context = ComputeContext {
        contract: Address::parse_hex("0x5fbdb2315678afecb367f032d93f642f64180aa3")?,
        domain: Eip712Domain::decryption(
            31337,
            Address::parse_hex("0xe7f1725e7734ce288f8367e1bb143e90bb3f0512")?,
        ),
    };
    let compute = Arc::new(InMemoryComputeLayer::new(context.domain.clone()));
    let ledger = Arc::new(InMemoryLedger::new());
    let vault = Vault::new(ledger, compute.clone(), context, VaultConfig::default())?;

    let audit_path = std::env::temp_dir().join("rememberpass_audit.jsonl");
    vault.add_audit_sink(Box::new(FileAuditSink::new(&audit_path)?));

    // 2. Owners register their signing keys with the compute layer
    let alice = LocalSigner::from_seed(&[0xa1; 32])?;
    let bob = LocalSigner::from_seed(&[0xb0; 32])?;
    compute.trust_signer(&alice);
    compute.trust_signer(&bob);

    // 3. Each owner stores a secret
    vault
        .store(alice.address(), "Netflix", b"myNetflixPassword1")
        .await?;
    vault.store(bob.address(), "Email", b"correct horse").await?;
    println!("Stored one secret each for {} and {}", alice.address(), bob.address());

    // 4. The ledger is public: titles and ciphertext only
    for record in vault.list(alice.address()).await? {
        println!("  {:<10} {}", record.title, record.ciphertext);
    }

    // 5. Reveal signs a fresh time-bounded token
    let secret = vault.reveal(&alice, 0).await?;
    println!("Alice revealed: {}", String::from_utf8_lossy(&secret));

    // 6. One token can serve a whole session
    let token = vault.issue_token(&bob).await?;
    let secret = vault.reveal_with_token(&token, 0).await?;
    println!("Bob revealed: {}", String::from_utf8_lossy(&secret));

    // 7. Audit log
    let log = vault.audit_log();
    println!("Audit log: {} record(s)", log.len());
    for record in &log {
        println!("  {} {:?} #{} @ {}", record.owner, record.action, record.index, record.timestamp);
    }
    println!("Full audit also written to: {}", audit_path.display());

    Ok(())
}
