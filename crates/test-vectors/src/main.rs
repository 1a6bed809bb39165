//! Test Vector Generator
//!
//! Generates JSON test vectors for verifier implementations outside this
//! workspace: leaf encodings, roots, proofs, tampered claims, instruction
//! opcodes and encoded claim instructions.

use anyhow::{Context, Result};
use claim_ledger::{ClaimRequest, EpochState, Instruction, InstructionKind};
use clap::Parser;
use merkle_gen::{derive_subject_id, Address, AllocationRecord, EpochTree, Hash, TreeBuilder};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "generate-test-vectors")]
#[command(about = "Generate Merkle claim test vectors")]
struct Args {
    /// Output directory for test vectors
    #[arg(short, long, default_value = "test-vectors")]
    output: PathBuf,

    /// Leaf counts to generate trees for
    #[arg(long, value_delimiter = ',', default_value = "1,2,3,5,8,13")]
    sizes: Vec<usize>,

    /// Channel name the vectors are published under
    #[arg(long, default_value = "vectors")]
    channel: String,

    /// Epoch the vectors are published under
    #[arg(long, default_value_t = 1)]
    epoch: u64,
}

/// Test vector file format
#[derive(Debug, Serialize)]
struct TestVectorFile {
    channel: String,
    subject: String,
    epoch: u64,
    opcodes: Vec<OpcodeVector>,
    epoch_state_discriminator: String,
    trees: Vec<TreeVector>,
}

#[derive(Debug, Serialize)]
struct OpcodeVector {
    name: &'static str,
    opcode: String,
}

/// One tree with its claims
#[derive(Debug, Serialize)]
struct TreeVector {
    leaf_count: usize,
    root: String,
    claims: Vec<TestClaim>,
    invalid_claims: Vec<InvalidTestClaim>,
}

/// A valid test claim
#[derive(Debug, Serialize)]
struct TestClaim {
    claimer: String,
    index: u32,
    amount: String,
    id: String,
    leaf: String,
    proof: Vec<String>,
    /// Encoded `claim` instruction
    instruction: String,
}

/// An invalid test claim for negative testing
#[derive(Debug, Serialize)]
struct InvalidTestClaim {
    description: String,
    claimer: String,
    index: u32,
    amount: String,
    id: String,
    proof: Vec<String>,
    expected_error: String,
}

fn hex0x(bytes: impl AsRef<[u8]>) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn proof_hex(proof: &[Hash]) -> Vec<String> {
    proof.iter().map(hex0x).collect()
}

/// Deterministic synthetic claimer for position `i`.
fn claimer(i: usize) -> Address {
    Address(Sha256::digest(format!("test-vector-claimer:{i}")).into())
}

fn records(count: usize) -> Result<Vec<AllocationRecord>> {
    (0..count)
        .map(|i| {
            let index = u32::try_from(i).context("Too many leaves")?;
            let amount = 1_000 * (u64::from(index) + 1);
            Ok(AllocationRecord::new(claimer(i), index, amount, format!("vec-{i}")))
        })
        .collect()
}

fn tree_vector(subject: Address, epoch: u64, count: usize) -> Result<TreeVector> {
    let tree = EpochTree::build(&TreeBuilder::epoch(), records(count)?)?;
    let mut claims = Vec::with_capacity(count);
    let mut invalid_claims = Vec::new();

    for position in 0..count {
        let bundle = tree.proof_for_index(position)?;
        let leaf = bundle.leaf();
        let mut request = ClaimRequest::from(bundle.clone());
        request.epoch = epoch;
        let instruction = Instruction::Claim {
            subject,
            claim: request,
        }
        .pack()?;

        claims.push(TestClaim {
            claimer: bundle.claimer.to_string(),
            index: bundle.index,
            amount: bundle.amount.to_string(),
            id: bundle.id.clone(),
            leaf: hex0x(leaf),
            proof: proof_hex(&bundle.proof),
            instruction: hex::encode(instruction),
        });
    }

    // Negatives are derived from the first claim
    let first = tree.proof_for_index(0)?;
    let negative = |description: &str, claimer: Address, amount: u64, proof: Vec<Hash>| {
        InvalidTestClaim {
            description: description.to_string(),
            claimer: claimer.to_string(),
            index: first.index,
            amount: amount.to_string(),
            id: first.id.clone(),
            proof: proof_hex(&proof),
            expected_error: "InvalidProof".to_string(),
        }
    };

    invalid_claims.push(negative(
        "inflated amount",
        first.claimer,
        first.amount + 1,
        first.proof.clone(),
    ));
    invalid_claims.push(negative(
        "foreign claimer",
        claimer(usize::MAX),
        first.amount,
        first.proof.clone(),
    ));
    if let Some(node) = first.proof.first() {
        let mut tampered = first.proof.clone();
        let mut flipped = *node;
        flipped[0] ^= 0x01;
        tampered[0] = flipped;
        invalid_claims.push(negative("flipped proof byte", first.claimer, first.amount, tampered));
    }

    Ok(TreeVector {
        leaf_count: count,
        root: hex0x(tree.root()),
        claims,
        invalid_claims,
    })
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    tracing::info!(
        output = %args.output.display(),
        sizes = ?args.sizes,
        "Generating test vectors"
    );

    std::fs::create_dir_all(&args.output)?;

    let subject = derive_subject_id(&args.channel);
    let trees = args
        .sizes
        .iter()
        .filter(|count| **count > 0)
        .map(|count| tree_vector(subject, args.epoch, *count))
        .collect::<Result<Vec<_>>>()?;

    let file = TestVectorFile {
        channel: args.channel.clone(),
        subject: subject.to_string(),
        epoch: args.epoch,
        opcodes: InstructionKind::ALL
            .iter()
            .map(|kind| OpcodeVector {
                name: kind.name(),
                opcode: hex::encode(kind.opcode()),
            })
            .collect(),
        epoch_state_discriminator: hex::encode(EpochState::discriminator()),
        trees,
    };

    let output_path = args.output.join("test_vectors.json");
    let json = serde_json::to_string_pretty(&file)?;
    std::fs::write(&output_path, json)?;

    tracing::info!(path = %output_path.display(), trees = file.trees.len(), "Wrote test vectors");

    Ok(())
}
