use anyhow::{Context, Result};
use claim_ledger::{LedgerRpcClient, PublishMode};
use clap::Parser;
use merkle_gen::{derive_subject_id, Address, DatasetClient, EpochTree, Hash, TreeBuilder};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "root-audit")]
#[command(about = "Rebuild an epoch from the datastore and compare it with the published root")]
struct Args {
    /// Channel name
    #[arg(long)]
    channel: String,

    /// Epoch to audit; defaults to the latest closed epoch
    #[arg(long)]
    epoch: Option<u64>,

    /// Publication mode of the channel
    #[arg(long, default_value = "ring")]
    mode: PublishMode,

    #[arg(long, env = "DATASET_URL", default_value = "http://localhost:8080")]
    dataset_url: String,

    #[arg(long, env = "RPC_URL", default_value = "http://localhost:8899")]
    rpc_url: String,

    #[arg(long, env = "PROGRAM_ID")]
    program_id: Address,

    #[arg(long, env = "MINT")]
    mint: Address,

    /// Where to write the JSON report
    #[arg(short, long, default_value = "root_audit.json")]
    output: PathBuf,
}

#[derive(Debug, Serialize)]
struct AuditReport {
    audited_at: String,
    channel: String,
    subject: String,
    epoch: u64,
    mode: String,
    leaf_count: usize,
    total_amount: String,
    local_root: String,
    published_root: Option<String>,
    matches: bool,
}

fn hex0x(hash: &Hash) -> String {
    format!("0x{}", hex::encode(hash))
}

async fn audit(
    dataset: &DatasetClient,
    ledger: &LedgerRpcClient,
    channel: &str,
    epoch: Option<u64>,
    mode: PublishMode,
) -> Result<AuditReport> {
    let epoch = match epoch {
        Some(epoch) => epoch,
        None => dataset
            .get_latest_closed_epoch(channel)
            .await
            .context("Failed to fetch latest closed epoch")?,
    };

    let records = dataset
        .get_allocations(channel, epoch)
        .await
        .context("Failed to fetch allocations")?;
    let tree = EpochTree::build(&TreeBuilder::with_max_leaves(mode.max_leaves()), records)
        .context("Failed to build epoch tree")?;

    let subject = derive_subject_id(channel);
    let published = ledger
        .published_root(mode, &subject, epoch)
        .await
        .context("Failed to read published root")?;

    Ok(AuditReport {
        audited_at: chrono::Utc::now().to_rfc3339(),
        channel: channel.to_string(),
        subject: subject.to_string(),
        epoch,
        mode: mode.to_string(),
        leaf_count: tree.len(),
        total_amount: tree.total_amount().to_string(),
        local_root: hex0x(&tree.root()),
        published_root: published.as_ref().map(hex0x),
        matches: published.is_some_and(|root| tree.ensure_matches(&root).is_ok()),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    println!("🔍 Auditing channel '{}' ({} mode)...\n", args.channel, args.mode);
    println!("   Datastore: {}", args.dataset_url);
    println!("   Ledger:    {}\n", args.rpc_url);

    let dataset = DatasetClient::new(args.dataset_url.clone());
    let ledger = LedgerRpcClient::new(args.rpc_url.clone(), args.program_id, args.mint);

    let report = audit(&dataset, &ledger, &args.channel, args.epoch, args.mode).await?;

    println!("📊 Epoch {}:", report.epoch);
    println!("   Leaves:         {}", report.leaf_count);
    println!("   Total amount:   {}", report.total_amount);
    println!("   Local root:     {}", report.local_root);
    println!(
        "   Published root: {}",
        report.published_root.as_deref().unwrap_or("<none>")
    );

    fs::write(&args.output, serde_json::to_string_pretty(&report)?)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    println!("\n💾 Saved report to {}", args.output.display());

    if report.matches {
        println!("\n✅ Roots match");
        Ok(())
    } else {
        println!("\n❌ Root mismatch or root not published");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claim_ledger::{AccountLayout, ChannelRingState};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PROGRAM: Address = Address([1; 32]);
    const MINT: Address = Address([2; 32]);

    async fn dataset_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/channels/alpha/epochs/latest"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "data": { "epoch": "6" } })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/channels/alpha/epochs/6/allocations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {
                        "claimer": Address([0xa1; 32]).to_string(),
                        "index": 0,
                        "amount": "100",
                        "id": "a"
                    },
                    {
                        "claimer": Address([0xb2; 32]).to_string(),
                        "index": 1,
                        "amount": "250",
                        "id": "b"
                    },
                ]
            })))
            .mount(&server)
            .await;
        server
    }

    async fn ledger_server(root: Hash) -> MockServer {
        let mut ring = ChannelRingState::new(MINT, derive_subject_id("alpha"), 255);
        ring.publish(6, root).unwrap();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": { "lamports": 1, "data": hex::encode(ring.to_account_data().unwrap()) },
            })))
            .mount(&server)
            .await;
        server
    }

    fn local_root() -> Hash {
        EpochTree::build(
            &TreeBuilder::ring(),
            vec![
                merkle_gen::AllocationRecord::new(Address([0xa1; 32]), 0, 100, "a"),
                merkle_gen::AllocationRecord::new(Address([0xb2; 32]), 1, 250, "b"),
            ],
        )
        .unwrap()
        .root()
    }

    #[tokio::test]
    async fn test_audit_matching_root() {
        let dataset = dataset_server().await;
        let ledger = ledger_server(local_root()).await;

        let report = audit(
            &DatasetClient::new(dataset.uri()),
            &LedgerRpcClient::new(ledger.uri(), PROGRAM, MINT),
            "alpha",
            None,
            PublishMode::Ring,
        )
        .await
        .unwrap();

        assert_eq!(report.epoch, 6);
        assert_eq!(report.leaf_count, 2);
        assert_eq!(report.total_amount, "350");
        assert!(report.matches);
    }

    #[tokio::test]
    async fn test_audit_detects_mismatch() {
        let dataset = dataset_server().await;
        let ledger = ledger_server([0xee; 32]).await;

        let report = audit(
            &DatasetClient::new(dataset.uri()),
            &LedgerRpcClient::new(ledger.uri(), PROGRAM, MINT),
            "alpha",
            Some(6),
            PublishMode::Ring,
        )
        .await
        .unwrap();

        assert!(!report.matches);
        assert_eq!(report.published_root, Some(format!("0x{}", "ee".repeat(32))));
    }
}
