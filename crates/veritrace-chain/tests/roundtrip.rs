// Offline pipeline tests against a scripted RPC transport: the canonical
// commit → decode → recompute round trip, tamper and issuer failures, and
// nonce serialization under concurrent submits.
//
// The mock transport serves pushed responses in reverse push order, so each
// test pushes the reply for the *last* RPC call first.

use chrono::NaiveDate;
use ethers::providers::{MockProvider, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Bytes, Transaction, TransactionReceipt, TransactionRequest, H256, U256};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use veritrace_chain::{
    encode_store_call, ChainClient, CommitPipeline, VerificationPipeline, SEPOLIA_CHAIN_ID,
};
use veritrace_core::config::ChainSettings;
use veritrace_core::types::{CommitStatus, GenerationRecord};
use veritrace_crypto::Fingerprinter;

const TEST_SECRET: &str = "test-secret";

fn test_settings(issuer: Option<&str>) -> ChainSettings {
    ChainSettings {
        rpc_url: "http://localhost:8545".to_string(),
        private_key: "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318"
            .to_string(),
        contract_address: "0x5FbDB2315678afecb367f032d93F642f64180aa3".to_string(),
        issuer_address: issuer.map(str::to_string),
        chain_id: SEPOLIA_CHAIN_ID,
        gas_price_boost: 1.5,
        gas_limit_fallback: 500_000,
        min_gas_price_wei: 1_000_000_000,
        rpc_timeout: Duration::from_secs(20),
    }
}

fn mocked_client(issuer: Option<&str>) -> (Arc<ChainClient<MockProvider>>, MockProvider) {
    let (provider, mock) = Provider::mocked();
    let client = ChainClient::with_provider(provider, &test_settings(issuer)).unwrap();
    (Arc::new(client), mock)
}

fn sample_record() -> GenerationRecord {
    let parameters = match json!({"temperature": 0.2, "max_tokens": 200}) {
        Value::Object(map) => map,
        _ => unreachable!(),
    };
    GenerationRecord {
        llm_provider: "openai".to_string(),
        model_name: "gpt-5-mini".to_string(),
        prompt: "수도가 어디인가요?".to_string(),
        response: "서울입니다 ✓".to_string(),
        parameters,
        timestamp: NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_micro_opt(1, 59, 26, 535_897)
            .unwrap(),
        consensus_votes: "4/5".to_string(),
    }
}

/// A found transaction carrying this record's call data, plus its receipt.
fn committed_tx(
    client: &ChainClient<MockProvider>,
    record: &GenerationRecord,
    tamper_response: bool,
) -> (H256, Transaction, TransactionReceipt) {
    let fingerprinter = Fingerprinter::new(TEST_SECRET).unwrap();
    let fingerprint = fingerprinter.sign(record).unwrap();
    let mut call = CommitPipeline::<MockProvider>::build_call(record, &fingerprint).unwrap();
    if tamper_response {
        call.response.push('!');
    }
    let data = encode_store_call(&call).unwrap();

    let tx_hash = H256::from_low_u64_be(0x77);
    let mut tx = Transaction::default();
    tx.hash = tx_hash;
    tx.input = Bytes::from(data);
    tx.from = client.issuer();
    tx.to = Some(client.contract_address());

    let mut receipt = TransactionReceipt::default();
    receipt.transaction_hash = tx_hash;
    receipt.status = Some(1u64.into());
    receipt.block_number = Some(4_200_000u64.into());
    receipt.gas_used = Some(U256::from(180_000u64));

    (tx_hash, tx, receipt)
}

#[tokio::test]
async fn committed_record_verifies_end_to_end() {
    let (client, mock) = mocked_client(None);
    let record = sample_record();
    let (tx_hash, tx, receipt) = committed_tx(&client, &record, false);

    mock.push(receipt).unwrap();
    mock.push(tx).unwrap();

    let pipeline = VerificationPipeline::new(client, Fingerprinter::new(TEST_SECRET).unwrap());
    let result = pipeline.verify(tx_hash).await.unwrap();

    assert!(result.tx_exists);
    assert!(result.tx_success);
    assert!(result.issuer_matches);
    assert!(result.fingerprint_matches);
    assert!(result.overall_verified);
    assert_eq!(result.recomputed, result.on_chain);

    let decoded = result.decoded_record.unwrap();
    assert_eq!(decoded.prompt, record.prompt);
    assert_eq!(decoded.response, record.response);
    assert_eq!(decoded.llm_provider, record.llm_provider);
    assert_eq!(decoded.model_name, record.model_name);
    assert_eq!(decoded.timestamp, record.timestamp_string());
    assert_eq!(decoded.consensus_votes, record.consensus_votes);
}

#[tokio::test]
async fn one_byte_of_tampering_breaks_the_fingerprint() {
    let (client, mock) = mocked_client(None);
    let record = sample_record();
    let (tx_hash, tx, receipt) = committed_tx(&client, &record, true);

    mock.push(receipt).unwrap();
    mock.push(tx).unwrap();

    let pipeline = VerificationPipeline::new(client, Fingerprinter::new(TEST_SECRET).unwrap());
    let result = pipeline.verify(tx_hash).await.unwrap();

    assert!(result.tx_exists);
    assert!(result.tx_success);
    assert!(result.issuer_matches);
    assert!(!result.fingerprint_matches);
    assert!(!result.overall_verified);
    assert_ne!(result.recomputed, result.on_chain);
}

#[tokio::test]
async fn foreign_issuer_is_not_verified_even_with_a_valid_fingerprint() {
    let (client, mock) = mocked_client(Some("0x0000000000000000000000000000000000000001"));
    let record = sample_record();
    // Call data is intact and signed by the gateway wallet, but the
    // configured issuer is someone else.
    let (tx_hash, mut tx, receipt) = committed_tx(&client, &record, false);
    tx.from = client.signer_address();

    mock.push(receipt).unwrap();
    mock.push(tx).unwrap();

    let pipeline = VerificationPipeline::new(client, Fingerprinter::new(TEST_SECRET).unwrap());
    let result = pipeline.verify(tx_hash).await.unwrap();

    assert!(result.fingerprint_matches);
    assert!(!result.issuer_matches);
    assert!(!result.overall_verified);
}

#[tokio::test]
async fn unknown_transaction_reports_not_found() {
    let (client, mock) = mocked_client(None);
    mock.push(Value::Null).unwrap();

    let pipeline = VerificationPipeline::new(client, Fingerprinter::new(TEST_SECRET).unwrap());
    let result = pipeline.verify(H256::from_low_u64_be(0xdead)).await.unwrap();

    assert!(!result.tx_exists);
    assert!(!result.overall_verified);
    assert!(result.decoded_record.is_none());
}

#[tokio::test]
async fn receiptless_transaction_reports_pending() {
    let (client, mock) = mocked_client(None);
    let record = sample_record();
    let (tx_hash, tx, _receipt) = committed_tx(&client, &record, false);

    mock.push(Value::Null).unwrap();
    mock.push(tx).unwrap();

    let pipeline = VerificationPipeline::new(client, Fingerprinter::new(TEST_SECRET).unwrap());
    let result = pipeline.verify(tx_hash).await.unwrap();

    assert!(result.tx_exists);
    assert!(result.tx_pending);
    assert!(!result.tx_success);
    assert!(!result.overall_verified);
}

#[tokio::test]
async fn reverted_transaction_is_not_verified() {
    let (client, mock) = mocked_client(None);
    let record = sample_record();
    let (tx_hash, tx, mut receipt) = committed_tx(&client, &record, false);
    receipt.status = Some(0u64.into());

    mock.push(receipt).unwrap();
    mock.push(tx).unwrap();

    let pipeline = VerificationPipeline::new(client, Fingerprinter::new(TEST_SECRET).unwrap());
    let result = pipeline.verify(tx_hash).await.unwrap();

    assert!(result.tx_exists);
    assert!(!result.tx_success);
    assert!(result.fingerprint_matches);
    assert!(!result.overall_verified);
}

#[tokio::test]
async fn submit_only_commit_reports_pending_with_estimated_cost() {
    let (client, mock) = mocked_client(None);
    let record = sample_record();
    let fingerprinter = Fingerprinter::new(TEST_SECRET).unwrap();
    let fingerprint = fingerprinter.sign(&record).unwrap();

    // Served in call order: estimate_gas, gas_price, nonce, send_raw.
    mock.push(H256::from_low_u64_be(0x07)).unwrap();
    mock.push(U256::from(5u64)).unwrap();
    mock.push(U256::from(2_000_000_000u64)).unwrap();
    mock.push(U256::from(100_000u64)).unwrap();

    let pipeline = CommitPipeline::new(client);
    let result = pipeline.commit(&record, &fingerprint, false).await.unwrap();

    assert_eq!(result.status, CommitStatus::Pending);
    assert_eq!(result.tx_hash, Some(H256::from_low_u64_be(0x07)));
    assert!(result.block_number.is_none());
    assert!(result.gas_used.is_none());
    assert!(result.error_message.is_none());
    // 2 gwei boosted 1.5× on Sepolia.
    assert_eq!(result.gas_price_wei, Some(U256::from(3_000_000_000u64)));
    // Estimated cost: (100k × 1.2 margin) × boosted price.
    assert_eq!(
        result.gas_cost_wei,
        Some(U256::from(120_000u64) * U256::from(3_000_000_000u64))
    );
}

#[tokio::test]
async fn gas_estimation_failure_falls_back_to_the_configured_limit() {
    let (client, mock) = mocked_client(None);
    let record = sample_record();
    let fingerprinter = Fingerprinter::new(TEST_SECRET).unwrap();
    let fingerprint = fingerprinter.sign(&record).unwrap();

    mock.push(H256::from_low_u64_be(0x08)).unwrap();
    mock.push(U256::from(9u64)).unwrap();
    mock.push(U256::from(2_000_000_000u64)).unwrap();
    // An undeserializable estimate reply: the estimate call errors and
    // the fallback limit applies.
    mock.push(Value::String("boom".to_string())).unwrap();

    let pipeline = CommitPipeline::new(client);
    let result = pipeline.commit(&record, &fingerprint, false).await.unwrap();

    assert_eq!(result.status, CommitStatus::Pending);
    assert_eq!(
        result.gas_cost_wei,
        Some(U256::from(500_000u64) * U256::from(3_000_000_000u64))
    );
}

#[tokio::test]
async fn broadcast_failure_folds_into_an_error_result() {
    let (client, mock) = mocked_client(None);
    let record = sample_record();
    let fingerprinter = Fingerprinter::new(TEST_SECRET).unwrap();
    let fingerprint = fingerprinter.sign(&record).unwrap();

    // Served in call order: estimate_gas, gas_price, then a nonce reply
    // that cannot deserialize, failing the submit step.
    mock.push(Value::String("not-a-nonce".to_string())).unwrap();
    mock.push(U256::from(2_000_000_000u64)).unwrap();
    mock.push(U256::from(100_000u64)).unwrap();

    let pipeline = CommitPipeline::new(client);
    let result = pipeline.commit(&record, &fingerprint, false).await.unwrap();

    assert_eq!(result.status, CommitStatus::Error);
    assert!(result.tx_hash.is_none());
    assert!(result.block_number.is_none());
    assert!(result.gas_used.is_none());
    assert!(result.gas_cost_wei.is_none());
    // The price was fetched before the failure and is kept for diagnostics.
    assert_eq!(result.gas_price_wei, Some(U256::from(3_000_000_000u64)));
    assert!(result.error_message.is_some());
}

#[tokio::test]
async fn gas_price_failure_folds_into_an_error_result() {
    let (client, mock) = mocked_client(None);
    let record = sample_record();
    let fingerprinter = Fingerprinter::new(TEST_SECRET).unwrap();
    let fingerprint = fingerprinter.sign(&record).unwrap();

    // Estimate succeeds, the gas price reply cannot deserialize, and the
    // pipeline never reaches the nonce or broadcast steps.
    mock.push(Value::String("not-a-price".to_string())).unwrap();
    mock.push(U256::from(100_000u64)).unwrap();

    let pipeline = CommitPipeline::new(client);
    let result = pipeline.commit(&record, &fingerprint, false).await.unwrap();

    assert_eq!(result.status, CommitStatus::Error);
    assert!(result.tx_hash.is_none());
    assert!(result.gas_price_wei.is_none());
    assert!(result.gas_cost_wei.is_none());
    assert!(result.error_message.is_some());
}

#[tokio::test]
async fn concurrent_submits_take_consecutive_nonces() {
    let (client, mock) = mocked_client(None);

    // Two interleaved submits: the nonce guard makes each (nonce, send)
    // pair atomic, so the scripted pairs cannot cross.
    mock.push(H256::from_low_u64_be(0x02)).unwrap();
    mock.push(U256::from(1u64)).unwrap();
    mock.push(H256::from_low_u64_be(0x01)).unwrap();
    mock.push(U256::from(0u64)).unwrap();

    let build_tx = || -> TypedTransaction {
        TransactionRequest::new()
            .from(client.signer_address())
            .to(client.contract_address())
            .data(Bytes::from(vec![0xde, 0xad]))
            .gas(U256::from(21_000u64))
            .gas_price(U256::from(1_000_000_000u64))
            .chain_id(client.chain_id())
            .into()
    };
    let (tx_a, tx_b) = (build_tx(), build_tx());

    let client_a = Arc::clone(&client);
    let client_b = Arc::clone(&client);
    let submit_a = tokio::spawn(async move { client_a.submit(tx_a).await });
    let submit_b = tokio::spawn(async move { client_b.submit(tx_b).await });

    let (hash_a, nonce_a, _) = submit_a.await.unwrap().unwrap();
    let (hash_b, nonce_b, _) = submit_b.await.unwrap().unwrap();

    assert_ne!(hash_a, hash_b);
    let mut nonces = [nonce_a, nonce_b];
    nonces.sort();
    assert_eq!(nonces, [U256::zero(), U256::one()]);
}

#[tokio::test]
async fn network_info_snapshot() {
    let (client, mock) = mocked_client(None);

    // Served in call order: chain id, block number, gas price, balance.
    mock.push(U256::from(10_000_000_000_000_000u64)).unwrap();
    mock.push(U256::from(1_500_000_000u64)).unwrap();
    mock.push(ethers::types::U64::from(4_200_000u64)).unwrap();
    mock.push(U256::from(SEPOLIA_CHAIN_ID)).unwrap();

    let info = client.network_info().await.unwrap();
    assert_eq!(info.chain_id, SEPOLIA_CHAIN_ID);
    assert_eq!(info.latest_block, 4_200_000);
    assert_eq!(info.gas_price_wei, U256::from(1_500_000_000u64));
    assert_eq!(
        info.account_balance_wei,
        U256::from(10_000_000_000_000_000u64)
    );
}
