use super::base58;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use ring::signature::{Ed25519KeyPair, KeyPair};
use std::time::Duration;
use wirecore::{FailureKind, Step, StepFailure, StepInput, StepResult};

const DEFAULT_VENUE_URL: &str = "https://api.jup.ag/swap/v1";
const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";
/// Wrapped SOL mint; trades always spend SOL.
const SOURCE_TOKEN_MINT: &str = "So11111111111111111111111111111111111111112";
const SLIPPAGE_BPS: u32 = 300;
const LAMPORTS_PER_SOL: f64 = 1e9;
const BROADCAST_ATTEMPTS: u32 = 3;
const CONFIRM_ATTEMPTS: u32 = 10;
const CONFIRM_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Swaps SOL for a target token through the venue's quote/swap API.
///
/// Stages run strictly in order: quote request, transaction build, local
/// signing with the caller-supplied key, broadcast with bounded retries,
/// confirmation polling. Each stage fails independently with a message
/// naming that stage; no stage failure crosses a stage boundary as a
/// panic. A broadcast transaction is never retracted — a confirmation
/// timeout reports the signature it was waiting on.
pub struct TradeTokenStep {
    client: reqwest::Client,
    venue_url: String,
    rpc_url: String,
    api_key: Option<String>,
}

impl TradeTokenStep {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            venue_url: DEFAULT_VENUE_URL.to_string(),
            rpc_url: DEFAULT_RPC_URL.to_string(),
            api_key: std::env::var("TRADE_VENUE_API_KEY").ok(),
        }
    }

    pub fn with_venue_url(mut self, url: impl Into<String>) -> Self {
        self.venue_url = url.into();
        self
    }

    pub fn with_rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = url.into();
        self
    }

    fn venue_request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("x-api-key", key),
            None => builder,
        }
    }

    async fn fetch_quote(
        &self,
        target_mint: &str,
        lamports: u64,
    ) -> Result<serde_json::Value, StepFailure> {
        let url = format!(
            "{}/quote?inputMint={}&outputMint={}&amount={}&slippageBps={}",
            self.venue_url, SOURCE_TOKEN_MINT, target_mint, lamports, SLIPPAGE_BPS
        );
        let response = self
            .venue_request(self.client.get(&url))
            .send()
            .await
            .map_err(|e| StepFailure::network(format!("Quote request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StepFailure::external_api(format!(
                "Quote failed {}: {}",
                status.as_u16(),
                body
            )));
        }
        response
            .json()
            .await
            .map_err(|e| StepFailure::external_api(format!("Quote returned invalid JSON: {}", e)))
    }

    async fn build_swap_transaction(
        &self,
        quote: &serde_json::Value,
        public_key: &str,
    ) -> Result<Vec<u8>, StepFailure> {
        let response = self
            .venue_request(self.client.post(format!("{}/swap", self.venue_url)))
            .json(&serde_json::json!({
                "quoteResponse": quote,
                "userPublicKey": public_key,
            }))
            .send()
            .await
            .map_err(|e| StepFailure::network(format!("Swap build failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StepFailure::external_api(format!(
                "Swap build failed {}: {}",
                status.as_u16(),
                body
            )));
        }

        let body: serde_json::Value = response.json().await.map_err(|e| {
            StepFailure::external_api(format!("Swap build returned invalid JSON: {}", e))
        })?;
        let encoded = body["swapTransaction"].as_str().ok_or_else(|| {
            StepFailure::external_api("Swap build response missing swapTransaction")
        })?;
        STANDARD.decode(encoded).map_err(|e| {
            StepFailure::external_api(format!("Swap transaction is not valid base64: {}", e))
        })
    }

    async fn broadcast(&self, signed_tx: &[u8]) -> Result<String, StepFailure> {
        let encoded = STANDARD.encode(signed_tx);
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "sendTransaction",
            "params": [encoded, {"encoding": "base64", "skipPreflight": false}],
        });

        let mut last_error = None;
        for attempt in 1..=BROADCAST_ATTEMPTS {
            let sent = self
                .client
                .post(&self.rpc_url)
                .json(&request)
                .send()
                .await;
            match sent {
                Ok(response) => {
                    let body: serde_json::Value = response.json().await.map_err(|e| {
                        StepFailure::external_api(format!("Broadcast returned invalid JSON: {}", e))
                    })?;
                    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
                        // The node rejected the transaction; retrying the
                        // identical bytes will not help.
                        return Err(StepFailure::external_api(format!(
                            "Broadcast rejected: {}",
                            error
                        )));
                    }
                    match body["result"].as_str() {
                        Some(signature) => return Ok(signature.to_string()),
                        None => {
                            return Err(StepFailure::external_api(
                                "Broadcast response missing signature",
                            ))
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "broadcast attempt failed");
                    last_error = Some(e);
                }
            }
        }
        Err(StepFailure::network(format!(
            "Broadcast failed after {} attempts: {}",
            BROADCAST_ATTEMPTS,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    async fn confirm(&self, signature: &str) -> Result<(), StepFailure> {
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getSignatureStatuses",
            "params": [[signature]],
        });

        for _ in 0..CONFIRM_ATTEMPTS {
            tokio::time::sleep(CONFIRM_POLL_INTERVAL).await;
            let response = self.client.post(&self.rpc_url).json(&request).send().await;
            let body: serde_json::Value = match response {
                Ok(r) => match r.json().await {
                    Ok(body) => body,
                    Err(_) => continue,
                },
                Err(_) => continue,
            };
            let status = &body["result"]["value"][0];
            if let Some(err) = status.get("err").filter(|e| !e.is_null()) {
                return Err(StepFailure::external_api(format!(
                    "Transaction {} failed on chain: {}",
                    signature, err
                )));
            }
            match status["confirmationStatus"].as_str() {
                Some("confirmed") | Some("finalized") => return Ok(()),
                _ => {}
            }
        }
        Err(StepFailure::new(
            FailureKind::Timeout,
            format!(
                "Transaction {} was broadcast but not confirmed after {} polls",
                signature, CONFIRM_ATTEMPTS
            ),
        ))
    }
}

impl Default for TradeTokenStep {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Step for TradeTokenStep {
    fn slug(&self) -> &str {
        "trade-token"
    }

    async fn run(&self, input: StepInput) -> StepResult {
        let private_key = input.config_text("solanaPrivateKey").unwrap_or_default();
        let target_mint = match input.text_or_trigger("targetTokenMint") {
            Some(mint) => mint,
            None => {
                return StepResult::fail(
                    FailureKind::Validation,
                    "No target token mint provided and none found upstream",
                )
            }
        };
        let amount_sol = input.config_text("sourceAmountUnits").unwrap_or_default();

        let lamports = match parse_sol_amount(&amount_sol) {
            Ok(lamports) => lamports,
            Err(failure) => return StepResult::Failure(failure),
        };
        let keypair = match keypair_from_base58(private_key.trim()) {
            Ok(pair) => pair,
            Err(failure) => return StepResult::Failure(failure),
        };
        let public_key = base58::encode(keypair.public_key().as_ref());
        tracing::debug!(target = %target_mint, lamports, wallet = %public_key, "starting swap");

        let quote = match self.fetch_quote(&target_mint, lamports).await {
            Ok(quote) => quote,
            Err(failure) => return StepResult::Failure(failure),
        };

        let unsigned_tx = match self.build_swap_transaction(&quote, &public_key).await {
            Ok(tx) => tx,
            Err(failure) => return StepResult::Failure(failure),
        };

        let signed_tx = match sign_transaction(&unsigned_tx, &keypair) {
            Ok(tx) => tx,
            Err(failure) => return StepResult::Failure(failure),
        };

        let signature = match self.broadcast(&signed_tx).await {
            Ok(signature) => signature,
            Err(failure) => return StepResult::Failure(failure),
        };

        if let Err(failure) = self.confirm(&signature).await {
            return StepResult::Failure(failure);
        }

        StepResult::success().with_field("signature", signature)
    }
}

fn parse_sol_amount(amount: &str) -> Result<u64, StepFailure> {
    let sol: f64 = amount
        .trim()
        .parse()
        .map_err(|_| StepFailure::validation(format!("Invalid trade amount: '{}'", amount)))?;
    if !sol.is_finite() || sol <= 0.0 {
        return Err(StepFailure::validation(format!(
            "Trade amount must be positive, got '{}'",
            amount
        )));
    }
    Ok((sol * LAMPORTS_PER_SOL).floor() as u64)
}

/// Build an ed25519 keypair from a base-58 secret: either a 64-byte
/// seed+pubkey export (wallet format) or a bare 32-byte seed.
fn keypair_from_base58(private_key: &str) -> Result<Ed25519KeyPair, StepFailure> {
    let bytes = base58::decode(private_key)
        .ok_or_else(|| StepFailure::validation("Private key is not valid base-58"))?;
    let pair = match bytes.len() {
        64 => Ed25519KeyPair::from_seed_and_public_key(&bytes[..32], &bytes[32..]),
        32 => Ed25519KeyPair::from_seed_unchecked(&bytes),
        n => {
            return Err(StepFailure::validation(format!(
                "Private key must decode to 32 or 64 bytes, got {}",
                n
            )))
        }
    };
    pair.map_err(|_| StepFailure::validation("Invalid private key material"))
}

/// Read a compact-u16 length prefix: up to three bytes, seven payload
/// bits each. Returns (value, bytes consumed).
fn decode_compact_u16(data: &[u8]) -> Option<(usize, usize)> {
    let mut value = 0usize;
    for (i, &byte) in data.iter().take(3).enumerate() {
        value |= ((byte & 0x7f) as usize) << (7 * i);
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

/// Sign the transaction's message section into the fee payer's signature
/// slot. Wire layout: compact-u16 signature count, that many 64-byte
/// signatures, then the message bytes.
fn sign_transaction(tx: &[u8], keypair: &Ed25519KeyPair) -> Result<Vec<u8>, StepFailure> {
    let (count, prefix_len) = decode_compact_u16(tx)
        .ok_or_else(|| StepFailure::external_api("Venue returned a malformed transaction"))?;
    let sigs_end = prefix_len + count * 64;
    if count == 0 || tx.len() <= sigs_end {
        return Err(StepFailure::external_api(
            "Venue returned a transaction with no signature slots",
        ));
    }

    let message = &tx[sigs_end..];
    let signature = keypair.sign(message);

    let mut signed = tx.to_vec();
    signed[prefix_len..prefix_len + 64].copy_from_slice(signature.as_ref());
    Ok(signed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ring::signature::{UnparsedPublicKey, ED25519};

    #[test]
    fn sol_amounts_convert_to_lamports() {
        assert_eq!(parse_sol_amount("0.001").unwrap(), 1_000_000);
        assert_eq!(parse_sol_amount("1").unwrap(), 1_000_000_000);
        assert!(parse_sol_amount("zero").is_err());
        assert!(parse_sol_amount("-1").is_err());
        assert!(parse_sol_amount("0").is_err());
    }

    #[test]
    fn compact_u16_decoding() {
        assert_eq!(decode_compact_u16(&[1, 0xaa]), Some((1, 1)));
        assert_eq!(decode_compact_u16(&[0x80, 0x01]), Some((128, 2)));
        assert_eq!(decode_compact_u16(&[0xff, 0xff, 0xff]), None);
    }

    #[test]
    fn keypair_requires_valid_length() {
        // 2 bytes decoded, not a key
        assert!(keypair_from_base58("2g").is_err());
        assert!(keypair_from_base58("not-base58!").is_err());
    }

    #[test]
    fn signing_fills_fee_payer_slot_with_valid_signature() {
        let seed = [7u8; 32];
        let keypair = Ed25519KeyPair::from_seed_unchecked(&seed).unwrap();

        // One empty signature slot followed by a fake message
        let message = b"test message bytes".to_vec();
        let mut tx = vec![1u8];
        tx.extend([0u8; 64]);
        tx.extend(&message);

        let signed = sign_transaction(&tx, &keypair).unwrap();
        assert_eq!(signed.len(), tx.len());

        let verifier = UnparsedPublicKey::new(&ED25519, keypair.public_key().as_ref());
        verifier.verify(&message, &signed[1..65]).unwrap();
    }

    #[test]
    fn unsigned_transaction_without_slots_is_rejected() {
        let seed = [7u8; 32];
        let keypair = Ed25519KeyPair::from_seed_unchecked(&seed).unwrap();
        assert!(sign_transaction(&[0u8, 1, 2], &keypair).is_err());
    }
}
