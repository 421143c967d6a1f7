use super::base58;
use async_trait::async_trait;
use regex::Regex;
use wirecore::{Step, StepInput, StepResult, Value};

/// Solana public keys are 32 bytes.
const PUBKEY_LEN: usize = 32;

/// Scans free text for base-58 runs shaped like Solana contract
/// addresses and keeps only candidates that decode to exactly 32 bytes.
///
/// Returns the deduplicated list in order of first appearance, its
/// count, and the first element as a convenience field for downstream
/// trade nodes. Always succeeds; zero matches is a valid outcome.
pub struct ExtractCaStep {
    pattern: Regex,
}

impl ExtractCaStep {
    pub fn new() -> Self {
        Self {
            // Base-58 alphabet, 32-44 chars, on word boundaries
            pattern: Regex::new(r"\b[1-9A-HJ-NP-Za-km-z]{32,44}\b")
                .expect("address pattern is valid"),
        }
    }
}

impl Default for ExtractCaStep {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Step for ExtractCaStep {
    fn slug(&self) -> &str {
        "extract-ca"
    }

    async fn run(&self, input: StepInput) -> StepResult {
        // Blank config falls back to the trigger's message text.
        let text = input.text_or_trigger("text").unwrap_or_default();

        let mut addresses: Vec<String> = Vec::new();
        for candidate in self.pattern.find_iter(&text) {
            let candidate = candidate.as_str();
            if addresses.iter().any(|a| a == candidate) {
                continue;
            }
            match base58::decode(candidate) {
                Some(decoded) if decoded.len() == PUBKEY_LEN => {
                    addresses.push(candidate.to_string());
                }
                _ => {}
            }
        }

        let first = addresses
            .first()
            .map(|a| Value::String(a.clone()))
            .unwrap_or(Value::Null);
        let count = addresses.len() as i64;

        StepResult::success()
            .with_field(
                "addresses",
                Value::Array(addresses.into_iter().map(Value::String).collect()),
            )
            .with_field("count", count)
            .with_field("firstAddress", first)
    }
}
