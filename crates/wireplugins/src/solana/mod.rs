//! Solana integration: contract-address extraction and token trading.

pub mod base58;
mod extract_ca;
mod trade_token;

pub use extract_ca::ExtractCaStep;
pub use trade_token::TradeTokenStep;

use std::sync::Arc;
use wirecore::{ActionDescriptor, ConfigField, InputKind, IntegrationDescriptor, Plugin};

pub fn plugin() -> Plugin {
    let descriptor = IntegrationDescriptor::new(
        "solana",
        "Solana",
        "Execute trades and interact with the Solana blockchain",
    )
    .with_action(
        ActionDescriptor::new("extract-ca", "solana", "Extract CA")
            .with_description("Extract and validate Solana contract addresses from text")
            .with_category("Solana")
            .with_output("addresses", "Array of valid addresses found")
            .with_output("count", "Number of addresses found")
            .with_output("firstAddress", "The first valid address (convenience)")
            // Not marked required: a blank value falls back to the
            // trigger's message text inside the step.
            .with_config_field(
                ConfigField::new("text", "Input Text", InputKind::TemplateTextarea)
                    .with_placeholder("Text containing a CA (e.g. {{Telegram.text}})")
                    .with_default("{{Telegram.text}}"),
            ),
    )
    .with_action(
        ActionDescriptor::new("trade-token", "solana", "Trade Token")
            .with_description("Swap SOL for any token through the venue API")
            .with_category("Solana")
            .with_output("signature", "The Solana transaction signature")
            .with_config_field(
                ConfigField::new(
                    "solanaPrivateKey",
                    "Private Key (Base58)",
                    InputKind::TemplatePassword,
                )
                .with_placeholder("Paste your wallet private key here")
                .required(),
            )
            .with_config_field(
                ConfigField::new("targetTokenMint", "Target Token Mint", InputKind::TemplateInput)
                    .with_placeholder("e.g. {{ExtractCA.firstAddress}}")
                    .with_default("{{ExtractCA.firstAddress}}")
                    .required(),
            )
            .with_config_field(
                ConfigField::new(
                    "sourceAmountUnits",
                    "Trade Amount (in SOL)",
                    InputKind::TemplateInput,
                )
                .with_placeholder("e.g. 0.001 for 0.001 SOL")
                .with_default("0.001")
                .required(),
            ),
    );

    Plugin::new(descriptor)
        .with_step(Arc::new(ExtractCaStep::new()))
        .with_step(Arc::new(TradeTokenStep::new()))
}
