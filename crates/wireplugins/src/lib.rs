//! Integration plugin library
//!
//! Each module bundles one integration: its descriptor (credential
//! fields, actions, config schemas) plus the step implementations. The
//! runtime is built from the explicit constructor list below; nothing
//! self-registers.

pub mod solana;
pub mod system;
pub mod telegram;

use wirecore::Plugin;

/// The fixed, injectable plugin list the registries are built from at
/// process start.
pub fn builtin_plugins() -> Vec<Plugin> {
    vec![system::plugin(), telegram::plugin(), solana::plugin()]
}
