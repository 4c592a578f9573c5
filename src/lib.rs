//! Hemmer provider for Azure Database for MySQL
//!
//! This crate is a Hemmer provider plugin that manages Azure Database for
//! MySQL single servers and flexible servers through Azure Resource Manager.
//!
//! # Overview
//!
//! The crate provides:
//!
//! - **Protocol**: the gRPC provider protocol compiled from `proto/provider.proto`
//! - **Server**: the [`ProviderService`] trait, the gRPC adapter and [`serve`]
//! - **Provider**: [`AzureMySqlProvider`], which dispatches to the resource and
//!   data source registries
//! - **Resources**: flexible servers with their databases, firewall rules,
//!   configurations and Entra ID administrators; single servers with their
//!   databases, firewall rules, configurations, administrators, customer-managed
//!   keys and virtual network rules
//! - **Data sources**: lookups of existing flexible and single servers
//! - **ARM client**: authenticated JSON calls and long-running operation polling
//!
//! # Handshake Protocol
//!
//! On start the provider binds an ephemeral localhost port and prints:
//!
//! ```text
//! HEMMER_PROVIDER|1|127.0.0.1:50051
//! ```
//!
//! Format: `HEMMER_PROVIDER|<protocol_version>|<address>`. Logs go to stderr
//! so stdout carries only the handshake.
//!
//! # Configuration
//!
//! ```text
//! provider "azurerm-mysql" {
//!   subscription_id = "..."   # or ARM_SUBSCRIPTION_ID
//!   tenant_id       = "..."   # or ARM_TENANT_ID
//!   client_id       = "..."   # or ARM_CLIENT_ID
//!   client_secret   = "..."   # or ARM_CLIENT_SECRET
//! }
//! ```
//!
//! A pre-acquired bearer token can be given as `access_token` (or
//! `ARM_ACCESS_TOKEN`) instead of client credentials.

#![warn(clippy::all)]

pub mod arm;
pub mod config;
pub mod data_sources;
pub mod error;
pub mod ids;
pub mod logging;
pub mod models;
pub mod plan;
pub mod provider;
pub mod resources;
pub mod schema;
pub mod server;
pub mod testing;
pub mod types;
pub mod validation;

#[allow(clippy::all)]
pub mod generated;

pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::AzureMySqlProvider;
pub use schema::ProviderSchema;
pub use server::{serve, serve_with_options, ProviderService, ServeOptions};
pub use types::{
    AttributeChange, ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities, HANDSHAKE_PREFIX,
    PROTOCOL_VERSION,
};
pub use validation::validate;
