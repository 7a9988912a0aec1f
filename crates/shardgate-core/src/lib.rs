//! # Shardgate Core
//!
//! Core library for the shardgate shard-aware observer proxy.
//!
//! Shardgate sits between external clients and a fleet of blockchain observer
//! nodes in a sharded ledger. Clients talk to a single stable HTTP endpoint;
//! shardgate computes the owning shard for each request, picks a healthy
//! observer in that shard, forwards the call with retry/fallback across peer
//! observers, merges multi-shard replies where needed and returns a
//! normalized response.
//!
//! This crate provides the foundational components for:
//!
//! - **[`client`]**: The upstream HTTP caller: one GET/POST to an observer,
//!   JSON decoded, HTTP status surfaced separately from transport failure.
//!
//! - **[`observer`]**: The per-shard observer registry with regular and
//!   full-history node classes and stable in-shard retry order.
//!
//! - **[`routing`]**: Address-to-shard mapping with a reserved metachain
//!   identifier.
//!
//! - **[`outcome`]**: Decoding a smart-contract execution outcome (return
//!   code, message, values) from a completed transaction's results and logs.
//!
//! - **[`process`]**: The request processors: transaction submission,
//!   lookup and reconciliation, mempool views, network/validator metrics,
//!   VM queries and account key lookups.
//!
//! - **[`encoding`]**: Injected capabilities: address codec, hasher,
//!   marshaller.
//!
//! - **[`config`]**: Layered configuration loading (TOML file + environment
//!   overrides).
//!
//! ## Request Flow
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────┐
//! │  Validation │ ─── Invalid ──► 400, no fan-out
//! └──────┬──────┘
//!        │ Valid
//!        ▼
//! ┌─────────────┐      ┌──────────────┐
//! │ ShardRouter │ ───► │ ObserverPool │  (ordered per-shard retry list)
//! └─────────────┘      └──────┬───────┘
//!                             ▼
//!                      ┌─────────────┐
//!                      │  HttpCaller │  (404/408/transport ⇒ next observer,
//!                      └──────┬──────┘   anything else is authoritative)
//!                             ▼
//!                  merge / reconcile / parse outcome
//!                             ▼
//!                    Response to Client
//! ```

pub mod client;
pub mod config;
pub mod encoding;
pub mod errors;
pub mod observer;
pub mod outcome;
pub mod process;
pub mod routing;
pub mod types;
