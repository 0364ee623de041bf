//! Flash-sale backend: a concurrent purchase coordinator.
//!
//! The system runs recurring one-hour sales over a fixed inventory and
//! enforces three hard invariants without a global lock:
//!
//! 1. At most `INVENTORY_MAX` items sold per sale window (no oversell).
//! 2. At most `PER_USER_MAX` successful purchases per user per sale.
//! 3. Every checkout attempt is durably persisted, and every successful
//!    purchase is reconciled across the two stores.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │               HTTP (axum)                     │  server/, api/
//! ├───────────────────────────────────────────────┤
//! │   Coordinators: checkout, purchase, sales     │  services/
//! ├───────────────────────┬───────────────────────┤
//! │  Counter Store        │  Record Store         │  stores/
//! │  (Redis, Lua scripts) │  (PostgreSQL, sqlx)   │
//! └───────────────────────┴───────────────────────┘
//! ```
//!
//! The counter store executes multi-step purchase decisions as indivisible
//! scripts and owns the real-time counters. The record store owns the
//! durable lifecycle and finalizes purchases under a row lock. When a
//! finalization fails after the counters were incremented, the coordinator
//! compensates by decrementing them again.

#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod server;
pub mod services;
pub mod stores;

pub use config::Config;
pub use error::{Result, SaleError};
