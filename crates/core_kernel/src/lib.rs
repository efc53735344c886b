//! Core Kernel - Foundational types shared by the expense system
//!
//! This crate provides the building blocks used across all domain modules:
//! - Positive monetary amounts with precise decimal arithmetic
//! - Strongly-typed identifiers
//! - Port error and health-check types for the hexagonal adapters

pub mod money;
pub mod identifiers;
pub mod ports;

pub use money::{Amount, AmountError};
pub use identifiers::{ExpenseId, IdParseError, RunId, UserId};
pub use ports::{
    PortError, DomainPort, HealthCheckable, HealthCheckResult, AdapterHealth,
};
