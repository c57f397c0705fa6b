//! Application Layer - Ports and the collaborator-facing service.
//!
//! Ports describe what the core needs from the outside world (a feed to
//! read trades from, somewhere to put ticks). The service composes the
//! storage, ingestion and analytics pieces into the pull-based operations
//! a front end calls.

/// Port interfaces for the trade feed and tick persistence.
pub mod ports;

/// `MarketDataService` facade and pair snapshots.
pub mod services;
