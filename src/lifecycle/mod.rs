//! Client lifecycle.
//!
//! `BlockchainClient::open` creates a [`Shutdown`]; `close` triggers it.
//! Every RPC and every confirmation tracker holds a [`ShutdownSignal`] and
//! aborts with `Cancelled` once it fires. There is no per-transaction
//! cancellation.

pub mod shutdown;

pub use shutdown::{Shutdown, ShutdownSignal};
