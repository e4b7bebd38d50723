//! Authors and posts catalog over interchangeable storage backends.
//!
//! [`core::storage::Storage`] is the contract; [`adapter`] holds one
//! implementation per backend and [`api`] serves any of them over HTTP.

pub mod adapter;
pub mod api;
pub mod core;
pub mod prelude;
