//! Remote console protocol

pub mod cache;
pub mod client;
pub mod packet;

pub use cache::RconClients;
pub use client::RconClient;
