//! Background workers

pub mod provisioning;
