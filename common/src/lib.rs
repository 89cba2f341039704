//! Types shared by the Rowling appliance binaries: configuration,
//! dashboard protocol and the session model.

pub mod config;
pub mod protocol;
pub mod session;
