// Application layer: use cases and the ports they depend on
pub mod ports;

pub mod discovery_use_case;
pub mod page_reader;
pub mod refresh_use_case;
pub mod roster;
pub mod services;
