//! GATT-client core: events, requests, and the connection state machine.

pub mod advert;
pub mod cache;
pub mod event;
pub mod filter;
pub mod machine;
pub mod request;
pub mod router;
pub mod sink;
pub mod types;
