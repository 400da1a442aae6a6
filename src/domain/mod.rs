pub mod error;
pub mod event;
pub mod id;
pub mod idempotency;
pub mod ledger;
pub mod money;
pub mod order;
pub mod payment;
pub mod payu;
pub mod ports;
pub mod settlement;
