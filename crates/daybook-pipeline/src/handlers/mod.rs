//! One module per job kind. Handlers return `Err` only for failures the
//! queue should redeliver.

pub mod aggregate;
pub mod discover;
pub mod fetch;
