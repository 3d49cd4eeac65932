//! Background workers: payment processing retries and pending-payment
//! reconciliation

pub mod payment_worker;

pub use payment_worker::PaymentWorker;
