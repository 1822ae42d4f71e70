pub mod cancel;
pub mod chain;
pub mod confirmation;
pub mod currency;
pub mod payment;
pub mod subscription;
pub mod wallet;

#[cfg(any(test, feature = "dev"))]
pub mod mock;
