//! HTTP collaborators that drive the payment flow against a running verifier.

pub mod http;
