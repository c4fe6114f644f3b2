//! Serviceability gate: postal-code allow-list with delivery-time metadata.
//!
//! Order admission consults this module **before** any inventory mutation; a
//! failed check must have zero side effects.

pub mod pincode;

pub use pincode::{
    DeliveryUnit, InMemoryPinCodeDirectory, PinCode, PinCodeDirectory, ServiceabilityCheck,
    ServiceabilityGate,
};
