use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// Unit for a pin code's delivery-time estimate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryUnit {
    Hours,
    Days,
}

/// One allow-list entry: a deliverable postal code plus its estimate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinCode {
    pub code: String,
    pub delivery_time: u32,
    pub unit: DeliveryUnit,
    pub is_active: bool,
}

/// Result of a serviceability lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceabilityCheck {
    pub serviceable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_time: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<DeliveryUnit>,
}

impl ServiceabilityCheck {
    pub fn not_serviceable() -> Self {
        Self {
            serviceable: false,
            delivery_time: None,
            unit: None,
        }
    }
}

/// Read-only lookup of active pin codes (exact match on the stored code).
pub trait PinCodeDirectory: Send + Sync {
    fn lookup(&self, code: &str) -> Option<PinCode>;
}

impl<D> PinCodeDirectory for Arc<D>
where
    D: PinCodeDirectory + ?Sized,
{
    fn lookup(&self, code: &str) -> Option<PinCode> {
        (**self).lookup(code)
    }
}

/// Gate that admits or rejects a destination postal code.
///
/// No fuzzy matching: the code is whitespace-trimmed, then compared exactly.
#[derive(Debug, Clone)]
pub struct ServiceabilityGate<D> {
    directory: D,
}

impl<D> ServiceabilityGate<D>
where
    D: PinCodeDirectory,
{
    pub fn new(directory: D) -> Self {
        Self { directory }
    }

    pub fn check(&self, postal_code: &str) -> ServiceabilityCheck {
        let code = postal_code.trim();
        if code.is_empty() {
            return ServiceabilityCheck::not_serviceable();
        }

        match self.directory.lookup(code) {
            Some(pin) if pin.is_active => ServiceabilityCheck {
                serviceable: true,
                delivery_time: Some(pin.delivery_time),
                unit: Some(pin.unit),
            },
            _ => ServiceabilityCheck::not_serviceable(),
        }
    }
}

/// In-memory allow-list for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryPinCodeDirectory {
    codes: RwLock<HashMap<String, PinCode>>,
}

impl InMemoryPinCodeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, pin: PinCode) {
        if let Ok(mut codes) = self.codes.write() {
            codes.insert(pin.code.clone(), pin);
        }
    }

    pub fn list(&self) -> Vec<PinCode> {
        match self.codes.read() {
            Ok(codes) => codes.values().cloned().collect(),
            Err(_) => vec![],
        }
    }
}

impl PinCodeDirectory for InMemoryPinCodeDirectory {
    fn lookup(&self, code: &str) -> Option<PinCode> {
        let codes = self.codes.read().ok()?;
        codes.get(code).cloned()
    }
}
