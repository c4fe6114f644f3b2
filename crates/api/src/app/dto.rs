//! Wire DTOs for the HTTP surface.
//!
//! Read models and value objects that already have a stable serde shape are
//! returned as-is; this module only holds request bodies and the response
//! shapes that do not map one-to-one onto a read model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use shopforge_infra::fulfillment::{LinePolicy, LineReport};
use shopforge_inventory::{Sku, VariantSelection};
use shopforge_orders::{OrderId, OrderStatus, PaymentInfo, SerialAssignment, ShippingAddress};
use shopforge_returns::{ReplacementOptions, ReturnId, ReturnKind, ReturnStatus};
use shopforge_serviceability::DeliveryUnit;

#[derive(Debug, Deserialize)]
pub struct PlaceOrderBody {
    pub customer_name: String,
    pub items: Vec<OrderItemBody>,
    pub shipping: ShippingAddress,
    pub payment: PaymentInfo,
    #[serde(default)]
    pub shipping_fee: u64,
    #[serde(default)]
    pub policy: LinePolicy,
}

#[derive(Debug, Deserialize)]
pub struct OrderItemBody {
    pub catalog_number: u64,
    pub qty: u32,
    #[serde(default)]
    pub variant: Option<BTreeMap<String, JsonValue>>,
}

#[derive(Debug, Serialize)]
pub struct PlacedOrderResponse {
    pub order_id: OrderId,
    pub reports: Vec<LineReport>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeOrderStatusBody {
    pub status: String,
    #[serde(default)]
    pub serial_assignments: Option<Vec<SerialAssignment>>,
}

#[derive(Debug, Deserialize)]
pub struct OpenReturnBody {
    pub order_id: OrderId,
    pub line_no: u32,
    pub kind: ReturnKind,
    pub qty: u32,
    pub reason: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub replacement: Option<ReplacementOptions>,
}

#[derive(Debug, Serialize)]
pub struct OpenedReturnResponse {
    pub return_id: ReturnId,
    pub mirrored: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateReturnBody {
    pub status: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AdvancedReturnResponse {
    pub status: ReturnStatus,
    pub mirrored: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreatePinCodeBody {
    pub code: String,
    pub delivery_time: u32,
    pub unit: DeliveryUnit,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CreateProductBody {
    pub catalog_number: u64,
    pub name: String,
    #[serde(default)]
    pub image: String,
    pub unit_price: u64,
    pub stock: i64,
    #[serde(default)]
    pub skus: Vec<SkuBody>,
}

#[derive(Debug, Deserialize)]
pub struct SkuBody {
    pub combination: BTreeMap<String, JsonValue>,
    pub stock: i64,
}

impl SkuBody {
    pub fn into_sku(self) -> Result<Sku, String> {
        Ok(Sku {
            combination: variant_from_json(self.combination)?,
            stock: self.stock,
        })
    }
}

/// Coerce a JSON variant selection into string-valued attributes.
///
/// Clients send attribute values as strings, numbers, or booleans
/// (`{"size": "M", "pack": 2}`); anything structured is rejected.
pub fn variant_from_json(
    selection: BTreeMap<String, JsonValue>,
) -> Result<VariantSelection, String> {
    let mut variant = VariantSelection::new();
    for (key, value) in selection {
        let value = match value {
            JsonValue::String(s) => s,
            JsonValue::Number(n) => n.to_string(),
            JsonValue::Bool(b) => b.to_string(),
            other => {
                return Err(format!(
                    "variant attribute '{key}' must be a scalar, got {other}"
                ));
            }
        };
        variant.insert(key, value);
    }
    Ok(variant)
}

pub fn parse_order_status(s: &str) -> Option<OrderStatus> {
    match s.trim().to_ascii_lowercase().as_str() {
        "pending" => Some(OrderStatus::Pending),
        "confirmed" => Some(OrderStatus::Confirmed),
        "shipped" => Some(OrderStatus::Shipped),
        "delivered" => Some(OrderStatus::Delivered),
        "cancelled" => Some(OrderStatus::Cancelled),
        _ => None,
    }
}

pub fn parse_return_status(s: &str) -> Option<ReturnStatus> {
    match s.trim().to_ascii_lowercase().as_str() {
        "pending" => Some(ReturnStatus::Pending),
        "approved" => Some(ReturnStatus::Approved),
        "pickup_scheduled" => Some(ReturnStatus::PickupScheduled),
        "received_at_warehouse" => Some(ReturnStatus::ReceivedAtWarehouse),
        "refund_initiated" => Some(ReturnStatus::RefundInitiated),
        "replacement_dispatched" => Some(ReturnStatus::ReplacementDispatched),
        "completed" => Some(ReturnStatus::Completed),
        "rejected" => Some(ReturnStatus::Rejected),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn variant_scalars_are_stringified() {
        let mut selection = BTreeMap::new();
        selection.insert("size".to_string(), json!("M"));
        selection.insert("pack".to_string(), json!(2));
        selection.insert("gift".to_string(), json!(true));

        let variant = variant_from_json(selection).unwrap();
        assert_eq!(variant.get("size").map(String::as_str), Some("M"));
        assert_eq!(variant.get("pack").map(String::as_str), Some("2"));
        assert_eq!(variant.get("gift").map(String::as_str), Some("true"));
    }

    #[test]
    fn structured_variant_values_are_rejected() {
        let mut selection = BTreeMap::new();
        selection.insert("size".to_string(), json!({"nested": true}));
        assert!(variant_from_json(selection).is_err());
    }

    #[test]
    fn statuses_parse_case_insensitively() {
        assert_eq!(parse_order_status(" Shipped "), Some(OrderStatus::Shipped));
        assert_eq!(
            parse_return_status("PICKUP_SCHEDULED"),
            Some(ReturnStatus::PickupScheduled)
        );
        assert_eq!(parse_order_status("unknown"), None);
    }
}
