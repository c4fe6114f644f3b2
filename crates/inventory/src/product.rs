use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopforge_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use shopforge_events::Event;

use crate::variant::{VariantSelection, matching_skus};

/// Stock level at or below which a decrement raises a low-stock signal.
///
/// The check is `<=` and fires on every qualifying decrement; de-duplication
/// is a downstream concern.
pub const LOW_STOCK_THRESHOLD: i64 = 5;

/// Product identifier (internal storage key; the externally visible identity
/// is the numeric `catalog_number` carried in state and events).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// One variant combination with its own stock bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sku {
    pub combination: VariantSelection,
    pub stock: i64,
}

/// Granularity at which a low-stock signal fired.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum LowStockScope {
    Aggregate,
    Sku { index: usize },
}

/// Aggregate root: Product inventory bucket.
///
/// Aggregate stock and per-SKU stock are decremented independently and both
/// clamp at zero; shortfalls are reported in the emitted event rather than
/// driving stock negative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    catalog_number: u64,
    name: String,
    image: String,
    unit_price: u64,
    stock: i64,
    skus: Vec<Sku>,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            catalog_number: 0,
            name: String::new(),
            image: String::new(),
            unit_price: 0,
            stock: 0,
            skus: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn catalog_number(&self) -> u64 {
        self.catalog_number
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stock(&self) -> i64 {
        self.stock
    }

    pub fn skus(&self) -> &[Sku] {
        &self.skus
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterProduct (stock ingress; catalog editing itself is an
/// external concern).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterProduct {
    pub product_id: ProductId,
    pub catalog_number: u64,
    pub name: String,
    pub image: String,
    pub unit_price: u64,
    pub stock: i64,
    pub skus: Vec<Sku>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeductStock (applied per fulfilled order line).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeductStock {
    pub product_id: ProductId,
    pub qty: i64,
    /// Chosen option-combination; empty means no variant dimension.
    pub variant: VariantSelection,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Restock (receiving, or compensation for a failed all-or-nothing
/// placement).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restock {
    pub product_id: ProductId,
    pub qty: i64,
    pub variant: VariantSelection,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryCommand {
    RegisterProduct(RegisterProduct),
    DeductStock(DeductStock),
    Restock(Restock),
}

/// Event: ProductRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRegistered {
    pub product_id: ProductId,
    pub catalog_number: u64,
    pub name: String,
    pub image: String,
    pub unit_price: u64,
    pub stock: i64,
    pub skus: Vec<Sku>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockDeducted.
///
/// Carries the post-decrement levels so replay is deterministic, and the
/// requested/applied split so shortfalls stay visible to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDeducted {
    pub product_id: ProductId,
    pub catalog_number: u64,
    pub qty_requested: i64,
    pub qty_applied: i64,
    pub stock_after: i64,
    pub sku_index: Option<usize>,
    pub sku_qty_applied: Option<i64>,
    pub sku_stock_after: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: Restocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restocked {
    pub product_id: ProductId,
    pub catalog_number: u64,
    pub qty: i64,
    pub stock_after: i64,
    pub sku_index: Option<usize>,
    pub sku_stock_after: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LowStockRaised.
///
/// One per granularity (SKU and aggregate independently), so a single order
/// line can raise up to two.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockRaised {
    pub product_id: ProductId,
    pub catalog_number: u64,
    pub name: String,
    #[serde(flatten)]
    pub scope: LowStockScope,
    pub remaining: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    ProductRegistered(ProductRegistered),
    StockDeducted(StockDeducted),
    Restocked(Restocked),
    LowStockRaised(LowStockRaised),
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::ProductRegistered(_) => "inventory.product.registered",
            InventoryEvent::StockDeducted(_) => "inventory.product.stock_deducted",
            InventoryEvent::Restocked(_) => "inventory.product.restocked",
            InventoryEvent::LowStockRaised(_) => "inventory.product.low_stock_raised",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::ProductRegistered(e) => e.occurred_at,
            InventoryEvent::StockDeducted(e) => e.occurred_at,
            InventoryEvent::Restocked(e) => e.occurred_at,
            InventoryEvent::LowStockRaised(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::ProductRegistered(e) => {
                self.id = e.product_id;
                self.catalog_number = e.catalog_number;
                self.name = e.name.clone();
                self.image = e.image.clone();
                self.unit_price = e.unit_price;
                self.stock = e.stock;
                self.skus = e.skus.clone();
                self.created = true;
            }
            InventoryEvent::StockDeducted(e) => {
                self.stock = e.stock_after;
                if let (Some(idx), Some(after)) = (e.sku_index, e.sku_stock_after) {
                    if let Some(sku) = self.skus.get_mut(idx) {
                        sku.stock = after;
                    }
                }
            }
            InventoryEvent::Restocked(e) => {
                self.stock = e.stock_after;
                if let (Some(idx), Some(after)) = (e.sku_index, e.sku_stock_after) {
                    if let Some(sku) = self.skus.get_mut(idx) {
                        sku.stock = after;
                    }
                }
            }
            InventoryEvent::LowStockRaised(_) => {
                // Signal only; carries no state.
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::RegisterProduct(cmd) => self.handle_register(cmd),
            InventoryCommand::DeductStock(cmd) => self.handle_deduct(cmd),
            InventoryCommand::Restock(cmd) => self.handle_restock(cmd),
        }
    }
}

impl Product {
    fn ensure_product_id(&self, product_id: ProductId) -> Result<(), DomainError> {
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterProduct) -> Result<Vec<InventoryEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.stock < 0 {
            return Err(DomainError::validation("stock cannot be negative"));
        }
        for (idx, sku) in cmd.skus.iter().enumerate() {
            if sku.stock < 0 {
                return Err(DomainError::validation(format!(
                    "sku {idx} stock cannot be negative"
                )));
            }
            if sku.combination.is_empty() {
                return Err(DomainError::validation(format!(
                    "sku {idx} combination cannot be empty"
                )));
            }
            // No two SKUs may share the same combination set.
            if !matching_skus(&cmd.skus[..idx], &sku.combination).is_empty() {
                return Err(DomainError::validation(format!(
                    "sku {idx} duplicates an earlier combination"
                )));
            }
        }

        Ok(vec![InventoryEvent::ProductRegistered(ProductRegistered {
            product_id: cmd.product_id,
            catalog_number: cmd.catalog_number,
            name: cmd.name.clone(),
            image: cmd.image.clone(),
            unit_price: cmd.unit_price,
            stock: cmd.stock,
            skus: cmd.skus.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deduct(&self, cmd: &DeductStock) -> Result<Vec<InventoryEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_product_id(cmd.product_id)?;

        if cmd.qty <= 0 {
            return Err(DomainError::validation("qty must be positive"));
        }

        // SKU-level bucket: first match wins; no match means no variant-level
        // stock to decrement (deliberate fallback for non-varianted lines).
        let sku_index = matching_skus(&self.skus, &cmd.variant).into_iter().next();

        let (sku_qty_applied, sku_stock_after) = match sku_index {
            Some(idx) => {
                let current = self.skus[idx].stock;
                let applied = cmd.qty.min(current.max(0));
                (Some(applied), Some(current - applied))
            }
            None => (None, None),
        };

        let applied = cmd.qty.min(self.stock.max(0));
        let stock_after = self.stock - applied;

        let mut events = vec![InventoryEvent::StockDeducted(StockDeducted {
            product_id: cmd.product_id,
            catalog_number: self.catalog_number,
            qty_requested: cmd.qty,
            qty_applied: applied,
            stock_after,
            sku_index,
            sku_qty_applied,
            sku_stock_after,
            occurred_at: cmd.occurred_at,
        })];

        if let (Some(idx), Some(after)) = (sku_index, sku_stock_after) {
            if after <= LOW_STOCK_THRESHOLD {
                events.push(InventoryEvent::LowStockRaised(LowStockRaised {
                    product_id: cmd.product_id,
                    catalog_number: self.catalog_number,
                    name: self.name.clone(),
                    scope: LowStockScope::Sku { index: idx },
                    remaining: after,
                    occurred_at: cmd.occurred_at,
                }));
            }
        }

        if stock_after <= LOW_STOCK_THRESHOLD {
            events.push(InventoryEvent::LowStockRaised(LowStockRaised {
                product_id: cmd.product_id,
                catalog_number: self.catalog_number,
                name: self.name.clone(),
                scope: LowStockScope::Aggregate,
                remaining: stock_after,
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    fn handle_restock(&self, cmd: &Restock) -> Result<Vec<InventoryEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_product_id(cmd.product_id)?;

        if cmd.qty <= 0 {
            return Err(DomainError::validation("qty must be positive"));
        }

        let sku_index = if cmd.variant.is_empty() {
            None
        } else {
            let matches = matching_skus(&self.skus, &cmd.variant);
            match matches.first() {
                Some(&idx) => Some(idx),
                None => {
                    return Err(DomainError::invariant(
                        "restock variant matches no sku combination",
                    ));
                }
            }
        };

        Ok(vec![InventoryEvent::Restocked(Restocked {
            product_id: cmd.product_id,
            catalog_number: self.catalog_number,
            qty: cmd.qty,
            stock_after: self.stock + cmd.qty,
            sku_index,
            sku_stock_after: sku_index.map(|idx| self.skus[idx].stock + cmd.qty),
            occurred_at: cmd.occurred_at,
        })])
    }
}
