use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Max orders kept in canonical state and persisted. Oldest orders are
/// evicted first; the collection is maintained newest-first.
pub const MAX_ORDERS: usize = 500;

pub fn default_color() -> String {
    "#cccccc".to_string()
}

pub fn default_avatar() -> String {
    "👤".to_string()
}

fn default_qty() -> u32 {
    1
}

/// A sellable product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    /// Unit price, never negative.
    #[serde(default)]
    pub price: f64,
    /// Units on hand, clamped at zero.
    #[serde(default)]
    pub stock: u32,
    /// Cumulative units ever sold.
    #[serde(default)]
    pub count: u64,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default, rename = "imageUrl")]
    pub image_url: String,
}

/// Payload for creating an item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewItem {
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub stock: u32,
    pub color: Option<String>,
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
}

/// Partial update for an item. Stock changes go through the dedicated
/// stock mutations instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub price: Option<f64>,
    pub color: Option<String>,
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
}

/// One line of an order: a structural copy of the item fields at sale
/// time plus a quantity. Later edits to the item never alter this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default = "default_qty")]
    pub qty: u32,
    #[serde(default = "default_color")]
    pub color: String,
}

impl OrderLine {
    pub fn from_item(item: &Item, qty: u32) -> Self {
        OrderLine {
            id: item.id.clone(),
            name: item.name.clone(),
            price: item.price,
            qty,
            color: item.color.clone(),
        }
    }
}

/// A staff profile. Orders carry a denormalized copy of the user who
/// recorded them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default = "default_avatar")]
    pub avatar: String,
}

impl Default for User {
    fn default() -> Self {
        User {
            id: String::new(),
            name: "Unknown".to_string(),
            avatar: default_avatar(),
        }
    }
}

/// An immutable sale record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<OrderLine>,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub user: User,
    #[serde(default)]
    pub device: String,
}

impl Order {
    /// Recomputes the total from the line entries. Must equal `total`.
    pub fn computed_total(&self) -> f64 {
        self.items
            .iter()
            .map(|line| line.price * line.qty as f64)
            .sum()
    }
}

/// The three canonical collections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreData {
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub orders: Vec<Order>,
    #[serde(default)]
    pub users: Vec<User>,
}

/// The remote-store document shape. `updated_at` strictly increases with
/// each remote write and is compared by exact string equality to decide
/// whether an inbound push is foreign.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub data: StoreData,
    #[serde(default, rename = "updatedAt")]
    pub updated_at: String,
}

impl Envelope {
    pub fn new(data: StoreData, updated_at: impl Into<String>) -> Self {
        Envelope {
            data,
            updated_at: updated_at.into(),
        }
    }
}

/// Fallback timestamp for orders whose stored timestamp fails to parse.
pub fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(0, 0).single().unwrap_or_default()
}
