//! Offline-first point-of-sale data engine: canonical in-memory state
//! for items, orders, and staff profiles, durable local persistence,
//! debounced mirroring to a shared remote document store, a unified
//! text backup format, and pure analytics over the order log.

pub mod analytics;
pub mod codec;
pub mod engine;
pub mod error;
pub mod local;
pub mod models;
pub mod remote;
pub mod seed;
pub mod util;


pub use engine::{DataSource, EngineConfig, StoreEngine, SyncStatus};
pub use error::{Error, Result};
pub use models::{Envelope, Item, ItemPatch, NewItem, Order, OrderLine, StoreData, User};
