//! Mutation surface of the engine. Every mutation applies to in-memory
//! state synchronously, bumps the change counter, and signals the flush
//! worker; persistence is never on the caller's path.

use chrono::{Timelike, Utc};

use crate::error::{Error, Result};
use crate::models::{default_avatar, default_color, Item, ItemPatch, NewItem, Order, OrderLine, User};

use super::StoreEngine;

impl StoreEngine {
    fn touch(&self) {
        self.inner.bump();
        let _ = self.dirty_tx.send(());
    }

    pub fn add_item(&self, new: NewItem) -> Result<Item> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("item name must not be empty".to_string()));
        }
        let item = Item {
            id: self.inner.ids.next(""),
            name: name.to_string(),
            price: new.price.max(0.0),
            stock: new.stock,
            count: 0,
            color: new.color.unwrap_or_else(default_color),
            image_url: new.image_url.unwrap_or_default(),
        };
        self.inner.state.write().items.push(item.clone());
        self.touch();
        Ok(item)
    }

    /// Applies the set fields of the patch; returns false when the item
    /// does not exist. A blank patched name keeps the existing one.
    pub fn edit_item(&self, id: &str, patch: &ItemPatch) -> bool {
        let changed = {
            let mut state = self.inner.state.write();
            match state.items.iter_mut().find(|i| i.id == id) {
                Some(item) => {
                    if let Some(name) = &patch.name {
                        let name = name.trim();
                        if !name.is_empty() {
                            item.name = name.to_string();
                        }
                    }
                    if let Some(price) = patch.price {
                        item.price = price.max(0.0);
                    }
                    if let Some(color) = &patch.color {
                        item.color = color.clone();
                    }
                    if let Some(image_url) = &patch.image_url {
                        item.image_url = image_url.clone();
                    }
                    true
                }
                None => false,
            }
        };
        if changed {
            self.touch();
        }
        changed
    }

    pub fn delete_item(&self, id: &str) -> bool {
        let removed = {
            let mut state = self.inner.state.write();
            let before = state.items.len();
            state.items.retain(|i| i.id != id);
            state.items.len() != before
        };
        if removed {
            self.touch();
        }
        removed
    }

    /// Shifts stock by a signed delta, clamping at zero. Returns the
    /// resulting stock, or `None` for an unknown item.
    pub fn adjust_stock(&self, id: &str, delta: i64) -> Option<u32> {
        let updated = {
            let mut state = self.inner.state.write();
            let item = state.items.iter_mut().find(|i| i.id == id)?;
            let next = (item.stock as i64 + delta).clamp(0, u32::MAX as i64) as u32;
            item.stock = next;
            Some(next)
        };
        if updated.is_some() {
            self.touch();
        }
        updated
    }

    pub fn set_stock(&self, id: &str, value: i64) -> Option<u32> {
        let updated = {
            let mut state = self.inner.state.write();
            let item = state.items.iter_mut().find(|i| i.id == id)?;
            let next = value.clamp(0, u32::MAX as i64) as u32;
            item.stock = next;
            Some(next)
        };
        if updated.is_some() {
            self.touch();
        }
        updated
    }

    /// Records a sale: zero-quantity lines are dropped, and an order with
    /// no remaining lines is a no-op returning `None`. Stock and sold
    /// counts update for every line whose item still exists.
    pub fn place_order(&self, lines: Vec<OrderLine>) -> Option<Order> {
        let lines: Vec<OrderLine> = lines.into_iter().filter(|l| l.qty > 0).collect();
        if lines.is_empty() {
            return None;
        }
        let total = lines.iter().map(|l| l.price * l.qty as f64).sum();
        let now = Utc::now();
        // Truncate to the millisecond so the stored timestamp survives a
        // backup round-trip byte-exact.
        let timestamp = now
            .with_nanosecond(now.nanosecond() / 1_000_000 * 1_000_000)
            .unwrap_or(now);
        let order = Order {
            id: self.inner.ids.next("order_"),
            timestamp,
            items: lines,
            total,
            user: self.current_user(),
            device: self.inner.cfg.device_label.clone(),
        };

        {
            let mut state = self.inner.state.write();
            for line in &order.items {
                if let Some(item) = state.items.iter_mut().find(|i| i.id == line.id) {
                    item.count += line.qty as u64;
                    item.stock = item.stock.saturating_sub(line.qty);
                }
            }
            state.orders.insert(0, order.clone());
            let cap = self.inner.cfg.retention_cap;
            if state.orders.len() > cap {
                state.orders.truncate(cap);
            }
        }
        self.touch();
        Some(order)
    }

    /// Adds a staff profile and makes it the current user. A blank name
    /// becomes "New User".
    pub fn add_user(&self, name: &str, avatar: Option<String>) -> User {
        let name = name.trim();
        let user = User {
            id: self.inner.ids.next("u"),
            name: if name.is_empty() {
                "New User".to_string()
            } else {
                name.to_string()
            },
            avatar: avatar.unwrap_or_else(default_avatar),
        };
        {
            let mut state = self.inner.state.write();
            state.users.push(user.clone());
            *self.inner.current_user.write() = user.clone();
        }
        self.touch();
        user
    }

    /// Renames a profile; a blank name keeps the existing one. The
    /// current-user copy is kept in step when it is the one edited.
    pub fn edit_user(&self, id: &str, name: &str, avatar: Option<String>) -> bool {
        let changed = {
            let mut state = self.inner.state.write();
            match state.users.iter_mut().find(|u| u.id == id) {
                Some(user) => {
                    let name = name.trim();
                    if !name.is_empty() {
                        user.name = name.to_string();
                    }
                    if let Some(avatar) = avatar {
                        user.avatar = avatar;
                    }
                    let user = user.clone();
                    let mut current = self.inner.current_user.write();
                    if current.id == id {
                        *current = user;
                    }
                    true
                }
                None => false,
            }
        };
        if changed {
            self.touch();
        }
        changed
    }

    /// Removes a profile. The last remaining profile cannot be deleted.
    /// Deleting the current user reassigns to the first remaining one.
    pub fn delete_user(&self, id: &str) -> bool {
        let removed = {
            let mut state = self.inner.state.write();
            if state.users.len() <= 1 || !state.users.iter().any(|u| u.id == id) {
                false
            } else {
                state.users.retain(|u| u.id != id);
                let mut current = self.inner.current_user.write();
                if current.id == id {
                    *current = state.users.first().cloned().unwrap_or_default();
                }
                true
            }
        };
        if removed {
            self.touch();
        }
        removed
    }

    /// Switches the active profile. Session-only: observers are notified
    /// but nothing is persisted or pushed.
    pub fn set_current_user(&self, id: &str) -> bool {
        let switched = {
            let state = self.inner.state.read();
            match state.users.iter().find(|u| u.id == id) {
                Some(user) => {
                    *self.inner.current_user.write() = user.clone();
                    true
                }
                None => false,
            }
        };
        if switched {
            self.inner.bump();
        }
        switched
    }
}
