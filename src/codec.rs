//! Unified backup codec: the three collections as one flat text document
//! with `[ITEMS]` / `[ORDERS]` / `[USERS]` sections, each a CSV table.
//! Composite columns (`items`, `user` on orders) hold JSON inside a
//! quoted CSV field. Decode is tolerant per field: bad numbers become
//! zero, bad JSON falls back to the documented default, currency glyphs
//! are stripped. `decode(encode(x))` is semantically equal to `x`.

use chrono::{DateTime, Local, SecondsFormat, Utc};
use tracing::warn;

use crate::error::{Error, Result};
use crate::models::{
    default_avatar, default_color, epoch, Item, Order, OrderLine, StoreData, User,
};

const ITEMS_MARKER: &str = "[ITEMS]";
const ORDERS_MARKER: &str = "[ORDERS]";
const USERS_MARKER: &str = "[USERS]";

const ITEM_HEADER: &str = "id,name,price,stock,count,color,imageUrl";
const ORDER_HEADER: &str = "id,timestamp,items,total,user,device";
const USER_HEADER: &str = "id,name,avatar";

pub fn encode(data: &StoreData) -> String {
    let mut out = String::new();

    out.push_str(ITEMS_MARKER);
    out.push('\n');
    out.push_str(ITEM_HEADER);
    out.push('\n');
    for item in &data.items {
        let row = [
            escape(&item.id),
            escape(&item.name),
            format_number(item.price),
            item.stock.to_string(),
            item.count.to_string(),
            escape(&item.color),
            escape(&item.image_url),
        ]
        .join(",");
        out.push_str(&row);
        out.push('\n');
    }
    out.push('\n');

    out.push_str(ORDERS_MARKER);
    out.push('\n');
    out.push_str(ORDER_HEADER);
    out.push('\n');
    for order in &data.orders {
        let items_json = serde_json::to_string(&order.items).unwrap_or_else(|_| "[]".to_string());
        let user_json = serde_json::to_string(&order.user).unwrap_or_else(|_| "{}".to_string());
        let row = [
            escape(&order.id),
            order
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            escape(&items_json),
            format_number(order.total),
            escape(&user_json),
            escape(&order.device),
        ]
        .join(",");
        out.push_str(&row);
        out.push('\n');
    }
    out.push('\n');

    out.push_str(USERS_MARKER);
    out.push('\n');
    out.push_str(USER_HEADER);
    out.push('\n');
    for user in &data.users {
        let row = [escape(&user.id), escape(&user.name), escape(&user.avatar)].join(",");
        out.push_str(&row);
        out.push('\n');
    }

    out
}

pub fn decode(text: &str) -> Result<StoreData> {
    let mut sections: [Vec<String>; 3] = [Vec::new(), Vec::new(), Vec::new()];
    let mut current: Option<usize> = None;
    let mut saw_marker = false;

    for line in logical_lines(text) {
        let line = line.strip_suffix('\r').unwrap_or(&line).to_string();
        match line.trim() {
            ITEMS_MARKER => {
                current = Some(0);
                saw_marker = true;
            }
            ORDERS_MARKER => {
                current = Some(1);
                saw_marker = true;
            }
            USERS_MARKER => {
                current = Some(2);
                saw_marker = true;
            }
            trimmed => {
                if let Some(idx) = current {
                    if !trimmed.is_empty() {
                        sections[idx].push(line);
                    }
                }
            }
        }
    }

    if !saw_marker {
        return Err(Error::Codec("no section markers found".to_string()));
    }

    let [items_lines, orders_lines, users_lines] = sections;
    Ok(StoreData {
        items: decode_items(&items_lines),
        orders: decode_orders(&orders_lines),
        users: decode_users(&users_lines),
    })
}

fn decode_items(lines: &[String]) -> Vec<Item> {
    let Some((headers, rows)) = split_table(lines) else {
        return Vec::new();
    };
    rows.iter()
        .map(|row| {
            let get = |name: &str| field(&headers, row, name);
            let color = get("color");
            Item {
                id: get("id"),
                name: get("name"),
                price: parse_number(&get("price")).max(0.0),
                stock: parse_number(&get("stock")).max(0.0) as u32,
                count: parse_number(&get("count")).max(0.0) as u64,
                color: if color.is_empty() {
                    default_color()
                } else {
                    color
                },
                image_url: get("imageUrl"),
            }
        })
        .collect()
}

fn decode_orders(lines: &[String]) -> Vec<Order> {
    let Some((headers, rows)) = split_table(lines) else {
        return Vec::new();
    };
    rows.iter()
        .map(|row| {
            let get = |name: &str| field(&headers, row, name);
            Order {
                id: get("id"),
                timestamp: parse_timestamp(&get("timestamp")),
                items: parse_lines_json(&get("items")),
                total: parse_number(&get("total")),
                user: parse_user_json(&get("user")),
                device: get("device"),
            }
        })
        .collect()
}

fn decode_users(lines: &[String]) -> Vec<User> {
    let Some((headers, rows)) = split_table(lines) else {
        return Vec::new();
    };
    rows.iter()
        .map(|row| {
            let get = |name: &str| field(&headers, row, name);
            let avatar = get("avatar");
            User {
                id: get("id"),
                name: get("name"),
                avatar: if avatar.is_empty() {
                    default_avatar()
                } else {
                    avatar
                },
            }
        })
        .collect()
}

fn split_table(lines: &[String]) -> Option<(Vec<String>, Vec<Vec<String>>)> {
    let (first, rest) = lines.split_first()?;
    let headers = split_fields(first);
    let rows = rest.iter().map(|line| split_fields(line)).collect();
    Some((headers, rows))
}

fn field(headers: &[String], row: &[String], name: &str) -> String {
    headers
        .iter()
        .position(|h| h == name)
        .and_then(|idx| row.get(idx))
        .cloned()
        .unwrap_or_default()
}

fn parse_lines_json(raw: &str) -> Vec<OrderLine> {
    if raw.is_empty() {
        return Vec::new();
    }
    match serde_json::from_str(raw) {
        Ok(lines) => lines,
        Err(err) => {
            warn!("order line items failed JSON decode, substituting empty basket: {err}");
            Vec::new()
        }
    }
}

fn parse_user_json(raw: &str) -> User {
    if raw.is_empty() {
        return User::default();
    }
    match serde_json::from_str(raw) {
        Ok(user) => user,
        Err(err) => {
            warn!("order user failed JSON decode, substituting placeholder: {err}");
            User::default()
        }
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => ts.with_timezone(&Utc),
        Err(_) => {
            if !raw.is_empty() {
                warn!("unparsable order timestamp {raw:?}, substituting epoch");
            }
            epoch()
        }
    }
}

/// Strips a currency glyph prefix and thousands separators, then parses.
/// Anything unparsable becomes zero.
fn parse_number(raw: &str) -> f64 {
    let cleaned: String = raw.chars().filter(|c| *c != '₹' && *c != ',').collect();
    cleaned.trim().parse().unwrap_or(0.0)
}

fn format_number(value: f64) -> String {
    format!("{}", value)
}

fn escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Splits a document into lines, keeping newlines that fall inside quoted
/// fields as part of the same logical line.
fn logical_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in text.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            '\n' if !in_quotes => lines.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Splits one logical CSV line into fields. Doubled quotes inside a
/// quoted field unescape to a single quote; unquoted fields are trimmed.
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut was_quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' => {
                in_quotes = true;
                was_quoted = true;
            }
            ',' if !in_quotes => {
                fields.push(finish_field(&mut current, &mut was_quoted));
            }
            _ => current.push(ch),
        }
    }
    fields.push(finish_field(&mut current, &mut was_quoted));
    fields
}

fn finish_field(current: &mut String, was_quoted: &mut bool) -> String {
    let raw = std::mem::take(current);
    let value = if *was_quoted {
        raw
    } else {
        raw.trim().to_string()
    };
    *was_quoted = false;
    value
}

/// Order log report in the original export shape: one row per order with
/// `; `-joined baskets and ₹-prefixed prices. Not round-trippable; the
/// unified format above is the backup contract.
pub fn orders_report_csv(orders: &[Order]) -> String {
    let mut out = String::from(
        "Order ID,Date,Time,Items,Quantities,Item Prices,Total,Staff,Device\n",
    );
    for order in orders {
        let local = order.timestamp.with_timezone(&Local);
        let names = order
            .items
            .iter()
            .map(|l| l.name.clone())
            .collect::<Vec<_>>()
            .join("; ");
        let quantities = order
            .items
            .iter()
            .map(|l| l.qty.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        let prices = order
            .items
            .iter()
            .map(|l| format!("₹{}", format_number(l.price)))
            .collect::<Vec<_>>()
            .join("; ");
        let row = [
            escape(&order.id),
            local.format("%d/%m/%Y").to_string(),
            local.format("%H:%M").to_string(),
            escape(&names),
            escape(&quantities),
            escape(&prices),
            format!("₹{}", format_number(order.total)),
            escape(&order.user.name),
            escape(&order.device),
        ]
        .join(",");
        out.push_str(&row);
        out.push('\n');
    }
    out
}

/// Inventory report in the original export shape.
pub fn items_report_csv(items: &[Item]) -> String {
    let mut out = String::from("Item ID,Name,Price,Stock,Total Sold\n");
    for item in items {
        let row = [
            escape(&item.id),
            escape(&item.name),
            format!("₹{}", format_number(item.price)),
            item.stock.to_string(),
            item.count.to_string(),
        ]
        .join(",");
        out.push_str(&row);
        out.push('\n');
    }
    out
}
