//! Built-in seed data used when neither the remote store nor local
//! persistence has anything, plus a demo-order generator for exercising
//! the analytics screens with a year of plausible history.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::{Item, Order, OrderLine, User};

pub fn default_items() -> Vec<Item> {
    let defs: [(&str, &str, f64, u32, &str); 6] = [
        ("1", "Masala Chai", 15.0, 100, "#e0c097"),
        ("2", "Ginger Tea", 20.0, 50, "#f7d794"),
        ("3", "Lemon Tea", 20.0, 40, "#f8a5c2"),
        ("4", "Coffee", 25.0, 80, "#774a38"),
        ("5", "Bun", 10.0, 30, "#f3a683"),
        ("6", "Samosa", 15.0, 25, "#e17055"),
    ];
    defs.iter()
        .map(|(id, name, price, stock, color)| Item {
            id: (*id).to_string(),
            name: (*name).to_string(),
            price: *price,
            stock: *stock,
            count: 0,
            color: (*color).to_string(),
            image_url: String::new(),
        })
        .collect()
}

pub fn default_users() -> Vec<User> {
    vec![
        User {
            id: "u1".to_string(),
            name: "Owner".to_string(),
            avatar: "👑".to_string(),
        },
        User {
            id: "u2".to_string(),
            name: "Staff 1".to_string(),
            avatar: "👨‍🍳".to_string(),
        },
    ]
}

const PEAK_HOURS: [u32; 9] = [8, 9, 10, 12, 13, 14, 16, 17, 18];

/// Generates `days` worth of demo orders ending at `now`, newest-first.
/// Order volume carries a growth trend, weekend and seasonal boosts, a
/// payday spike on the 10th, and clusters around shop peak hours.
pub fn demo_orders(
    items: &[Item],
    users: &[User],
    now: DateTime<Utc>,
    days: u32,
    seed: u64,
) -> Vec<Order> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut orders = Vec::new();

    if items.is_empty() || users.is_empty() {
        return orders;
    }

    for days_ago in 0..days {
        let date = now - Duration::days(days_ago as i64);
        let year_progress = 1.0 - days_ago as f64 / days.max(1) as f64;
        let growth = 0.5 + year_progress;

        let mut per_day = ((3.0 + rng.gen::<f64>() * 5.0) * growth) as i64;
        match date.weekday() {
            Weekday::Sat | Weekday::Sun => per_day += (3.0 * growth) as i64,
            Weekday::Mon => per_day = (per_day - 1).max(1),
            _ => {}
        }
        match date.month() {
            12 | 1 => per_day = (per_day as f64 * 1.4) as i64,
            5 | 6 => per_day = (per_day as f64 * 1.2) as i64,
            _ => {}
        }
        if days_ago < 30 {
            per_day += 5;
        }
        if days_ago < 7 {
            per_day += 5;
        }
        if date.day() == 10 {
            per_day = per_day.max(20 + rng.gen_range(0..10));
        }

        for idx in 0..per_day {
            let hour = if rng.gen::<f64>() > 0.3 {
                PEAK_HOURS[rng.gen_range(0..PEAK_HOURS.len())]
            } else {
                8 + rng.gen_range(0..13)
            };
            let minute = rng.gen_range(0..60);
            let timestamp = match date.with_hour(hour).and_then(|d| d.with_minute(minute)) {
                Some(ts) => ts.with_second(0).unwrap_or(ts),
                None => date,
            };
            let timestamp = match timestamp.with_nanosecond(0) {
                Some(ts) => ts,
                None => timestamp,
            };
            if timestamp > now {
                continue;
            }

            let basket = 1 + rng.gen_range(0..5);
            let mut lines: Vec<OrderLine> = Vec::with_capacity(basket);
            for _ in 0..basket {
                let item = &items[rng.gen_range(0..items.len())];
                let qty = 1 + rng.gen_range(0..3);
                lines.push(OrderLine::from_item(item, qty));
            }
            let total = lines.iter().map(|l| l.price * l.qty as f64).sum();

            orders.push(Order {
                id: format!("order_{}_{}_{}", timestamp.timestamp_millis(), days_ago, idx),
                timestamp,
                items: lines,
                total,
                user: users[rng.gen_range(0..users.len())].clone(),
                device: if rng.gen::<f64>() > 0.7 {
                    "Mobile Order".to_string()
                } else {
                    "POS Terminal".to_string()
                },
            });
        }
    }

    orders.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    orders
}
