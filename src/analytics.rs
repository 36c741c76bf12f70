//! Pure analytics over the order log. Nothing here touches the engine or
//! any clock: functions that need "now" take it as a parameter, so every
//! figure is reproducible in tests.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};

use crate::models::{Item, Order};

#[derive(Debug, Clone, PartialEq)]
pub struct ItemSales {
    pub name: String,
    pub quantity: u64,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RisingStar {
    pub name: String,
    pub quantity: u64,
    pub revenue: f64,
    /// Percent growth of recent-window quantity over the prior window.
    pub growth: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodComparison {
    pub revenue_change: f64,
    pub orders_change: f64,
    pub avg_order_value_change: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsightKind {
    Info,
    Success,
    Warning,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insight {
    pub kind: InsightKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeakHour {
    pub hour: u32,
    pub count: usize,
}

/// Groups orders by UTC calendar day, keyed `YYYY-MM-DD`. BTreeMap keeps
/// the keys chronologically sorted.
pub fn group_by_day(orders: &[Order]) -> BTreeMap<String, Vec<Order>> {
    group_by(orders, |o| o.timestamp.format("%Y-%m-%d").to_string())
}

/// Groups orders by ISO week, keyed `YYYY-Wnn`. The year is the ISO week
/// year, which differs from the calendar year at year boundaries.
pub fn group_by_week(orders: &[Order]) -> BTreeMap<String, Vec<Order>> {
    group_by(orders, |o| {
        let week = o.timestamp.iso_week();
        format!("{}-W{:02}", week.year(), week.week())
    })
}

/// Groups orders by UTC calendar month, keyed `YYYY-MM`.
pub fn group_by_month(orders: &[Order]) -> BTreeMap<String, Vec<Order>> {
    group_by(orders, |o| o.timestamp.format("%Y-%m").to_string())
}

fn group_by(
    orders: &[Order],
    key: impl Fn(&Order) -> String,
) -> BTreeMap<String, Vec<Order>> {
    let mut groups: BTreeMap<String, Vec<Order>> = BTreeMap::new();
    for order in orders {
        groups.entry(key(order)).or_default().push(order.clone());
    }
    groups
}

/// First and last day of the ISO week named by a `YYYY-Wnn` key.
pub fn week_range(key: &str) -> Option<(NaiveDate, NaiveDate)> {
    let (year, week) = key.split_once("-W")?;
    let year: i32 = year.parse().ok()?;
    let week: u32 = week.parse().ok()?;
    let monday = NaiveDate::from_isoywd_opt(year, week, chrono::Weekday::Mon)?;
    let sunday = NaiveDate::from_isoywd_opt(year, week, chrono::Weekday::Sun)?;
    Some((monday, sunday))
}

pub fn revenue(orders: &[Order]) -> f64 {
    orders.iter().map(|o| o.total).sum()
}

/// Percent change from `previous` to `current`. With no prior baseline
/// the result is 100 when anything was sold and 0 when nothing was:
/// growth from nothing is total, not infinite.
pub fn growth_rate(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        if current > 0.0 {
            100.0
        } else {
            0.0
        }
    } else {
        (current - previous) / previous * 100.0
    }
}

/// Trailing moving average. The window shrinks at the start of the
/// series instead of emitting nothing, so output length equals input
/// length.
pub fn moving_average(values: &[f64], period: usize) -> Vec<f64> {
    let period = period.max(1);
    values
        .iter()
        .enumerate()
        .map(|(i, _)| {
            let start = (i + 1).saturating_sub(period);
            let window = &values[start..=i];
            window.iter().sum::<f64>() / window.len() as f64
        })
        .collect()
}

/// The top five periods by revenue, descending. Ties keep the earlier
/// period first.
pub fn find_peak_periods(groups: &BTreeMap<String, Vec<Order>>) -> Vec<(String, f64)> {
    let mut totals: Vec<(String, f64)> = groups
        .iter()
        .map(|(key, orders)| (key.clone(), revenue(orders)))
        .collect();
    totals.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    totals.truncate(5);
    totals
}

pub fn compare_periods(current: &[Order], previous: &[Order]) -> PeriodComparison {
    let cur_revenue = revenue(current);
    let prev_revenue = revenue(previous);
    let cur_avg = if current.is_empty() {
        0.0
    } else {
        cur_revenue / current.len() as f64
    };
    let prev_avg = if previous.is_empty() {
        0.0
    } else {
        prev_revenue / previous.len() as f64
    };
    PeriodComparison {
        revenue_change: growth_rate(cur_revenue, prev_revenue),
        orders_change: growth_rate(current.len() as f64, previous.len() as f64),
        avg_order_value_change: growth_rate(cur_avg, prev_avg),
    }
}

/// Per-item sales totals in first-seen order across the order log.
fn tally<'a>(orders: impl IntoIterator<Item = &'a Order>) -> Vec<ItemSales> {
    let mut index: BTreeMap<&str, usize> = BTreeMap::new();
    let mut totals: Vec<ItemSales> = Vec::new();
    for order in orders {
        for line in &order.items {
            let slot = *index.entry(line.name.as_str()).or_insert_with(|| {
                totals.push(ItemSales {
                    name: line.name.clone(),
                    quantity: 0,
                    revenue: 0.0,
                });
                totals.len() - 1
            });
            totals[slot].quantity += line.qty as u64;
            totals[slot].revenue += line.price * line.qty as f64;
        }
    }
    totals
}

/// Items ranked by units sold, descending; ties keep first-seen order.
pub fn rank_items_by_sales(orders: &[Order]) -> Vec<ItemSales> {
    let mut totals = tally(orders);
    totals.sort_by(|a, b| b.quantity.cmp(&a.quantity));
    totals
}

/// Items ranked by revenue, descending; ties keep first-seen order.
pub fn rank_items_by_revenue(orders: &[Order]) -> Vec<ItemSales> {
    let mut totals = tally(orders);
    totals.sort_by(|a, b| b.revenue.partial_cmp(&a.revenue).unwrap_or(std::cmp::Ordering::Equal));
    totals
}

/// Items whose recent-window quantity grew more than 20% over the prior
/// window of the same length, sorted by growth descending. An item
/// absent from the prior window counts as 100% growth.
pub fn rising_stars(orders: &[Order], now: DateTime<Utc>, weeks: i64) -> Vec<RisingStar> {
    let recent_start = now - Duration::days(weeks * 7);
    let prior_start = now - Duration::days(weeks * 14);

    let recent = tally(
        orders
            .iter()
            .filter(|o| o.timestamp >= recent_start && o.timestamp <= now),
    );
    let prior = tally(
        orders
            .iter()
            .filter(|o| o.timestamp >= prior_start && o.timestamp < recent_start),
    );

    let mut stars: Vec<RisingStar> = recent
        .into_iter()
        .filter_map(|sales| {
            let before = prior
                .iter()
                .find(|p| p.name == sales.name)
                .map(|p| p.quantity as f64)
                .unwrap_or(0.0);
            let growth = growth_rate(sales.quantity as f64, before);
            (growth > 20.0).then_some(RisingStar {
                name: sales.name,
                quantity: sales.quantity,
                revenue: sales.revenue,
                growth,
            })
        })
        .collect();
    stars.sort_by(|a, b| b.growth.partial_cmp(&a.growth).unwrap_or(std::cmp::Ordering::Equal));
    stars
}

/// Average units of one item sold per day over the trailing window.
pub fn sales_velocity(name: &str, orders: &[Order], now: DateTime<Utc>, days: i64) -> f64 {
    let days = days.max(1);
    let start = now - Duration::days(days);
    let quantity: u64 = orders
        .iter()
        .filter(|o| o.timestamp >= start && o.timestamp <= now)
        .flat_map(|o| &o.items)
        .filter(|l| l.name == name)
        .map(|l| l.qty as u64)
        .sum();
    quantity as f64 / days as f64
}

/// Naive next-period forecast: average of the last `periods` values plus
/// the mean period-over-period delta, floored at zero and rounded.
/// `None` when the series is shorter than `periods`.
pub fn forecast(values: &[f64], periods: usize) -> Option<f64> {
    if periods == 0 || values.len() < periods {
        return None;
    }
    let tail = &values[values.len() - periods..];
    let avg = tail.iter().sum::<f64>() / periods as f64;
    let trend = if tail.len() > 1 {
        tail.windows(2).map(|w| w[1] - w[0]).sum::<f64>() / (tail.len() - 1) as f64
    } else {
        0.0
    };
    Some((avg + trend).max(0.0).round())
}

/// Plain-language observations over current data, in a fixed order:
/// weekly revenue swing, top seller, low stock, trending item.
pub fn insights(orders: &[Order], items: &[Item], now: DateTime<Utc>) -> Vec<Insight> {
    if orders.is_empty() {
        return vec![Insight {
            kind: InsightKind::Info,
            message: "No orders yet. Start tracking sales to see insights!".to_string(),
        }];
    }

    let mut out = Vec::new();

    let week_start = now - Duration::days(7);
    let prior_start = now - Duration::days(14);
    let this_week: Vec<&Order> = orders
        .iter()
        .filter(|o| o.timestamp >= week_start && o.timestamp <= now)
        .collect();
    let last_week: Vec<&Order> = orders
        .iter()
        .filter(|o| o.timestamp >= prior_start && o.timestamp < week_start)
        .collect();
    if !this_week.is_empty() && !last_week.is_empty() {
        let change = growth_rate(
            this_week.iter().map(|o| o.total).sum(),
            last_week.iter().map(|o| o.total).sum(),
        );
        if change.abs() > 5.0 {
            out.push(Insight {
                kind: if change > 0.0 {
                    InsightKind::Success
                } else {
                    InsightKind::Warning
                },
                message: if change > 0.0 {
                    format!("Revenue is up {change:.1}% this week")
                } else {
                    format!("Revenue is down {:.1}% this week", change.abs())
                },
            });
        }
    }

    if let Some(top) = rank_items_by_sales(orders).first() {
        if top.quantity > 0 {
            out.push(Insight {
                kind: InsightKind::Info,
                message: format!(
                    "{} is your #1 seller with {} units sold",
                    top.name, top.quantity
                ),
            });
        }
    }

    let low = items.iter().filter(|i| i.stock > 0 && i.stock < 10).count();
    if low > 0 {
        out.push(Insight {
            kind: InsightKind::Warning,
            message: format!("{low} item(s) running low on stock"),
        });
    }

    if let Some(star) = rising_stars(orders, now, 1).first() {
        out.push(Insight {
            kind: InsightKind::Success,
            message: format!("{} sales up {:.0}% - trending!", star.name, star.growth),
        });
    }

    out
}

/// Busiest hour of day by order count, in local time.
pub fn peak_hour(orders: &[Order]) -> Option<PeakHour> {
    peak_hour_in(orders, &chrono::Local)
}

/// Busiest hour of day by order count in the given timezone. Ties go to
/// the earlier hour.
pub fn peak_hour_in<Tz: TimeZone>(orders: &[Order], tz: &Tz) -> Option<PeakHour> {
    let mut counts = [0usize; 24];
    for order in orders {
        let hour = order.timestamp.with_timezone(tz).hour() as usize;
        counts[hour] += 1;
    }
    counts
        .iter()
        .enumerate()
        .filter(|(_, count)| **count > 0)
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))
        .map(|(hour, count)| PeakHour {
            hour: hour as u32,
            count: *count,
        })
}
