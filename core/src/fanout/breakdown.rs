// storekeep/src/fanout/breakdown.rs

use std::collections::BTreeMap;
use uuid::Uuid;

use super::LineSnapshot;

/// The part of an order that belongs to one seller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SellerBreakdown {
  pub seller_id: Uuid,
  pub lines: Vec<LineSnapshot>,
  pub subtotal_cents: i64,
  pub item_count: i64,
}

/// Groups lines by seller, ordered by seller id so notification order is deterministic.
pub fn breakdown_by_seller(lines: &[LineSnapshot]) -> Vec<SellerBreakdown> {
  let mut grouped: BTreeMap<Uuid, SellerBreakdown> = BTreeMap::new();
  for line in lines {
    let entry = grouped.entry(line.seller_id).or_insert_with(|| SellerBreakdown {
      seller_id: line.seller_id,
      lines: Vec::new(),
      subtotal_cents: 0,
      item_count: 0,
    });
    entry.subtotal_cents += line.line_total_cents();
    entry.item_count += i64::from(line.quantity);
    entry.lines.push(line.clone());
  }
  grouped.into_values().collect()
}
