//! The atomic reservation script.
//!
//! Wire shape, as sent to the cache:
//!
//! ```text
//! KEYS = ["variant:<id>", ...]                         (one per line, same order)
//! ARGV = [itemCount, expectedSubtotal, id, qty, price, id, qty, price, ...]
//! reply = ["OK"] | ["MISS", id...] | ["INSUFFICIENT", id]
//!       | ["INVALID_PRICE", id] | ["INVALID_TOTAL", computedSubtotal]
//!       | ["ERROR", message]
//! ```
//!
//! The script runs with exclusive access to the store. It mutates nothing
//! unless every check passes.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

use super::stock_record::{stock_key, FIELD_PRICE, FIELD_QUANTITY};
use crate::error::CacheError;

const TAG_OK: &str = "OK";
const TAG_MISS: &str = "MISS";
const TAG_INSUFFICIENT: &str = "INSUFFICIENT";
const TAG_INVALID_PRICE: &str = "INVALID_PRICE";
const TAG_INVALID_TOTAL: &str = "INVALID_TOTAL";
const TAG_ERROR: &str = "ERROR";

/// What a script needs from the store, in the spirit of `redis.call`.
pub trait ScriptContext {
    fn exists(&mut self, key: &str) -> bool;
    fn hget(&mut self, key: &str, field: &str) -> Option<String>;
    fn hincrby(&mut self, key: &str, field: &str, delta: i64) -> Option<i64>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReservationLine {
    pub variant_id: i64,
    pub quantity: i64,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReservationRequest {
    pub lines: Vec<ReservationLine>,
    /// Order total minus shipping, as submitted by the client.
    pub expected_subtotal: Decimal,
}

impl ReservationRequest {
    pub fn keys(&self) -> Vec<String> {
        self.lines.iter().map(|line| stock_key(line.variant_id)).collect()
    }

    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(2 + self.lines.len() * 3);
        args.push(self.lines.len().to_string());
        args.push(self.expected_subtotal.to_string());
        for line in &self.lines {
            args.push(line.variant_id.to_string());
            args.push(line.quantity.to_string());
            args.push(line.unit_price.to_string());
        }
        args
    }

    pub fn variant_ids(&self) -> Vec<i64> {
        self.lines.iter().map(|line| line.variant_id).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReservationOutcome {
    /// Every line was decremented.
    Reserved,
    Miss(Vec<i64>),
    Insufficient(i64),
    InvalidPrice(i64),
    InvalidTotal(Decimal),
}

impl ReservationOutcome {
    pub fn parse(reply: Vec<String>) -> Result<Self, CacheError> {
        let mut parts = reply.into_iter();
        let tag = parts.next().ok_or_else(|| CacheError::Script("empty reply".into()))?;
        let rest: Vec<String> = parts.collect();

        let single_id = |rest: &[String]| -> Result<i64, CacheError> {
            rest.first()
                .and_then(|raw| raw.parse().ok())
                .ok_or_else(|| CacheError::Script(format!("{} without a variant id", tag)))
        };

        match tag.as_str() {
            TAG_OK => Ok(ReservationOutcome::Reserved),
            TAG_MISS => {
                let ids = rest
                    .iter()
                    .map(|raw| raw.parse().map_err(|_| CacheError::Script(format!("bad MISS id {:?}", raw))))
                    .collect::<Result<Vec<i64>, _>>()?;
                Ok(ReservationOutcome::Miss(ids))
            }
            TAG_INSUFFICIENT => Ok(ReservationOutcome::Insufficient(single_id(&rest)?)),
            TAG_INVALID_PRICE => Ok(ReservationOutcome::InvalidPrice(single_id(&rest)?)),
            TAG_INVALID_TOTAL => {
                let computed = rest
                    .first()
                    .and_then(|raw| Decimal::from_str(raw).ok())
                    .ok_or_else(|| CacheError::Script("INVALID_TOTAL without a subtotal".into()))?;
                Ok(ReservationOutcome::InvalidTotal(computed))
            }
            TAG_ERROR => Err(CacheError::Script(rest.join(" "))),
            other => Err(CacheError::Script(format!("unknown reply tag {:?}", other))),
        }
    }
}

fn reply(tag: &str, details: impl IntoIterator<Item = String>) -> Vec<String> {
    std::iter::once(tag.to_string()).chain(details).collect()
}

fn script_error(message: impl Into<String>) -> Vec<String> {
    reply(TAG_ERROR, [message.into()])
}

struct ParsedLine<'a> {
    key: &'a str,
    id: &'a str,
    quantity: i64,
    price: Decimal,
}

fn parse_lines<'a>(keys: &'a [String], args: &'a [String]) -> Result<(Vec<ParsedLine<'a>>, Decimal), String> {
    let count: usize = args
        .first()
        .and_then(|raw| raw.parse().ok())
        .ok_or("missing item count")?;
    let expected = args
        .get(1)
        .and_then(|raw| Decimal::from_str(raw).ok())
        .ok_or("missing expected subtotal")?;
    if keys.len() != count || args.len() != 2 + count * 3 {
        return Err(format!(
            "argument shape mismatch: {} keys, {} args, item count {}",
            keys.len(),
            args.len(),
            count
        ));
    }

    let mut lines = Vec::with_capacity(count);
    for (key, chunk) in keys.iter().zip(args[2..].chunks(3)) {
        let quantity: i64 = chunk[1].parse().map_err(|_| format!("bad quantity {:?}", chunk[1]))?;
        if quantity <= 0 {
            return Err(format!("non-positive quantity for {}", chunk[0]));
        }
        let price = Decimal::from_str(&chunk[2]).map_err(|_| format!("bad price {:?}", chunk[2]))?;
        lines.push(ParsedLine { key, id: &chunk[0], quantity, price });
    }
    Ok((lines, expected))
}

/// Check-and-decrement over every line. Checks run stock, then price, then
/// total, so callers can branch on the first failing condition.
pub fn reserve_stock(ctx: &mut impl ScriptContext, keys: &[String], args: &[String]) -> Vec<String> {
    let (lines, expected) = match parse_lines(keys, args) {
        Ok(parsed) => parsed,
        Err(message) => return script_error(message),
    };

    // Pass 1: report every miss at once.
    let missing: Vec<String> = lines
        .iter()
        .filter(|line| !ctx.exists(line.key))
        .map(|line| line.id.to_string())
        .collect();
    if !missing.is_empty() {
        return reply(TAG_MISS, missing);
    }

    // Pass 2: validate against a running remainder so repeated variants add up.
    let mut remaining: HashMap<&str, i64> = HashMap::new();
    let mut subtotal = Decimal::ZERO;
    for line in &lines {
        let available = match remaining.get(line.key) {
            Some(left) => *left,
            None => match ctx.hget(line.key, FIELD_QUANTITY).and_then(|raw| raw.parse::<i64>().ok()) {
                Some(quantity) => quantity,
                None => return script_error(format!("unreadable quantity at {}", line.key)),
            },
        };
        if line.quantity > available {
            return reply(TAG_INSUFFICIENT, [line.id.to_string()]);
        }

        let cached_price = match ctx.hget(line.key, FIELD_PRICE).and_then(|raw| Decimal::from_str(&raw).ok()) {
            Some(price) => price,
            None => return script_error(format!("unreadable price at {}", line.key)),
        };
        if cached_price != line.price {
            return reply(TAG_INVALID_PRICE, [line.id.to_string()]);
        }

        remaining.insert(line.key, available - line.quantity);
        subtotal += cached_price * Decimal::from(line.quantity);
    }

    if subtotal != expected {
        return reply(TAG_INVALID_TOTAL, [subtotal.to_string()]);
    }

    for line in &lines {
        ctx.hincrby(line.key, FIELD_QUANTITY, -line.quantity);
    }
    vec![TAG_OK.to_string()]
}
