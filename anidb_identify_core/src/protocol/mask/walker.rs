//! The one routine every mask-shaped reply is parsed with

use super::{Mask, MaskLayout, Slot};
use crate::protocol::messages::FIELD_SEPARATOR;

/// Walk `mask` over `tokens` starting at `start`, handing each defined field to `sink`
///
/// Every set bit consumes one token except the layout's leading id bit,
/// which the caller accounts for through `start`. Retired and unused bits
/// consume a token that is thrown away. The walk stops early when tokens
/// run out; the returned index is one past the last token consumed.
pub fn walk<F, T, S>(layout: &MaskLayout<F>, mask: &Mask, tokens: &[T], start: usize, mut sink: S) -> usize
where
    F: Copy + PartialEq,
    T: AsRef<str>,
    S: FnMut(F, &str),
{
    let mut index = start;
    for (byte, bit) in mask.set_bits() {
        let slot = layout.slot(byte, bit);
        if slot == Slot::Leading {
            continue;
        }
        let Some(token) = tokens.get(index) else {
            break;
        };
        if let Slot::Field(field) = slot {
            sink(field, token.as_ref());
        }
        index += 1;
    }
    index
}

/// Tokens a complete reply carries for `mask`, not counting the leading id
pub fn demanded_tokens<F: Copy + PartialEq>(layout: &MaskLayout<F>, mask: &Mask) -> usize {
    mask.set_bits()
        .filter(|(byte, bit)| layout.slot(*byte, *bit) != Slot::Leading)
        .count()
}

/// Split a reply body into at most `count` fields
///
/// The last field keeps the remaining raw text, so a title holding `|`
/// cannot shift the fields after it.
pub fn split_fields(body: &str, count: usize) -> Vec<&str> {
    if body.is_empty() || count == 0 {
        return Vec::new();
    }
    body.splitn(count, FIELD_SEPARATOR).collect()
}
