use super::validate_id;
use crate::error::{CourierError, CourierResult};

pub const ROOM_ID_SEPARATOR: char = '_';

/// Deterministic, order-independent room id: `{lower}_{higher}_{context}`.
pub fn derive_room_id(user_a: &str, user_b: &str, context_id: &str) -> CourierResult<String> {
    validate_id("user_a", user_a)?;
    validate_id("user_b", user_b)?;
    validate_id("context_id", context_id)?;

    if user_a == user_b {
        return Err(CourierError::invalid_argument(
            "user_b",
            "a room needs two distinct participants",
        ));
    }

    let (lo, hi) = if user_a <= user_b {
        (user_a, user_b)
    } else {
        (user_b, user_a)
    };

    Ok(format!(
        "{}{sep}{}{sep}{}",
        lo,
        hi,
        context_id,
        sep = ROOM_ID_SEPARATOR
    ))
}

/// The supplied context id, or `general` when none or a blank one is given.
pub fn resolve_context(context_id: Option<&str>, general: &str) -> String {
    match context_id.map(str::trim) {
        Some(ctx) if !ctx.is_empty() => ctx.to_string(),
        _ => general.to_string(),
    }
}
