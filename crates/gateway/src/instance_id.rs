use shared::TimeSpec;

use crate::error::{GatewayError, GatewayResult};

/// Derives the id a remote calendar assigns to one occurrence of a
/// recurring event, per spec.md 4.1: `{parent_id}_{suffix}` where suffix is
/// the original-start-time instance suffix.
pub fn derive_instance_id(parent_id: &str, original_start: &TimeSpec) -> GatewayResult<String> {
    let suffix = original_start
        .instance_suffix()
        .map_err(|e| GatewayError::UnexpectedResponse(e.to_string()))?;
    Ok(format!("{parent_id}_{suffix}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn all_day_parent_instance_id() {
        let start = TimeSpec::AllDay(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        let id = derive_instance_id("abc123", &start).unwrap();
        assert_eq!(id, "abc123_20260301");
    }
}
