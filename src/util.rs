use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// The current time as the RFC 3339 string stored in document timestamps.
pub fn timestamp() -> Value {
    now()
        .format(&Rfc3339)
        .map(Value::String)
        .unwrap_or(Value::Null)
}

/// The part of an email address before the `@`.
pub fn email_local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_part_stops_at_the_at_sign() {
        assert_eq!(email_local_part("ada.lovelace@uni.edu"), "ada.lovelace");
        assert_eq!(email_local_part("nobody"), "nobody");
    }
}
