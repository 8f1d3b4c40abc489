//! RFC 3339 timestamps: the audit log's `timestamp` field and the
//! `backup_days` retention cutoff.

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Format the current instant as RFC 3339, matching the original
/// implementation's `datetime.datetime.now().isoformat()` audit timestamp.
#[must_use]
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// The RFC 3339 cutoff date `backup_days` days before now, used to bound
/// audit-table retention once a source table no longer exists.
#[must_use]
pub fn backup_cutoff(backup_days: i64) -> String {
    let cutoff = OffsetDateTime::now_utc() - time::Duration::days(backup_days);
    cutoff
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_rfc3339_parses_back() {
        let formatted = now_rfc3339();
        assert!(OffsetDateTime::parse(&formatted, &Rfc3339).is_ok());
    }

    #[test]
    fn backup_cutoff_is_before_now() {
        let cutoff = OffsetDateTime::parse(&backup_cutoff(30), &Rfc3339).unwrap();
        assert!(cutoff < OffsetDateTime::now_utc());
    }
}
