//! Credential notification rendering
//!
//! Turns the change ledger into the single plain-text notification sent
//! to the operator. Only categories with at least one success appear;
//! failures are surfaced interactively during the run, not here. Output
//! is deterministic for a given ledger apart from the generation
//! timestamp.

use chrono::Local;

use crate::ledger::{ChangeLedger, Outcome, TargetKind};

/// Render the notification, or None when nothing changed.
pub fn build(ledger: &ChangeLedger) -> Option<String> {
    if !ledger.any_succeeded() {
        return None;
    }

    let mut out = String::new();
    out.push_str("==============================================\n");
    out.push_str("       CREDENTIAL UPDATE NOTIFICATION\n");
    out.push_str("==============================================\n");
    out.push_str(&format!(
        "Generated: {}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    out.push('\n');

    for kind in TargetKind::REPORT_ORDER {
        let wins = ledger.succeeded(kind);
        if wins.is_empty() {
            continue;
        }
        out.push_str(&format!("--- {} ---\n", kind.label()));
        for entry in wins {
            if let Outcome::Succeeded {
                secret,
                config_stale,
            } = &entry.outcome
            {
                out.push_str(&format!("  {}: {}\n", entry.identity, secret.as_str()));
                if *config_stale {
                    out.push_str(
                        "  WARNING: site config file was NOT updated; reconcile manually\n",
                    );
                }
            }
        }
        out.push('\n');
    }

    out.push_str("Store these credentials securely and delete this file.\n");
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::ChangeLedger;
    use crate::secret;

    /// Drop the timestamp line so two renderings can be compared.
    fn without_timestamp(report: &str) -> String {
        report
            .lines()
            .filter(|l| !l.starts_with("Generated: "))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_empty_ledger_is_no_changes() {
        assert!(build(&ChangeLedger::new()).is_none());
    }

    #[test]
    fn test_all_failed_ledger_is_no_changes() {
        let mut ledger = ChangeLedger::new();
        ledger.register(TargetKind::ApplicationUser, "alice");
        ledger.record_failure(TargetKind::ControlPanel, "site");
        ledger.record_failure(TargetKind::Database, "dbuser");
        assert!(build(&ledger).is_none());
    }

    #[test]
    fn test_single_database_success_yields_only_database_section() {
        let mut ledger = ChangeLedger::new();
        ledger.register(TargetKind::ApplicationUser, "alice");
        ledger.record_failure(TargetKind::ControlPanel, "site");
        let s = secret::generate(16).unwrap();
        ledger.record_success(TargetKind::Database, "dbuser", s.clone(), false);

        let report = build(&ledger).unwrap();
        assert!(report.contains("--- Database ---"));
        assert!(report.contains(&format!("dbuser: {}", s.as_str())));
        assert!(!report.contains("Application admin users"));
        assert!(!report.contains("Control panel"));
        // Failures never appear in the notification.
        assert!(!report.contains("alice"));
        assert!(!report.contains("site:"));
    }

    #[test]
    fn test_partial_database_success_carries_warning() {
        let mut ledger = ChangeLedger::new();
        let s = secret::generate(16).unwrap();
        ledger.record_success(TargetKind::Database, "dbuser", s, true);
        let report = build(&ledger).unwrap();
        assert!(report.contains("config file was NOT updated"));
    }

    #[test]
    fn test_same_ledger_renders_identically() {
        let mut ledger = ChangeLedger::new();
        ledger.record_success(
            TargetKind::ApplicationUser,
            "alice",
            secret::generate(16).unwrap(),
            false,
        );
        ledger.record_success(
            TargetKind::ControlPanel,
            "site",
            secret::generate(16).unwrap(),
            false,
        );
        let a = build(&ledger).unwrap();
        let b = build(&ledger).unwrap();
        assert_eq!(without_timestamp(&a), without_timestamp(&b));
    }
}
