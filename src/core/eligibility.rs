//! Decides which records need a lookup and extracts the lookup inputs.
//!
//! Everything here is pure: the same store, policy and completed set always
//! yield the same plan, so a dry-run estimate matches what a real run does.

use crate::core::kind::{EnrichmentKind, COMPANY_NAME_ALIASES, WEBSITE_ALIASES};
use crate::core::models::{Identity, LookupInputs, Record, RunSummary, WorkUnit};
use crate::core::record_store::RecordStore;
use crate::utils::domain::{domain_from_website, normalize_website};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub struct EligibilityPolicy {
    /// A non-empty value in any of these means the record is already enriched.
    pub done_aliases: Vec<String>,
    /// Source fields tried in order for a website.
    pub website_aliases: Vec<String>,
    /// Fallback source fields when no website is usable. Empty disables the fallback.
    pub company_aliases: Vec<String>,
    /// Fields that must all be non-empty.
    pub require_fields: Vec<String>,
    pub skip_if_missing_required: bool,
    /// Process records even when already enriched.
    pub include_existing: bool,
}

impl EligibilityPolicy {
    pub fn for_kind(kind: EnrichmentKind, include_existing: bool) -> Self {
        let owned = |aliases: &[&str]| aliases.iter().map(|s| s.to_string()).collect();
        Self {
            done_aliases: owned(kind.done_aliases()),
            website_aliases: owned(WEBSITE_ALIASES),
            company_aliases: if kind.accepts_company_name() {
                owned(COMPANY_NAME_ALIASES)
            } else {
                Vec::new()
            },
            require_fields: Vec::new(),
            skip_if_missing_required: true,
            include_existing,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Eligible(WorkUnit),
    SkippedAlreadyDone,
    SkippedMissingInput(String),
}

fn as_strs(list: &[String]) -> Vec<&str> {
    list.iter().map(String::as_str).collect()
}

fn extract_inputs(record: &Record, policy: &EligibilityPolicy) -> Option<LookupInputs> {
    for alias in &policy.website_aliases {
        let Some(raw) = record.first_text(&[alias.as_str()]) else {
            continue;
        };
        let (Ok(url), Ok(domain)) = (normalize_website(&raw), domain_from_website(&raw)) else {
            tracing::debug!(target: "eligibility", "Ignoring unusable website '{}' in field '{}'", raw, alias);
            continue;
        };
        return Some(LookupInputs {
            website: Some(url.to_string()),
            domain: Some(domain),
            company_name: record.first_text(&as_strs(&policy.company_aliases)),
        });
    }

    record
        .first_text(&as_strs(&policy.company_aliases))
        .map(|company| LookupInputs {
            website: None,
            domain: None,
            company_name: Some(company),
        })
}

/// Classifies one record.
pub fn evaluate(
    record: &Record,
    identity: &Identity,
    position: usize,
    policy: &EligibilityPolicy,
) -> Verdict {
    if !policy.include_existing && record.has_any(&as_strs(&policy.done_aliases)) {
        return Verdict::SkippedAlreadyDone;
    }

    let missing: Vec<&str> = policy
        .require_fields
        .iter()
        .filter(|f| !record.has_any(&[f.as_str()]))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() && policy.skip_if_missing_required {
        return Verdict::SkippedMissingInput(format!("Missing {}", missing.join(", ")));
    }

    match extract_inputs(record, policy) {
        Some(inputs) => Verdict::Eligible(WorkUnit {
            identity: identity.clone(),
            position,
            inputs,
        }),
        None if policy.company_aliases.is_empty() => {
            Verdict::SkippedMissingInput("No usable website".to_string())
        }
        None => Verdict::SkippedMissingInput("No usable website or company name".to_string()),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunLimits {
    /// Leading records excluded from consideration.
    pub skip_first: usize,
    /// Cap on units dispatched in one run.
    pub max_leads: Option<usize>,
}

/// Work for one run plus the pre-run summary shown to the confirmation gate.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub units: Vec<WorkUnit>,
    pub summary: RunSummary,
}

/// Filters the whole store. Identities in `completed` are forced to
/// already-done regardless of their own verdict.
pub fn build_plan(
    store: &RecordStore,
    policy: &EligibilityPolicy,
    completed: &HashSet<Identity>,
    limits: RunLimits,
    cost_per_lookup: f64,
) -> Plan {
    let mut summary = RunSummary {
        total: store.len(),
        ..RunSummary::default()
    };
    let mut units = Vec::new();

    for (position, identity, record) in store.iter() {
        if position < limits.skip_first {
            summary.skipped_by_limit += 1;
            continue;
        }
        if completed.contains(identity) {
            summary.resumed += 1;
            summary.skipped_already_done += 1;
            continue;
        }
        match evaluate(record, identity, position, policy) {
            Verdict::Eligible(unit) => {
                if limits.max_leads.is_some_and(|max| units.len() >= max) {
                    summary.skipped_by_limit += 1;
                } else {
                    units.push(unit);
                }
            }
            Verdict::SkippedAlreadyDone => summary.skipped_already_done += 1,
            Verdict::SkippedMissingInput(reason) => {
                tracing::debug!(target: "eligibility", "Skipping {}: {}", identity, reason);
                summary.skipped_missing_input += 1;
            }
        }
    }

    summary.eligible = units.len();
    summary.estimated_cost = units.len() as f64 * cost_per_lookup;
    Plan { units, summary }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{record, ten_record_store};
    use serde_json::json;

    fn contacts_policy() -> EligibilityPolicy {
        EligibilityPolicy::for_kind(EnrichmentKind::Contacts, false)
    }

    #[test]
    fn test_already_enriched_is_skipped_unless_included() {
        let r = record(json!({"website": "acme.com", "Email": "a@acme.com"}));
        let id = Identity::from_position(0);
        assert_eq!(evaluate(&r, &id, 0, &contacts_policy()), Verdict::SkippedAlreadyDone);

        let forced = EligibilityPolicy::for_kind(EnrichmentKind::Contacts, true);
        assert!(matches!(evaluate(&r, &id, 0, &forced), Verdict::Eligible(_)));
    }

    #[test]
    fn test_website_fallback_order_and_normalization() {
        let r = record(json!({"website": "not a site", "companyDomain": "WWW.Acme.com"}));
        let Verdict::Eligible(unit) = evaluate(&r, &Identity::from_position(3), 3, &contacts_policy())
        else {
            panic!("expected eligible");
        };
        assert_eq!(unit.inputs.domain.as_deref(), Some("acme.com"));
        assert_eq!(unit.inputs.website.as_deref(), Some("https://www.acme.com/"));
        assert_eq!(unit.position, 3);
    }

    #[test]
    fn test_company_name_fallback_depends_on_kind() {
        let r = record(json!({"company": "Acme Plumbing"}));
        let id = Identity::from_position(0);
        assert!(matches!(
            evaluate(&r, &id, 0, &contacts_policy()),
            Verdict::SkippedMissingInput(_)
        ));

        let policy = EligibilityPolicy::for_kind(EnrichmentKind::DecisionMakerEmail, false);
        let Verdict::Eligible(unit) = evaluate(&r, &id, 0, &policy) else {
            panic!("expected eligible");
        };
        assert_eq!(unit.inputs.company_name.as_deref(), Some("Acme Plumbing"));
        assert!(unit.inputs.domain.is_none());
    }

    #[test]
    fn test_required_fields() {
        let mut policy = contacts_policy();
        policy.require_fields = vec!["city".to_string()];
        let r = record(json!({"website": "acme.com"}));
        let id = Identity::from_position(0);
        assert_eq!(
            evaluate(&r, &id, 0, &policy),
            Verdict::SkippedMissingInput("Missing city".to_string())
        );
        policy.skip_if_missing_required = false;
        assert!(matches!(evaluate(&r, &id, 0, &policy), Verdict::Eligible(_)));
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let store = ten_record_store();
        let policy = contacts_policy();
        for (pos, id, r) in store.iter() {
            assert_eq!(evaluate(r, id, pos, &policy), evaluate(r, id, pos, &policy));
        }
    }

    #[test]
    fn test_plan_counts_for_ten_records() {
        let store = ten_record_store();
        let plan = build_plan(&store, &contacts_policy(), &HashSet::new(), RunLimits::default(), 1.0);
        assert_eq!(plan.summary.total, 10);
        assert_eq!(plan.summary.eligible, 5);
        assert_eq!(plan.summary.skipped_already_done, 4);
        assert_eq!(plan.summary.skipped_missing_input, 1);
        assert_eq!(plan.summary.estimated_cost, 5.0);
    }

    #[test]
    fn test_plan_forces_completed_and_applies_limits() {
        let store = ten_record_store();
        let completed: HashSet<Identity> = plan_ids(&store).into_iter().take(2).collect();
        let plan = build_plan(
            &store,
            &contacts_policy(),
            &completed,
            RunLimits { skip_first: 0, max_leads: Some(2) },
            1.0,
        );
        assert_eq!(plan.summary.resumed, 2);
        assert_eq!(plan.summary.eligible, 2);
        assert_eq!(plan.summary.skipped_by_limit, 1);
        assert!(plan.units.iter().all(|u| !completed.contains(&u.identity)));
    }

    #[test]
    fn test_skip_first_excludes_leading_records() {
        let store = ten_record_store();
        let plan = build_plan(
            &store,
            &contacts_policy(),
            &HashSet::new(),
            RunLimits { skip_first: 10, max_leads: None },
            1.0,
        );
        assert!(plan.units.is_empty());
        assert_eq!(plan.summary.skipped_by_limit, 10);
    }

    fn plan_ids(store: &RecordStore) -> Vec<Identity> {
        build_plan(store, &contacts_policy(), &HashSet::new(), RunLimits::default(), 1.0)
            .units
            .into_iter()
            .map(|u| u.identity)
            .collect()
    }
}
