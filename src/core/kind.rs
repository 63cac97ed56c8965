//! Per-kind field conventions: what counts as done, where inputs come from,
//! which keys the lookup writes, and what a lookup costs.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const WEBSITE_ALIASES: &[&str] = &[
    "website",
    "companyWebsite",
    "company_website",
    "domain",
    "companyDomain",
    "company_domain",
];

pub const COMPANY_NAME_ALIASES: &[&str] = &[
    "company_name",
    "company",
    "name",
    "Business Name",
];

const CONTACT_EMAIL_ALIASES: &[&str] = &[
    "email",
    "personEmail",
    "person_email",
    "contactEmail",
    "contact_email",
];

const DECISION_MAKER_NAME_ALIASES: &[&str] = &["decision_maker_name"];

const DECISION_MAKER_EMAIL_ALIASES: &[&str] = &[
    "decision_maker_email",
    "decision maker email",
    "decisionmakeremail",
];

const WEBSITE_STATUS_ALIASES: &[&str] = &["website_status"];

const SOCIAL_PLATFORMS: &[&str] = &[
    "facebook",
    "instagram",
    "linkedin",
    "twitter",
    "tiktok",
    "github",
    "youtube",
    "pinterest",
    "snapchat",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnrichmentKind {
    /// Emails, phones and social profiles scraped from the company website.
    Contacts,
    /// Decision maker name/title discovered through a source waterfall.
    DecisionMaker,
    /// Decision maker email looked up by domain or company name.
    DecisionMakerEmail,
    /// Whether the company website answers at all.
    WebsiteCheck,
}

impl fmt::Display for EnrichmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl EnrichmentKind {
    pub fn slug(&self) -> &'static str {
        match self {
            EnrichmentKind::Contacts => "contacts",
            EnrichmentKind::DecisionMaker => "decision-maker",
            EnrichmentKind::DecisionMakerEmail => "decision-maker-email",
            EnrichmentKind::WebsiteCheck => "website-check",
        }
    }

    /// File name of this kind's checkpoint inside the checkpoint directory.
    pub fn checkpoint_file_name(&self) -> String {
        format!("{}_checkpoint.json", self.slug().replace('-', "_"))
    }

    /// Fields whose presence means the record needs no lookup.
    pub fn done_aliases(&self) -> &'static [&'static str] {
        match self {
            EnrichmentKind::Contacts => CONTACT_EMAIL_ALIASES,
            EnrichmentKind::DecisionMaker => DECISION_MAKER_NAME_ALIASES,
            EnrichmentKind::DecisionMakerEmail => DECISION_MAKER_EMAIL_ALIASES,
            EnrichmentKind::WebsiteCheck => WEBSITE_STATUS_ALIASES,
        }
    }

    /// Whether a company name may stand in for a missing website.
    pub fn accepts_company_name(&self) -> bool {
        match self {
            EnrichmentKind::Contacts | EnrichmentKind::WebsiteCheck => false,
            EnrichmentKind::DecisionMaker | EnrichmentKind::DecisionMakerEmail => true,
        }
    }

    /// Keys a successful lookup may write.
    pub fn output_keys(&self) -> Vec<String> {
        match self {
            EnrichmentKind::Contacts => {
                let mut keys: Vec<String> = ["email", "emails", "phone", "phones"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect();
                keys.extend(SOCIAL_PLATFORMS.iter().map(|p| format!("social_{}", p)));
                keys
            }
            EnrichmentKind::DecisionMaker => [
                "decision_maker_name",
                "decision_maker_title",
                "decision_maker_source",
                "decision_maker_confidence",
                "decision_maker_linkedin",
                "company_linkedin",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            EnrichmentKind::DecisionMakerEmail => [
                "decision_maker_email",
                "decision_maker_email_status",
                "decision_maker_name",
                "decision_maker_title",
                "decision_maker_linkedin",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            EnrichmentKind::WebsiteCheck => WEBSITE_STATUS_ALIASES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Upper-bound credits charged for one lookup of this kind.
    pub fn cost_per_lookup(&self) -> f64 {
        match self {
            EnrichmentKind::Contacts => 1.0,
            // About page, legal page, search and people search in the worst case.
            EnrichmentKind::DecisionMaker => 4.0,
            EnrichmentKind::DecisionMakerEmail => 2.0,
            EnrichmentKind::WebsiteCheck => 0.0,
        }
    }

    pub fn social_platforms() -> &'static [&'static str] {
        SOCIAL_PLATFORMS
    }
}
