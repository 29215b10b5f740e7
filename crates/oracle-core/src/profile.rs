use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::ProfileStoreError;

/// Canonical on-the-wire birthdate format.
pub const BIRTHDATE_FORMAT: &str = "%Y-%m-%d";

/// How much of a user's chart the interpretation engine may use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Personalization {
    Off,
    Basic,
    Full,
}

/// Consent settings attached to a profile. Unset flags are absent, not `false`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsentFlags {
    /// Consent to process the birthdate for readings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consent: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marketing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personalization: Option<Personalization>,
}

impl ConsentFlags {
    /// Overlay `patch` onto `self`; flags the patch leaves unset keep their value.
    pub fn merge(&mut self, patch: &ConsentFlags) {
        if let Some(consent) = patch.consent {
            self.consent = Some(consent);
        }
        if let Some(marketing) = patch.marketing {
            self.marketing = Some(marketing);
        }
        if let Some(personalization) = patch.personalization {
            self.personalization = Some(personalization);
        }
    }
}

/// A profile as handed to callers, with the birthdate already decrypted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileRecord {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthdate: Option<String>,
    #[serde(flatten)]
    pub consent: ConsentFlags,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Starts at 1 on creation and grows by one on every successful update.
    pub version: u64,
}

impl ProfileRecord {
    /// Fresh record at version 0; the first applied patch brings it to 1.
    pub fn empty(key: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            birthdate: None,
            consent: ConsentFlags::default(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Merge a validated patch and bump `version`/`updated_at`.
    pub fn apply(&mut self, patch: &ProfilePatch, now: DateTime<Utc>) -> Result<(), ProfileStoreError> {
        if let Some(birthdate) = patch.normalized_birthdate()? {
            self.birthdate = Some(birthdate);
        }
        self.consent.merge(&patch.consent);
        self.updated_at = now;
        self.version = next_version(self.version)?;
        Ok(())
    }
}

/// Partial update for a profile. `None` fields are preserved, never cleared.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthdate: Option<String>,
    #[serde(flatten)]
    pub consent: ConsentFlags,
}

impl ProfilePatch {
    pub fn birthdate(mut self, birthdate: impl Into<String>) -> Self {
        self.birthdate = Some(birthdate.into());
        self
    }

    pub fn consent(mut self, consent: bool) -> Self {
        self.consent.consent = Some(consent);
        self
    }

    pub fn marketing(mut self, marketing: bool) -> Self {
        self.consent.marketing = Some(marketing);
        self
    }

    pub fn personalization(mut self, personalization: Personalization) -> Self {
        self.consent.personalization = Some(personalization);
        self
    }

    /// The patch's birthdate in canonical `YYYY-MM-DD` form, if it carries one.
    pub fn normalized_birthdate(&self) -> Result<Option<String>, ProfileStoreError> {
        self.birthdate.as_deref().map(normalize_birthdate).transpose()
    }
}

/// Parse a calendar date and re-render it canonically.
/// The error never echoes the input back.
pub fn normalize_birthdate(raw: &str) -> Result<String, ProfileStoreError> {
    let date = NaiveDate::parse_from_str(raw.trim(), BIRTHDATE_FORMAT).map_err(|e| {
        ProfileStoreError::Validation {
            reason: format!("birthdate must be a YYYY-MM-DD calendar date ({e})"),
        }
    })?;
    Ok(date.format(BIRTHDATE_FORMAT).to_string())
}

/// Next version for a record; refuses to wrap.
pub fn next_version(current: u64) -> Result<u64, ProfileStoreError> {
    current
        .checked_add(1)
        .ok_or_else(|| ProfileStoreError::Corruption {
            reason: "profile version exhausted".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consent_merge_keeps_unset_flags() {
        let mut flags = ConsentFlags {
            consent: Some(true),
            marketing: Some(false),
            personalization: None,
        };
        flags.merge(&ConsentFlags {
            consent: None,
            marketing: Some(true),
            personalization: Some(Personalization::Full),
        });

        assert_eq!(flags.consent, Some(true));
        assert_eq!(flags.marketing, Some(true));
        assert_eq!(flags.personalization, Some(Personalization::Full));
    }

    #[test]
    fn apply_bumps_version_and_preserves_fields() {
        let now = Utc::now();
        let mut record = ProfileRecord::empty("user-42", now);
        record
            .apply(&ProfilePatch::default().birthdate("1990-01-01"), now)
            .expect("first apply");
        record
            .apply(&ProfilePatch::default().consent(true), now)
            .expect("second apply");

        assert_eq!(record.version, 2);
        assert_eq!(record.birthdate.as_deref(), Some("1990-01-01"));
        assert_eq!(record.consent.consent, Some(true));
    }

    #[test]
    fn birthdate_is_normalized() {
        assert_eq!(normalize_birthdate(" 1990-01-01 ").unwrap(), "1990-01-01");
    }

    #[test]
    fn invalid_birthdate_is_rejected_without_echoing_input() {
        let err = normalize_birthdate("1990-02-31").expect_err("not a calendar date");
        match err {
            ProfileStoreError::Validation { reason } => assert!(!reason.contains("1990-02-31")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(normalize_birthdate("yesterday").is_err());
    }

    #[test]
    fn record_serializes_flat() {
        let now = Utc::now();
        let mut record = ProfileRecord::empty("user-42", now);
        record
            .apply(
                &ProfilePatch::default().birthdate("1990-01-01").consent(true),
                now,
            )
            .expect("apply");

        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["key"], "user-42");
        assert_eq!(json["birthdate"], "1990-01-01");
        assert_eq!(json["consent"], true);
        assert_eq!(json["version"], 1);
        assert!(json.get("marketing").is_none());
    }

    #[test]
    fn patch_parses_from_flat_json() {
        let patch: ProfilePatch =
            serde_json::from_str(r#"{"birthdate":"1990-01-01","personalization":"basic"}"#)
                .expect("parse");
        assert_eq!(patch.birthdate.as_deref(), Some("1990-01-01"));
        assert_eq!(patch.consent.personalization, Some(Personalization::Basic));
        assert!(patch.consent.consent.is_none());
    }

    #[test]
    fn version_refuses_to_wrap() {
        assert!(next_version(u64::MAX).is_err());
    }
}
