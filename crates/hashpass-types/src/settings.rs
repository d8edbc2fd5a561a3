//! Settings records stored on sources.
//!
//! Wire schema:
//!
//! ```json
//! {"global": {"length": 16}, "services": {"google": {"symbol": 0, "notes": "..."}}}
//! ```
//!
//! Every field is optional; an absent field means "unconstrained".

use crate::enums::CharClass;
use crate::identifiers::ServiceName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value of a character-class field.
///
/// `0` and `false` both mean the class is excluded. A positive count is an
/// advisory minimum and has no effect on generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClassValue {
    /// Numeric form: 0 excludes, n > 0 is an advisory minimum
    Count(u64),
    /// Boolean form: false excludes, true allows
    Flag(bool),
}

impl ClassValue {
    /// Whether this value forbids the class.
    pub fn is_excluded(&self) -> bool {
        matches!(self, ClassValue::Count(0) | ClassValue::Flag(false))
    }

    /// The advisory minimum, if one is set.
    pub fn minimum(&self) -> Option<u64> {
        match self {
            ClassValue::Count(n) if *n > 0 => Some(*n),
            _ => None,
        }
    }
}

/// Settings for one service, or the global defaults of a source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Output length
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    /// Lowercase letters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower: Option<ClassValue>,
    /// Uppercase letters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<ClassValue>,
    /// Digits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<ClassValue>,
    /// The space character
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space: Option<ClassValue>,
    /// `-` and `_`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dash: Option<ClassValue>,
    /// Punctuation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<ClassValue>,
    /// Lower and upper together
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha: Option<ClassValue>,
    /// Stored passphrase for this service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phrase: Option<String>,
    /// Public key reference used to request a signature-based master secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Free-form notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ServiceSettings {
    /// Value of a character-class field.
    pub fn class(&self, class: CharClass) -> Option<ClassValue> {
        match class {
            CharClass::Lower => self.lower,
            CharClass::Upper => self.upper,
            CharClass::Number => self.number,
            CharClass::Space => self.space,
            CharClass::Dash => self.dash,
            CharClass::Symbol => self.symbol,
            CharClass::Alpha => self.alpha,
        }
    }

    /// Set a character-class field.
    pub fn set_class(&mut self, class: CharClass, value: Option<ClassValue>) {
        let slot = match class {
            CharClass::Lower => &mut self.lower,
            CharClass::Upper => &mut self.upper,
            CharClass::Number => &mut self.number,
            CharClass::Space => &mut self.space,
            CharClass::Dash => &mut self.dash,
            CharClass::Symbol => &mut self.symbol,
            CharClass::Alpha => &mut self.alpha,
        };
        *slot = value;
    }

    /// Field-wise merge: values in `self` win, gaps are filled from `base`.
    pub fn merged_over(&self, base: &ServiceSettings) -> ServiceSettings {
        ServiceSettings {
            length: self.length.or(base.length),
            lower: self.lower.or(base.lower),
            upper: self.upper.or(base.upper),
            number: self.number.or(base.number),
            space: self.space.or(base.space),
            dash: self.dash.or(base.dash),
            symbol: self.symbol.or(base.symbol),
            alpha: self.alpha.or(base.alpha),
            phrase: self.phrase.clone().or_else(|| base.phrase.clone()),
            key: self.key.clone().or_else(|| base.key.clone()),
            notes: self.notes.clone().or_else(|| base.notes.clone()),
        }
    }

    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        *self == ServiceSettings::default()
    }
}

/// The complete settings document of one source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsRecord {
    /// Defaults applied to every service of this source
    #[serde(default)]
    pub global: ServiceSettings,
    /// Per-service overrides
    #[serde(default)]
    pub services: BTreeMap<ServiceName, ServiceSettings>,
}
