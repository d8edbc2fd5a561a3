//! Generation policy: output length, excluded classes, advisory minimums.

use hashpass_types::{CharClass, HashpassError, Result, ServiceSettings};
use std::collections::{BTreeMap, BTreeSet};

use crate::generator::Alphabet;

/// Length used when no source sets one.
pub const DEFAULT_LENGTH: usize = 20;

/// An immutable per-call generation policy.
///
/// Minimums are carried for callers that want to display or check them.
/// They never influence which characters are generated.
///
/// ```
/// use hashpass_secrets::GenerationPolicy;
/// use hashpass_types::CharClass;
///
/// let policy = GenerationPolicy::builder()
///     .length(16)
///     .exclude(CharClass::Space)
///     .build()
///     .unwrap();
/// assert_eq!(policy.length(), 16);
/// assert!(policy.is_excluded(CharClass::Space));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationPolicy {
    length: usize,
    excluded: BTreeSet<CharClass>,
    minimums: BTreeMap<CharClass, u64>,
}

impl GenerationPolicy {
    /// Start building a policy from the defaults.
    pub fn builder() -> PolicyBuilder {
        PolicyBuilder::default()
    }

    /// Translate resolved settings into a policy.
    ///
    /// `0` and `false` exclude a class; positive counts become minimums.
    pub fn from_settings(settings: &ServiceSettings) -> Result<Self> {
        let mut builder = Self::builder();
        if let Some(length) = settings.length {
            let length = usize::try_from(length).map_err(|_| {
                HashpassError::Config(format!("Length {} is out of range", length))
            })?;
            builder = builder.length(length);
        }
        for class in CharClass::ALL {
            let Some(value) = settings.class(class) else {
                continue;
            };
            if value.is_excluded() {
                builder = builder.exclude(class);
            } else if let Some(min) = value.minimum() {
                builder = builder.minimum(class, min);
            }
        }
        builder.build()
    }

    /// Number of characters to generate.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Excluded classes.
    pub fn excluded(&self) -> &BTreeSet<CharClass> {
        &self.excluded
    }

    /// Advisory minimum counts.
    pub fn minimums(&self) -> &BTreeMap<CharClass, u64> {
        &self.minimums
    }

    /// Whether `class` is excluded.
    pub fn is_excluded(&self, class: CharClass) -> bool {
        self.excluded.contains(&class)
    }

    /// The alphabet this policy generates from.
    pub fn alphabet(&self) -> Result<Alphabet> {
        Alphabet::new(&self.excluded)
    }
}

impl Default for GenerationPolicy {
    fn default() -> Self {
        Self {
            length: DEFAULT_LENGTH,
            excluded: BTreeSet::new(),
            minimums: BTreeMap::new(),
        }
    }
}

/// Builder for [`GenerationPolicy`].
#[derive(Debug, Clone, Default)]
pub struct PolicyBuilder {
    policy: GenerationPolicy,
}

impl PolicyBuilder {
    /// Set the output length.
    pub fn length(mut self, length: usize) -> Self {
        self.policy.length = length;
        self
    }

    /// Exclude a character class.
    pub fn exclude(mut self, class: CharClass) -> Self {
        self.policy.excluded.insert(class);
        self
    }

    /// Record an advisory minimum for a class.
    pub fn minimum(mut self, class: CharClass, count: u64) -> Self {
        self.policy.minimums.insert(class, count);
        self
    }

    /// Finish the policy.
    ///
    /// # Errors
    ///
    /// Fails with a configuration error when the length is zero or every
    /// character is excluded.
    pub fn build(self) -> Result<GenerationPolicy> {
        if self.policy.length < 1 {
            return Err(HashpassError::Config("Length must be at least 1".to_string()));
        }
        self.policy.alphabet()?;
        Ok(self.policy)
    }
}
