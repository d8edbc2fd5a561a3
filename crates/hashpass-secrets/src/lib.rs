//! # Hashpass Secrets
//!
//! Password derivation and the encrypted, multi-source settings behind it.
//!
//! - [`generator`]: deterministic master secret + service name → password
//! - [`cipher`]: authenticated encryption of stored settings
//! - [`legacy`] and [`migrate`]: upgrading stores written by older versions
//! - [`settings`]: settings records on a single source
//! - [`resolver`]: picking the effective settings across several sources
//!
//! ## Example
//!
//! ```
//! use hashpass_secrets::{generate, GenerationPolicy, MasterSecret};
//! use hashpass_types::ServiceName;
//!
//! let master = MasterSecret::phrase("She cells C shells bye the sea shoars");
//! let service = ServiceName::new("google").unwrap();
//! let password = generate(&GenerationPolicy::default(), &master, &service).unwrap();
//! assert_eq!(password, ">jW!6.KZSkx2Ax8b1FqV");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cipher;
pub mod generator;
pub mod legacy;
pub mod master;
pub mod migrate;
pub mod policy;
pub mod resolver;
pub mod settings;

pub use cipher::{Cipher, Scheme};
pub use generator::{generate, Alphabet, DOMAIN_CONSTANT};
pub use legacy::{legacy_readers, Reader, SchemeReader};
pub use master::MasterSecret;
pub use migrate::{MigrationOutcome, MigrationReport, MigrationState, Migrator};
pub use policy::{GenerationPolicy, PolicyBuilder};
pub use resolver::{Resolution, Resolver};
pub use settings::SettingsStore;

use hashpass_types::{Result, ServiceName};

/// Resolve the settings for `service` across every source and generate its password.
pub async fn generate_for_service(
    resolver: &Resolver,
    master: &MasterSecret,
    service: &ServiceName,
) -> Result<String> {
    let policy = resolver.policy(service, None).await?;
    generate(&policy, master, service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashpass_services::MemorySource;
    use hashpass_types::{CharClass, ClassValue, HashpassError, ServiceSettings};
    use std::sync::Arc;

    fn resolver() -> Resolver {
        let cipher = Arc::new(Cipher::new("settings", 10).unwrap());
        let store = SettingsStore::new(Arc::new(MemorySource::new("local")), cipher);
        Resolver::new(vec![store], "local").unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_uses_stored_policy() {
        let resolver = resolver();
        let master = MasterSecret::phrase("She cells C shells bye the sea shoars");
        let google = ServiceName::new("google").unwrap();

        assert_eq!(
            generate_for_service(&resolver, &master, &google).await.unwrap(),
            ">jW!6.KZSkx2Ax8b1FqV"
        );

        let mut settings = ServiceSettings {
            length: Some(4),
            ..Default::default()
        };
        resolver.save_service(&google, &settings, None).await.unwrap();
        assert_eq!(generate_for_service(&resolver, &master, &google).await.unwrap(), ">jW!");

        settings.length = None;
        settings.set_class(CharClass::Symbol, Some(ClassValue::Flag(false)));
        resolver.save_service(&google, &settings, None).await.unwrap();
        assert_eq!(
            generate_for_service(&resolver, &master, &google).await.unwrap(),
            "OIwdF1lszRbrFy0x8a6N"
        );
    }

    #[tokio::test]
    async fn test_exhaustion_surfaces_from_stored_policy() {
        let resolver = resolver();
        let master = MasterSecret::phrase("She cells C shells bye the sea shoars");
        let google = ServiceName::new("google").unwrap();
        let settings = ServiceSettings {
            length: Some(52),
            lower: Some(ClassValue::Count(0)),
            upper: Some(ClassValue::Count(0)),
            number: Some(ClassValue::Count(0)),
            ..Default::default()
        };
        resolver.save_global(&settings, None).await.unwrap();

        assert!(matches!(
            generate_for_service(&resolver, &master, &google).await,
            Err(HashpassError::EntropyExhausted { produced: 51, .. })
        ));
    }
}
