//! Composite resolution end-to-end tests

use std::sync::Arc;

use secretary_e2e::{FailingProvider, MockSecretProvider, VersionedMockProvider};
use secretary_store::{ProviderOptions, SecretError, SecretProvider, SecretResolver};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("rate limited")]
struct RateLimited;

#[derive(Debug, Error)]
#[error("unauthorized: {0}")]
struct Unauthorized(String);

/// Initialize tracing for tests
fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("secretary_store=trace,secretary_e2e=debug")
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn test_first_hit_wins_in_registration_order() {
    init_test();

    let first = Arc::new(MockSecretProvider::new());
    let second = Arc::new(MockSecretProvider::new().with_secret("k", "v2"));
    let third = Arc::new(MockSecretProvider::new().with_secret("k", "v3"));

    let resolver = SecretResolver::builder()
        .add_shared_provider(first.clone(), ProviderOptions::new())
        .add_shared_provider(second.clone(), ProviderOptions::new())
        .add_shared_provider(third.clone(), ProviderOptions::new())
        .build()
        .unwrap();

    let secret = resolver.get_secret("k").await.unwrap();
    assert_eq!(secret.value(), "v2");
    assert_eq!(first.call_count(), 1);
    assert_eq!(second.call_count(), 1);
    assert_eq!(third.call_count(), 0, "providers after the hit must not be consulted");
}

#[tokio::test]
async fn test_not_found_without_providers_or_matches() {
    init_test();

    let empty = SecretResolver::builder().build().unwrap();
    let error = empty.get_secret("k").await.unwrap_err();
    assert!(error.is_not_found());
    assert!(!error.is_not_supported());

    let resolver = SecretResolver::builder()
        .add_provider(MockSecretProvider::new().with_secret("other", "x"))
        .build()
        .unwrap();
    let error = resolver.get_raw_secret("k").await.unwrap_err();
    assert!(matches!(error, SecretError::NotFound { ref name } if name == "k"));
}

#[tokio::test]
async fn test_blank_name_is_invalid_argument() {
    init_test();

    let resolver = SecretResolver::builder()
        .add_provider(MockSecretProvider::new())
        .build()
        .unwrap();
    assert!(matches!(
        resolver.get_raw_secret("   ").await,
        Err(SecretError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_non_critical_failures_fall_through() {
    init_test();

    let failing = Arc::new(FailingProvider::with_error(|| RateLimited));
    let resolver = SecretResolver::builder()
        .add_shared_provider(failing.clone(), ProviderOptions::new())
        .add_provider(MockSecretProvider::new().with_secret("k", "fallback"))
        .build()
        .unwrap();

    assert_eq!(resolver.get_raw_secret("k").await.unwrap(), "fallback");
    assert_eq!(failing.call_count(), 1);
}

#[tokio::test]
async fn test_critical_failures_aggregated_in_order() {
    init_test();

    let resolver = SecretResolver::builder()
        .add_provider(FailingProvider::with_error(|| RateLimited))
        .add_provider(FailingProvider::with_error(|| {
            Unauthorized("token expired".to_string())
        }))
        .add_provider(MockSecretProvider::new().with_secret("k", "ignored"))
        .add_critical_error::<RateLimited>()
        .add_critical_error::<Unauthorized>()
        .build()
        .unwrap();

    let error = resolver.get_secret("k").await.unwrap_err();
    let failures = match &error {
        SecretError::Aggregate(failures) => failures,
        other => panic!("expected aggregate failure, got {other:?}"),
    };
    assert_eq!(failures.len(), 2);
    assert!(failures[0].downcast_ref::<RateLimited>().is_some());
    assert!(failures[1].downcast_ref::<Unauthorized>().is_some());
}

#[tokio::test]
async fn test_single_critical_failure_not_wrapped() {
    init_test();

    let resolver = SecretResolver::builder()
        .add_provider(FailingProvider::with_error(|| RateLimited))
        .add_provider(FailingProvider::with_error(|| {
            Unauthorized("wrong tenant".to_string())
        }))
        .add_critical_error_when::<Unauthorized, _>(|e| e.0.contains("tenant"))
        .build()
        .unwrap();

    let error = resolver.get_secret("k").await.unwrap_err();
    assert!(!matches!(error, SecretError::Aggregate(_)));
    assert_eq!(error.to_string(), "unauthorized: wrong tenant");
}

#[tokio::test]
async fn test_panicking_predicate_fails_open() {
    init_test();

    let resolver = SecretResolver::builder()
        .add_provider(FailingProvider::with_error(|| RateLimited))
        .add_provider(MockSecretProvider::new().with_secret("k", "v"))
        .add_critical_error_when::<RateLimited, _>(|_| panic!("predicate bug"))
        .build()
        .unwrap();

    assert_eq!(resolver.get_raw_secret("k").await.unwrap(), "v");
}

#[tokio::test]
async fn test_duplicate_names_untyped_and_typed_lookup() {
    init_test();

    let resolver = SecretResolver::builder()
        .add_provider_with(
            MockSecretProvider::new().with_secret("k", "first"),
            ProviderOptions::named("dup"),
        )
        .add_provider_with(
            MockSecretProvider::new().with_secret("k", "second"),
            ProviderOptions::named("dup"),
        )
        .add_provider_with(
            MockSecretProvider::new().with_secret("k", "single"),
            ProviderOptions::named("single"),
        )
        .build()
        .unwrap();

    let combined = resolver.get_provider("dup").unwrap();
    assert_eq!(
        combined.get_raw_secret("k").await.unwrap().as_deref(),
        Some("first")
    );

    let typed = resolver.get_provider_as::<MockSecretProvider>("dup");
    assert!(matches!(typed, Err(SecretError::InvalidOperation(_))));

    let single = resolver.get_provider_as::<MockSecretProvider>("single").unwrap();
    assert_eq!(single.call_count(), 0);
    resolver.get_provider("single").unwrap().get_secret("k").await.unwrap();
    assert_eq!(single.call_count(), 1);

    let wrong_type = resolver.get_provider_as::<VersionedMockProvider>("single");
    assert!(matches!(wrong_type, Err(SecretError::InvalidOperation(_))));

    assert!(matches!(
        resolver.get_provider("missing"),
        Err(SecretError::ProviderNotFound { .. })
    ));
}

#[tokio::test]
async fn test_name_mutation_roundtrip() {
    init_test();

    let resolver = SecretResolver::builder()
        .add_provider_with(
            MockSecretProvider::new().with_secret("ARCUS_FOO", "bar"),
            ProviderOptions::new().mutate_secret_name(|name| name.replace('.', "_").to_uppercase()),
        )
        .build()
        .unwrap();
    assert_eq!(resolver.get_raw_secret("Arcus.Foo").await.unwrap(), "bar");

    let wrong = SecretResolver::builder()
        .add_provider_with(
            MockSecretProvider::new().with_secret("ARCUS_FOO", "bar"),
            ProviderOptions::new().mutate_secret_name(|name| name.to_lowercase()),
        )
        .build()
        .unwrap();
    assert!(wrong.get_raw_secret("Arcus.Foo").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_mutation_failure_is_local_to_its_provider() {
    init_test();

    let strict = ProviderOptions::new().try_mutate_secret_name(|name: &str| {
        if name.contains('/') {
            Err("slashes are not allowed")
        } else {
            Ok(name.to_string())
        }
    });

    let resolver = SecretResolver::builder()
        .add_provider_with(MockSecretProvider::new(), strict.clone())
        .add_provider(MockSecretProvider::new().with_secret("a/b", "from-second"))
        .build()
        .unwrap();
    assert_eq!(resolver.get_raw_secret("a/b").await.unwrap(), "from-second");

    // Elevated by a rule, the mutation failure surfaces at once and is never aggregated
    let critical = SecretResolver::builder()
        .add_provider_with(MockSecretProvider::new(), strict)
        .add_provider(FailingProvider::with_error(|| RateLimited))
        .add_critical_error_when::<SecretError, _>(|e| e.is_not_supported())
        .add_critical_error::<RateLimited>()
        .build()
        .unwrap();
    let error = critical.get_secret("a/b").await.unwrap_err();
    assert!(matches!(error, SecretError::MutationFailed { .. }));
}

#[tokio::test]
async fn test_sync_lookup_requires_sync_providers() {
    init_test();

    let resolver = SecretResolver::builder()
        .add_provider(MockSecretProvider::new().synchronous())
        .add_provider(MockSecretProvider::new().synchronous().with_secret("k", "sync"))
        .build()
        .unwrap();
    assert_eq!(resolver.get_raw_secret_sync("k").unwrap(), "sync");
    assert!(resolver.get_secret_sync("missing").unwrap_err().is_not_found());

    let async_only = Arc::new(MockSecretProvider::new().with_secret("k", "async"));
    let resolver = SecretResolver::builder()
        .add_provider(MockSecretProvider::new().synchronous())
        .add_shared_provider(async_only.clone(), ProviderOptions::new())
        .build()
        .unwrap();
    let error = resolver.get_secret_sync("k").unwrap_err();
    assert!(matches!(error, SecretError::NotSupported(_)));
    assert_eq!(async_only.call_count(), 0, "no silent fallback to async lookups");
}

#[tokio::test]
async fn test_versioned_secrets() {
    init_test();

    let versioned = Arc::new(VersionedMockProvider::new().with_versions("api-key", &["v1", "v2", "v3"]));
    let resolver = SecretResolver::builder()
        .add_shared_provider(
            versioned.clone(),
            ProviderOptions::new().versioned_secret("api-key", 2),
        )
        .add_provider(MockSecretProvider::new().with_secret("plain", "only"))
        .build()
        .unwrap();

    // Declared amount applies
    let declared = resolver.get_raw_secrets("api-key").await.unwrap();
    assert_eq!(declared, vec!["v3".to_string(), "v2".to_string()]);

    // Explicit amount, most recent first
    let secrets = resolver.get_secret_versions("api-key", 5).await.unwrap();
    let versions: Vec<_> = secrets.iter().map(|s| s.version().unwrap()).collect();
    assert_eq!(versions, vec!["3", "2", "1"]);

    // Non-versioned providers answer with a single value
    assert_eq!(
        resolver.get_raw_secret_versions("plain", 3).await.unwrap(),
        vec!["only".to_string()]
    );
    assert_eq!(resolver.get_raw_secrets("plain").await.unwrap(), vec!["only"]);

    assert!(matches!(
        resolver.get_secret_versions("api-key", 0).await,
        Err(SecretError::InvalidArgument(_))
    ));

    versioned.rotate("api-key", "v4");
    assert_eq!(resolver.get_raw_secret("api-key").await.unwrap(), "v4");
}

#[tokio::test]
async fn test_declared_versions_fall_through_non_critical_failures() {
    init_test();

    let sealed = Arc::new(FailingProvider::new(|| SecretError::backend("vault", "sealed")).versioned());
    let resolver = SecretResolver::builder()
        .add_shared_provider(sealed.clone(), ProviderOptions::new().versioned_secret("k", 2))
        .add_provider(MockSecretProvider::new().with_secret("k", "fallback"))
        .build()
        .unwrap();

    assert_eq!(resolver.get_raw_secrets("k").await.unwrap(), vec!["fallback"]);
    assert_eq!(
        resolver.get_raw_secret_versions("k", 2).await.unwrap(),
        vec!["fallback"]
    );
    assert!(sealed.call_count() >= 2);

    let critical = SecretResolver::builder()
        .add_provider_with(
            FailingProvider::new(|| SecretError::backend("vault", "sealed")).versioned(),
            ProviderOptions::new().versioned_secret("k", 2),
        )
        .add_provider(MockSecretProvider::new().with_secret("k", "fallback"))
        .add_critical_error_when::<SecretError, _>(|e| matches!(e, SecretError::BackendError { .. }))
        .build()
        .unwrap();
    assert!(matches!(
        critical.get_raw_secrets("k").await,
        Err(SecretError::BackendError { .. })
    ));
}

#[tokio::test]
async fn test_declared_versions_empty_listing_tries_next_provider() {
    init_test();

    let resolver = SecretResolver::builder()
        .add_provider_with(
            VersionedMockProvider::new(),
            ProviderOptions::new().versioned_secret("api-key", 3),
        )
        .add_provider_with(
            VersionedMockProvider::new().with_versions("api-key", &["old", "new"]),
            ProviderOptions::new().versioned_secret("api-key", 3),
        )
        .build()
        .unwrap();

    assert_eq!(
        resolver.get_raw_secrets("api-key").await.unwrap(),
        vec!["new", "old"]
    );
}

#[test]
fn test_nested_sync_lookup_reports_not_supported() {
    init_test();

    let inner = SecretResolver::builder()
        .add_provider(MockSecretProvider::new().with_secret("k", "async"))
        .build()
        .unwrap();
    let later = Arc::new(MockSecretProvider::new().synchronous().with_secret("k", "later"));
    let outer = SecretResolver::builder()
        .add_provider_with(inner, ProviderOptions::named("team"))
        .add_shared_provider(later.clone(), ProviderOptions::new())
        .build()
        .unwrap();

    let error = outer.get_raw_secret_sync("k").unwrap_err();
    assert!(matches!(error, SecretError::NotSupported(_)));
    assert_eq!(later.call_count(), 0);
}

#[tokio::test]
async fn test_resolvers_nest() {
    init_test();

    let inner = SecretResolver::builder()
        .add_provider(MockSecretProvider::new().with_secret("inner", "value"))
        .build()
        .unwrap();
    let outer = SecretResolver::builder()
        .add_provider_with(inner, ProviderOptions::named("team"))
        .add_provider(MockSecretProvider::new().with_secret("outer", "other"))
        .build()
        .unwrap();

    assert_eq!(outer.get_raw_secret("inner").await.unwrap(), "value");
    assert_eq!(outer.get_raw_secret("outer").await.unwrap(), "other");
    assert!(outer.get_provider_as::<SecretResolver>("team").is_ok());
}

#[tokio::test]
async fn test_description_reported() {
    init_test();

    let provider: Arc<dyn SecretProvider> = Arc::new(MockSecretProvider::new());
    assert_eq!(provider.description().as_deref(), Some("in-memory mock"));
}
