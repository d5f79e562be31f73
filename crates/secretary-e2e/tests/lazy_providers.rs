//! Lazily created provider end-to-end tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use secretary_e2e::{FailingProvider, MockSecretProvider};
use secretary_store::{
    BoxError, ProviderContext, ProviderOptions, SecretError, SecretProvider, SecretResolver,
};

fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("secretary_store=debug")
        .with_test_writer()
        .try_init();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_factory_runs_once_under_concurrent_first_use() {
    init_test();

    let created = Arc::new(AtomicUsize::new(0));
    let counter = created.clone();
    let resolver = SecretResolver::builder()
        .add_lazy_provider(
            move |_: &ProviderContext| {
                counter.fetch_add(1, Ordering::SeqCst);
                // Widen the window for racing first uses
                std::thread::sleep(Duration::from_millis(50));
                let provider = MockSecretProvider::new().with_secret("k", "lazy");
                Ok(Some(Arc::new(provider) as Arc<dyn SecretProvider>))
            },
            ProviderOptions::named("lazy"),
        )
        .build()
        .unwrap();
    let resolver = Arc::new(resolver);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let resolver = resolver.clone();
        tasks.push(tokio::spawn(async move {
            resolver.get_raw_secret("k").await
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), "lazy");
    }
    assert_eq!(created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_factory_receives_context() {
    init_test();

    let mut settings = toml::Table::new();
    settings.insert("region".to_string(), toml::Value::from("westeurope"));

    let resolver = SecretResolver::builder()
        .with_context(
            ProviderContext::new()
                .with_settings(settings)
                .with_property("environment", "staging"),
        )
        .add_lazy_provider(
            |context: &ProviderContext| {
                let region = context
                    .setting("region")
                    .ok_or_else(|| BoxError::from("region setting missing"))?;
                let environment = context.property("environment").unwrap_or("dev");
                let provider = MockSecretProvider::new()
                    .with_secret("location", &format!("{}/{}", region, environment));
                Ok(Some(Arc::new(provider) as Arc<dyn SecretProvider>))
            },
            ProviderOptions::new(),
        )
        .build()
        .unwrap();

    assert_eq!(
        resolver.get_raw_secret("location").await.unwrap(),
        "westeurope/staging"
    );
}

#[tokio::test]
async fn test_failed_factory_is_fatal_and_never_retried() {
    init_test();

    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let resolver = SecretResolver::builder()
        .add_lazy_provider(
            move |_: &ProviderContext| {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(BoxError::from("vault unreachable"))
            },
            ProviderOptions::named("broken"),
        )
        .add_provider(MockSecretProvider::new().with_secret("k", "later"))
        .build()
        .unwrap();

    for _ in 0..3 {
        let error = resolver.get_secret("k").await.unwrap_err();
        assert!(matches!(error, SecretError::Configuration(_)));
    }
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_factory_returning_nothing_is_fatal() {
    init_test();

    let resolver = SecretResolver::builder()
        .add_lazy_provider(|_: &ProviderContext| Ok(None), ProviderOptions::named("empty"))
        .build()
        .unwrap();

    assert!(matches!(
        resolver.get_secret("k").await,
        Err(SecretError::Configuration(_))
    ));
    assert!(matches!(
        resolver.get_provider("empty"),
        Err(SecretError::Configuration(_))
    ));
}

#[tokio::test]
async fn test_lazy_provider_not_created_when_earlier_provider_hits() {
    init_test();

    let created = Arc::new(AtomicUsize::new(0));
    let counter = created.clone();
    let resolver = SecretResolver::builder()
        .add_provider(MockSecretProvider::new().with_secret("k", "eager"))
        .add_lazy_provider(
            move |_: &ProviderContext| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Arc::new(MockSecretProvider::new()) as Arc<dyn SecretProvider>))
            },
            ProviderOptions::new(),
        )
        .build()
        .unwrap();

    assert_eq!(resolver.get_raw_secret("k").await.unwrap(), "eager");
    assert_eq!(created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failed_factory_keeps_earlier_critical_failures() {
    init_test();

    let resolver = SecretResolver::builder()
        .add_provider(FailingProvider::new(|| {
            SecretError::AccessDenied("token revoked".to_string())
        }))
        .add_lazy_provider(
            |_: &ProviderContext| Err(BoxError::from("vault unreachable")),
            ProviderOptions::named("broken"),
        )
        .add_critical_error_when::<SecretError, _>(|e| matches!(e, SecretError::AccessDenied(_)))
        .build()
        .unwrap();

    let error = resolver.get_secret("k").await.unwrap_err();
    let failures = match &error {
        SecretError::Aggregate(failures) => failures,
        other => panic!("expected aggregate failure, got {other:?}"),
    };
    assert_eq!(failures.len(), 2);
    assert!(matches!(failures[0], SecretError::AccessDenied(_)));
    assert!(matches!(failures[1], SecretError::Configuration(_)));
}
