//! Integration tests for context resolution and naming.

use proptest::prelude::*;

use tg_core::{
    name, ConfigurationError, ContextResolver, Environment, ResourceKind, SynthConfig,
};

const KINDS: [ResourceKind; 6] = [
    ResourceKind::Vpc,
    ResourceKind::SecurityGroup,
    ResourceKind::ObjectStore,
    ResourceKind::Database,
    ResourceKind::LoadBalancer,
    ResourceKind::Distribution,
];

#[test]
fn test_every_environment_resolves() {
    for env in Environment::all() {
        let ctx = ContextResolver::resolve(Some(env.as_str()), &SynthConfig::default()).unwrap();
        assert_eq!(ctx.project_name(), format!("product-{}", env));
        for kind in KINDS {
            let id = name(kind, None, &ctx);
            assert!(id.as_str().contains(ctx.project_name()));
        }
    }
}

#[test]
fn test_custom_product_from_yaml() {
    let config = SynthConfig::from_yaml("product: shop\naccount: '111122223333'\n").unwrap();
    let ctx = ContextResolver::resolve(Some("staging"), &config).unwrap();

    assert_eq!(ctx.project_name(), "shop-staging");
    assert_eq!(
        name(ResourceKind::ObjectStore, Some("assets"), &ctx).as_str(),
        "shop-staging-assets-111122223333-us-east-1"
    );
}

#[test]
fn test_rejection_happens_before_anything_else() {
    let config = SynthConfig::default().with_account(Some("bad"));
    // The suffix is checked first, so the invalid account is never reached.
    let err = ContextResolver::resolve(Some("qa"), &config).unwrap_err();
    assert!(matches!(err, ConfigurationError::UnknownEnvironment { .. }));
}

proptest! {
    #[test]
    fn prop_names_are_prefixed_and_deterministic(qualifier in "[A-Za-z0-9 _-]{0,24}", env_idx in 0usize..3) {
        let env = Environment::all()[env_idx];
        let config = SynthConfig::default();
        let first = ContextResolver::resolve(Some(env.as_str()), &config).unwrap();
        let second = ContextResolver::resolve(Some(env.as_str()), &config).unwrap();

        for kind in KINDS {
            let a = name(kind, Some(&qualifier), &first);
            let b = name(kind, Some(&qualifier), &second);
            prop_assert_eq!(&a, &b);
            prop_assert!(a.as_str().starts_with(first.project_name()));
            prop_assert!(!a.as_str().contains("--"));
            prop_assert!(!a.as_str().ends_with('-'));
        }
    }

    #[test]
    fn prop_unknown_suffix_rejected(suffix in "[a-z]{1,10}") {
        prop_assume!(!["dev", "staging", "prod"].contains(&suffix.as_str()));
        let result = ContextResolver::resolve(Some(&suffix), &SynthConfig::default());
        let is_unknown_env = matches!(result, Err(ConfigurationError::UnknownEnvironment { .. }));
        prop_assert!(is_unknown_env);
    }
}
