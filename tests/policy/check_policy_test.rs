//! Credential policy checks against the fake ACL backend.

use std::sync::Arc;

use sidelegate::limiter::RateLimiter;
use sidelegate::policy::{ParseError, PolicyEvaluator};
use sidelegate::{AclError, AclFacade, CallContext, FacadeOptions, ServiceIdentityAcls};

use crate::support::FakeAcl;

const WEB_WRITE: &str = r#"service "web" { policy = "write" }"#;
const DB_READ: &str = r#"service "db" { policy = "read" }"#;

fn facade(fake: &Arc<FakeAcl>, options: FacadeOptions) -> AclFacade {
    AclFacade::new(Arc::clone(fake) as _, options)
}

#[tokio::test]
async fn blank_credential_is_rejected_without_network() {
    let fake = FakeAcl::new().into_arc();
    let acls = facade(&fake, FacadeOptions::default());

    for credential in ["", "   ", "\t\n"] {
        let err = acls
            .check_policy(&CallContext::background(), "web", credential)
            .await
            .expect_err("blank credential");
        assert!(matches!(err, AclError::Validation(_)), "got {err:?}");
    }
    assert_eq!(fake.call_count(), 0);
}

#[tokio::test]
async fn allows_when_attached_policy_grants_write() {
    let fake = FakeAcl::new()
        .with_credential("op-token", &["p-web"])
        .with_policy("p-web", WEB_WRITE)
        .into_arc();
    let acls = facade(&fake, FacadeOptions::default());

    acls.check_policy(&CallContext::background(), "web", "op-token")
        .await
        .expect("policy should allow");
    assert_eq!(fake.calls(), vec!["read_token_self", "read_policy:p-web"]);
}

#[tokio::test]
async fn stops_at_first_allowing_policy() {
    let fake = FakeAcl::new()
        .with_credential("op-token", &["p-db", "p-web", "p-other"])
        .with_policy("p-db", DB_READ)
        .with_policy("p-web", WEB_WRITE)
        .with_policy("p-other", WEB_WRITE)
        .into_arc();
    let acls = facade(&fake, FacadeOptions::default());

    acls.check_policy(&CallContext::background(), "web", "op-token")
        .await
        .expect("policy should allow");
    assert_eq!(
        fake.calls(),
        vec!["read_token_self", "read_policy:p-db", "read_policy:p-web"]
    );
}

#[tokio::test]
async fn denies_naming_the_task() {
    let fake = FakeAcl::new()
        .with_credential("op-token", &["p-db"])
        .with_policy("p-db", DB_READ)
        .into_arc();
    let acls = facade(&fake, FacadeOptions::default());

    let err = acls
        .check_policy(&CallContext::background(), "web", "op-token")
        .await
        .expect_err("should deny");
    match err {
        AclError::PermissionDenied { task } => assert_eq!(task, "web"),
        other => panic!("expected PermissionDenied, got {other:?}"),
    }
}

#[tokio::test]
async fn credential_without_policies_is_denied() {
    let fake = FakeAcl::new().with_credential("op-token", &[]).into_arc();
    let acls = facade(&fake, FacadeOptions::default());

    let err = acls
        .check_policy(&CallContext::background(), "web", "op-token")
        .await
        .expect_err("should deny");
    assert!(matches!(err, AclError::PermissionDenied { .. }));
}

#[tokio::test]
async fn unknown_credential_is_an_upstream_error() {
    let fake = FakeAcl::new().into_arc();
    let acls = facade(&fake, FacadeOptions::default());

    let err = acls
        .check_policy(&CallContext::background(), "web", "bogus")
        .await
        .expect_err("lookup should fail");
    assert!(err.is_upstream(), "got {err:?}");
    assert!(err.to_string().contains("read_token_self"));
}

#[tokio::test]
async fn missing_policy_is_an_upstream_error_returned_immediately() {
    let fake = FakeAcl::new()
        .with_credential("op-token", &["gone", "p-web"])
        .with_policy("p-web", WEB_WRITE)
        .into_arc();
    let acls = facade(&fake, FacadeOptions::default());

    let err = acls
        .check_policy(&CallContext::background(), "web", "op-token")
        .await
        .expect_err("lookup should fail");
    assert!(err.is_upstream(), "got {err:?}");
    assert_eq!(fake.calls(), vec!["read_token_self", "read_policy:gone"]);
}

#[tokio::test]
async fn empty_policy_rules_are_a_parse_error() {
    let fake = FakeAcl::new()
        .with_credential("op-token", &["p-keys"])
        .with_policy("p-keys", r#"key_prefix "" { policy = "write" }"#)
        .into_arc();
    let acls = facade(&fake, FacadeOptions::default());

    let err = acls
        .check_policy(&CallContext::background(), "web", "op-token")
        .await
        .expect_err("should fail to parse");
    assert!(matches!(err, AclError::Parse(ParseError::Empty)), "got {err:?}");
}

#[tokio::test]
async fn role_policies_ignored_by_default() {
    let fake = FakeAcl::new()
        .with_credential("op-token", &[])
        .with_credential_roles("op-token", &["r-web"])
        .with_role("r-web", &["p-web"])
        .with_policy("p-web", WEB_WRITE)
        .into_arc();
    let acls = facade(&fake, FacadeOptions::default());

    let err = acls
        .check_policy(&CallContext::background(), "web", "op-token")
        .await
        .expect_err("roles are not consulted");
    assert!(matches!(err, AclError::PermissionDenied { .. }));
    assert_eq!(fake.calls(), vec!["read_token_self"]);
}

#[tokio::test]
async fn role_policies_checked_when_enabled() {
    let fake = FakeAcl::new()
        .with_credential("op-token", &["p-db"])
        .with_credential_roles("op-token", &["r-web"])
        .with_role("r-web", &["p-db", "p-web"])
        .with_policy("p-db", DB_READ)
        .with_policy("p-web", WEB_WRITE)
        .into_arc();
    let options = FacadeOptions {
        check_role_policies: true,
        ..FacadeOptions::default()
    };
    let acls = facade(&fake, options);

    acls.check_policy(&CallContext::background(), "web", "op-token")
        .await
        .expect("role policy should allow");
    // p-db is only fetched once.
    assert_eq!(
        fake.calls(),
        vec![
            "read_token_self",
            "read_policy:p-db",
            "read_role:r-web",
            "read_policy:p-web"
        ]
    );
}

#[tokio::test]
async fn evaluator_can_be_used_directly() {
    let fake = FakeAcl::new()
        .with_credential("op-token", &["p-all"])
        .with_policy("p-all", r#"service_prefix "" { policy = "write" }"#)
        .into_arc();
    let evaluator = PolicyEvaluator::new(fake, Arc::new(RateLimiter::per_second(10)));

    evaluator
        .check_policy(&CallContext::background(), "anything", "op-token")
        .await
        .expect("empty prefix allows all");
}

#[tokio::test]
async fn cancelled_context_stops_before_lookup() {
    let fake = FakeAcl::new()
        .with_credential("op-token", &["p-web"])
        .with_policy("p-web", WEB_WRITE)
        .into_arc();
    let acls = facade(&fake, FacadeOptions::default());
    let (ctx, handle) = CallContext::cancellable();
    handle.cancel();

    let err = acls
        .check_policy(&ctx, "web", "op-token")
        .await
        .expect_err("cancelled");
    assert!(err.is_cancellation());
    assert_eq!(fake.call_count(), 0);
}
