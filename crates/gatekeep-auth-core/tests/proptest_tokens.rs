//! Property-based tests for token verification
//!
//! - Issued pairs always verify under their own purpose
//! - Arbitrary input never verifies and never panics
//! - A token only verifies under the key it was signed with

use gatekeep_auth_core::{AuthConfig, AuthError, TokenService};
use gatekeep_types::{Role, UserId};
use proptest::prelude::*;

fn tokens() -> TokenService {
    let config = AuthConfig::try_new("p".repeat(32), "q".repeat(32)).unwrap();
    TokenService::new(&config).unwrap()
}

fn arb_role() -> impl Strategy<Value = Role> {
    prop_oneof![Just(Role::User), Just(Role::Moderator), Just(Role::Admin)]
}

fn arb_email() -> impl Strategy<Value = String> {
    "[a-z0-9._]{1,20}@[a-z]{1,10}\\.[a-z]{2,4}"
}

proptest! {
    #[test]
    fn issued_pair_verifies(email in arb_email(), role in arb_role(), version in 0i64..1000) {
        let tokens = tokens();
        let user_id = UserId::new();
        let pair = tokens.issue_versioned(user_id, &email, role, version).unwrap();

        let access = tokens.verify_access(&pair.access_token).unwrap();
        prop_assert_eq!(access.user_id, user_id);
        prop_assert_eq!(access.role, role);
        prop_assert_eq!(&access.email, &email);

        let refresh = tokens.verify_refresh(&pair.refresh_token).unwrap();
        prop_assert_eq!(refresh.version, version);
    }

    #[test]
    fn arbitrary_input_never_verifies(input in ".{0,200}") {
        let tokens = tokens();
        prop_assert!(tokens.verify_access(&input).is_err());
        prop_assert!(matches!(tokens.verify_refresh(&input), Err(AuthError::RefreshInvalid)));
    }

    #[test]
    fn other_secrets_are_rejected(suffix in "[a-z]{32,40}") {
        let other = TokenService::new(
            &AuthConfig::try_new(format!("x{suffix}"), format!("y{suffix}")).unwrap(),
        )
        .unwrap();
        let pair = other.issue(UserId::new(), "a@b.io", Role::User).unwrap();

        let tokens = tokens();
        prop_assert!(matches!(tokens.verify_access(&pair.access_token), Err(AuthError::TokenInvalid)));
        prop_assert!(matches!(tokens.verify_refresh(&pair.refresh_token), Err(AuthError::RefreshInvalid)));
    }

    #[test]
    fn tampered_payload_is_rejected(flip in 0usize..64) {
        let tokens = tokens();
        let pair = tokens.issue(UserId::new(), "a@b.io", Role::User).unwrap();

        let mut parts: Vec<String> = pair.access_token.split('.').map(str::to_string).collect();
        let payload = parts[1].clone().into_bytes();
        let idx = flip % payload.len();
        let mut tampered = payload.clone();
        tampered[idx] = if payload[idx] == b'A' { b'B' } else { b'A' };
        parts[1] = String::from_utf8(tampered).unwrap();

        let forged = parts.join(".");
        prop_assert!(tokens.verify_access(&forged).is_err());
    }
}
