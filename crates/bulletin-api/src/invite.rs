use bulletin_types::models::GroupRole;
use rand::distr::{Alphanumeric, SampleString};

/// Invite codes are 8 alphanumeric characters. The code space is large enough
/// that collisions are rare; the UNIQUE constraint catches the rest.
pub const INVITE_CODE_LEN: usize = 8;

pub fn generate_invite_code() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), INVITE_CODE_LEN)
}

/// Split a submitted invite link into the bare code and the role it requests.
///
/// Codes are not role-specific in storage: `ad@XYZ123` and `std@XYZ123` both
/// resolve to the group behind `XYZ123`. Normalization removes every
/// occurrence of both markers; the leading prefix of the submitted string
/// alone decides the requested role, and a bare code means MEMBER.
pub fn parse_invite(input: &str) -> (String, GroupRole) {
    let code = input.replace("std@", "").replace("ad@", "");

    let role = if input.starts_with("ad@") {
        GroupRole::Admin
    } else {
        GroupRole::Member
    };

    (code, role)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_alphanumeric_and_sized() {
        for _ in 0..32 {
            let code = generate_invite_code();
            assert_eq!(code.len(), INVITE_CODE_LEN);
            assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn admin_prefix_requests_admin() {
        assert_eq!(parse_invite("ad@XYZ123"), ("XYZ123".to_string(), GroupRole::Admin));
    }

    #[test]
    fn standard_prefix_requests_member() {
        assert_eq!(parse_invite("std@XYZ123"), ("XYZ123".to_string(), GroupRole::Member));
    }

    #[test]
    fn bare_code_defaults_to_member() {
        assert_eq!(parse_invite("XYZ123"), ("XYZ123".to_string(), GroupRole::Member));
    }

    #[test]
    fn stacked_prefixes_still_resolve_the_bare_code() {
        // Both markers are removed wherever they appear; only the leading
        // one decides the role.
        assert_eq!(parse_invite("ad@std@XYZ123"), ("XYZ123".to_string(), GroupRole::Admin));
        assert_eq!(parse_invite("std@ad@XYZ123"), ("XYZ123".to_string(), GroupRole::Member));
        assert_eq!(parse_invite("XYZad@123"), ("XYZ123".to_string(), GroupRole::Member));
    }
}
