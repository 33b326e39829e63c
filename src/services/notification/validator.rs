//! Syntactic checks on push tokens, run before any token reaches the push service.

const TOKEN_PREFIXES: [&str; 2] = ["ExponentPushToken[", "ExpoPushToken["];
const DEVICE_ID_GROUPS: [usize; 5] = [8, 4, 4, 4, 12];
const MAX_TOKEN_LEN: usize = 4096;

/// Returns `true` if `token` has a shape the push service can ever accept:
/// `ExponentPushToken[...]`, `ExpoPushToken[...]`, or a bare 8-4-4-4-12
/// alphanumeric device identifier.
#[must_use]
pub fn is_well_formed(token: &str) -> bool {
    if token.is_empty() || token.len() > MAX_TOKEN_LEN {
        return false;
    }
    is_bracketed(token) || is_device_id(token)
}

fn is_bracketed(token: &str) -> bool {
    TOKEN_PREFIXES.iter().any(|prefix| {
        token
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(']'))
            .is_some_and(|inner| !inner.is_empty() && !inner.contains(char::is_whitespace))
    })
}

fn is_device_id(token: &str) -> bool {
    let groups: Vec<&str> = token.split('-').collect();
    groups.len() == DEVICE_ID_GROUPS.len()
        && groups
            .iter()
            .zip(DEVICE_ID_GROUPS)
            .all(|(group, len)| group.len() == len && group.bytes().all(|b| b.is_ascii_alphanumeric()))
}

/// Splits tokens into `(well_formed, malformed)`, keeping input order in both.
#[must_use]
pub fn partition(tokens: Vec<String>) -> (Vec<String>, Vec<String>) {
    tokens.into_iter().partition(|token| is_well_formed(token))
}
