//! Fixed-window bucket identities.
//!
//! A bucket identity is `key + ":" + duration + ":" + floor(now / duration)`.
//! The admission script builds the same string inside the store; these
//! functions are the Rust-side mirror, used to inspect or pre-compute bucket
//! keys.

/// Index of the duration-aligned window containing `now`.
///
/// Floors toward negative infinity, matching Lua's `math.floor`.
pub fn window_index(duration_seconds: i64, now_seconds: i64) -> i64 {
    now_seconds.div_euclid(duration_seconds)
}

/// The `":" + duration + ":" + index` suffix shared by every key in a window.
pub fn bucket_suffix(duration_seconds: i64, now_seconds: i64) -> String {
    format!(
        ":{}:{}",
        duration_seconds,
        window_index(duration_seconds, now_seconds)
    )
}

/// Full store key of the counter for `key` in the window containing `now`.
///
/// `duration_seconds` must be positive; callers pass a validated
/// [`WindowDurationSeconds`](crate::WindowDurationSeconds).
pub fn bucket_identity(key: &str, duration_seconds: i64, now_seconds: i64) -> String {
    let mut identity = String::with_capacity(key.len() + 24);
    identity.push_str(key);
    identity.push_str(&bucket_suffix(duration_seconds, now_seconds));
    identity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_half_open_window_shares_identity() {
        for now in 120..180 {
            assert_eq!(bucket_identity("api", 60, now), "api:60:2");
        }
    }

    #[test]
    fn boundary_starts_new_identity() {
        assert_ne!(bucket_identity("api", 60, 179), bucket_identity("api", 60, 180));
        assert_eq!(bucket_identity("api", 60, 180), "api:60:3");
    }

    #[test]
    fn duration_is_part_of_identity() {
        assert_ne!(bucket_identity("k", 1, 10), bucket_identity("k", 10, 10));
    }

    #[test]
    fn negative_time_floors_like_lua() {
        assert_eq!(window_index(10, -1), -1);
        assert_eq!(bucket_suffix(10, -10), ":10:-1");
        assert_eq!(bucket_suffix(10, -11), ":10:-2");
    }

    #[test]
    fn keys_with_colons_are_kept_verbatim() {
        assert_eq!(bucket_identity("user:42", 5, 12), "user:42:5:2");
    }
}
