use genmedia_core::config::GatewayConfig;
use genmedia_core::types::Caller;

/// Caller used when the gateway has no keys configured.
const ANONYMOUS_USER: &str = "local";

/// Bearer header -> api_keys -> `?token=` -> anonymous (only with no keys).
///
/// Returns `None` on auth failure.
pub fn validate_auth(
    config: &GatewayConfig,
    bearer: Option<&str>,
    query_token: Option<&str>,
) -> Option<Caller> {
    if config.api_keys.is_empty() {
        return match bearer.or(query_token) {
            Some(_) => None,
            None => Some(Caller::new(ANONYMOUS_USER, "")),
        };
    }

    let presented = bearer.or(query_token)?;
    config
        .api_keys
        .iter()
        .find(|ak| ak.key == presented)
        .map(|ak| Caller::new(ak.user_id.clone(), ak.email.clone()))
}

/// Extract token from the query string (?token=...).
pub fn extract_token_from_query(query: &str) -> Option<&str> {
    query.split('&').find_map(|pair| pair.strip_prefix("token="))
}

#[cfg(test)]
mod tests {
    use super::*;
    use genmedia_core::config::ApiKeyConfig;

    fn gateway(api_keys: Vec<ApiKeyConfig>) -> GatewayConfig {
        GatewayConfig {
            bind: "127.0.0.1:18420".to_string(),
            api_keys,
        }
    }

    fn key(key: &str, user_id: &str) -> ApiKeyConfig {
        ApiKeyConfig {
            key: key.to_string(),
            user_id: user_id.to_string(),
            email: format!("{}@example.com", user_id),
        }
    }

    #[test]
    fn test_no_keys_is_anonymous() {
        let config = gateway(vec![]);
        let caller = validate_auth(&config, None, None).unwrap();
        assert_eq!(caller.user_id, "local");
        // A credential nobody can have issued is rejected.
        assert!(validate_auth(&config, Some("anything"), None).is_none());
    }

    #[test]
    fn test_bearer_maps_to_caller() {
        let config = gateway(vec![key("gm_alice", "alice"), key("gm_bob", "bob")]);

        let caller = validate_auth(&config, Some("gm_bob"), None).unwrap();
        assert_eq!(caller, Caller::new("bob", "bob@example.com"));

        assert!(validate_auth(&config, Some("wrong"), None).is_none());
        assert!(validate_auth(&config, None, None).is_none());
    }

    #[test]
    fn test_query_token_fallback() {
        let config = gateway(vec![key("gm_alice", "alice")]);
        let caller = validate_auth(&config, None, Some("gm_alice")).unwrap();
        assert_eq!(caller.user_id, "alice");
        // Bearer wins over the query string.
        assert!(validate_auth(&config, Some("wrong"), Some("gm_alice")).is_none());
    }

    #[test]
    fn test_extract_token() {
        assert_eq!(extract_token_from_query("token=abc"), Some("abc"));
        assert_eq!(extract_token_from_query("foo=bar&token=abc"), Some("abc"));
        assert_eq!(extract_token_from_query("foo=bar"), None);
    }
}
