use anyhow::Result;
use regex::Regex;
use std::env;
use tracing::{debug, warn};

const ENV_VAR_PATTERN: &str = r"\$\{(\w+)\}|\$(\w+)";

/// Substitute environment variables in the format ${VAR_NAME} or $VAR_NAME
pub fn substitute_env_vars(content: &str) -> Result<String> {
    let re = Regex::new(ENV_VAR_PATTERN)?;
    let mut result = content.to_string();
    let mut missing_vars = Vec::new();

    for caps in re.captures_iter(content) {
        let Some(var_name) = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()) else {
            continue;
        };
        let placeholder = &caps[0];

        match env::var(var_name) {
            Ok(value) => {
                debug!("Substituting environment variable: {} = \"{}\"", var_name, value);
                result = result.replace(placeholder, &value);
            }
            Err(_) => {
                warn!("Environment variable '{}' not set", var_name);
                // Placeholder stays; the validator reports it
                missing_vars.push(var_name.to_string());
            }
        }
    }

    if !missing_vars.is_empty() {
        debug!(
            "Environment variables not set (may use defaults or fail validation): {:?}",
            missing_vars
        );
    }

    Ok(result)
}

/// Get environment variable with a default value
pub fn get_env_or_default(var_name: &str, default: &str) -> String {
    match env::var(var_name) {
        Ok(value) => {
            debug!("Using environment variable: {} = \"{}\"", var_name, value);
            value
        }
        Err(_) => {
            warn!(
                "Environment variable '{}' not set, using default: \"{}\"",
                var_name, default
            );
            default.to_string()
        }
    }
}

/// Check if a string contains unresolved environment variable placeholders
pub fn has_unresolved_env_vars(content: &str) -> Result<bool> {
    let re = Regex::new(ENV_VAR_PATTERN)?;
    Ok(re.is_match(content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitutes_set_variables() {
        env::set_var("LKV_TEST_SERVICE_NAME", "lkv-test");
        let out = substitute_env_vars("name: ${LKV_TEST_SERVICE_NAME}").unwrap();
        assert_eq!(out, "name: lkv-test");
    }

    #[test]
    fn test_keeps_unset_placeholders() {
        let out = substitute_env_vars("name: ${LKV_TEST_DEFINITELY_UNSET}").unwrap();
        assert_eq!(out, "name: ${LKV_TEST_DEFINITELY_UNSET}");
        assert!(has_unresolved_env_vars(&out).unwrap());
        assert!(!has_unresolved_env_vars("name: lkv").unwrap());
    }

    #[test]
    fn test_get_env_or_default() {
        assert_eq!(get_env_or_default("LKV_TEST_DEFINITELY_UNSET", "fallback"), "fallback");
    }
}
