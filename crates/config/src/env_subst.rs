/// Replace `${ENV_VAR}` placeholders in a raw config string.
///
/// Unresolvable or malformed placeholders are left as-is.
pub fn substitute_env(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) if end > 0 => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(val) => result.push_str(&val),
                    Err(_) => {
                        result.push_str("${");
                        result.push_str(name);
                        result.push('}');
                    },
                }
                rest = &after[end + 1..];
            },
            _ => {
                result.push_str("${");
                rest = after;
            },
        }
    }
    result.push_str(rest);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_set_variables() {
        // PATH is always present under cargo test.
        let path = std::env::var("PATH").unwrap();
        assert_eq!(substitute_env("bin = ${PATH}"), format!("bin = {path}"));
    }

    #[test]
    fn keeps_unset_variables_verbatim() {
        assert_eq!(
            substitute_env("${LOQUAT_DEFINITELY_UNSET}"),
            "${LOQUAT_DEFINITELY_UNSET}"
        );
    }

    #[test]
    fn ignores_text_without_placeholders() {
        assert_eq!(substitute_env("port = 8090"), "port = 8090");
    }

    #[test]
    fn leaves_unterminated_placeholder() {
        assert_eq!(substitute_env("${OOPS"), "${OOPS");
    }
}
