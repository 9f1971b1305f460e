/// Replace `${ENV_VAR}` placeholders in config string values.
///
/// Unresolvable or malformed placeholders are left as-is.
pub fn substitute_env(input: &str) -> String {
    substitute_with(input, |name| std::env::var(name).ok())
}

fn substitute_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) if end > 0 => {
                let var_name = &after[..end];
                match lookup(var_name) {
                    Some(val) => result.push_str(&val),
                    // Leave unresolved placeholder as-is.
                    None => {
                        result.push_str("${");
                        result.push_str(var_name);
                        result.push('}');
                    },
                }
                rest = &after[end + 1..];
            },
            _ => {
                // No closing brace (or empty name) — emit the literal tail.
                result.push_str(&rest[start..]);
                rest = "";
                break;
            },
        }
    }

    result.push_str(rest);
    result
}
