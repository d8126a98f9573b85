// src/variables.rs

//! Variable environments and `$VAR` expansion.
//!
//! Layer precedence, lowest to highest: global (`variables:` at the top
//! level) < job-level < CLI-provided < predefined.

use indexmap::IndexMap;

/// Ordered variable environment (name -> value).
pub type Environment = IndexMap<String, String>;

/// Supplies the externally owned variable layers.
///
/// The global and job layers come from the configuration itself; only the
/// CLI-provided and predefined layers are external.
pub trait VariableSource {
    /// Predefined variables (`CI`, `CI_PROJECT_DIR`, git-derived values, ...).
    fn predefined(&self) -> Environment;

    /// Variables provided on the command line or through the settings file.
    fn cli(&self) -> Environment;
}

/// A [`VariableSource`] backed by two fixed maps.
#[derive(Debug, Clone, Default)]
pub struct StaticVariableSource {
    pub predefined: Environment,
    pub cli: Environment,
}

impl StaticVariableSource {
    pub fn new(predefined: Environment, cli: Environment) -> Self {
        Self { predefined, cli }
    }
}

impl VariableSource for StaticVariableSource {
    fn predefined(&self) -> Environment {
        self.predefined.clone()
    }

    fn cli(&self) -> Environment {
        self.cli.clone()
    }
}

/// Stack environment layers; later layers override earlier ones.
pub fn layer_environment(layers: &[&Environment]) -> Environment {
    let mut env = Environment::new();
    for layer in layers {
        for (key, value) in layer.iter() {
            env.insert(key.clone(), value.clone());
        }
    }
    env
}

/// Expand every value of `env` against the rest of the environment.
///
/// References are followed through chains (`A: $B`, `B: $C`). A reference
/// back to a variable that is still being expanded is kept as written, so
/// self and mutual references terminate.
pub fn expand_environment(env: &Environment) -> Environment {
    env.iter()
        .map(|(key, value)| {
            let mut active = vec![key.clone()];
            (key.clone(), expand_chained(value, env, &mut active))
        })
        .collect()
}

fn expand_chained(text: &str, env: &Environment, active: &mut Vec<String>) -> String {
    expand_with(text, &mut |name: &str, written: &str| {
        if active.iter().any(|a| a == name) {
            return Some(written.to_string());
        }
        let value = env.get(name)?;
        active.push(name.to_string());
        let resolved = expand_chained(value, env, active);
        active.pop();
        Some(resolved)
    })
}

/// Replace `$NAME`, `${NAME}` and nested `${A_${B}}` forms in `text`.
///
/// Values are inserted as they are. Undefined variables expand to the empty
/// string and `$$` is a literal `$`.
pub fn expand_text(text: &str, env: &Environment) -> String {
    expand_with(text, &mut |name: &str, _: &str| env.get(name).cloned())
}

/// Core of the expansion. `lookup` gets the variable name and the reference
/// as written in `text`; `None` expands to nothing.
fn expand_with<F>(text: &str, lookup: &mut F) -> String
where
    F: FnMut(&str, &str) -> Option<String>,
{
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '$' {
            out.push(chars[i]);
            i += 1;
            continue;
        }

        match chars.get(i + 1) {
            Some('$') => {
                out.push('$');
                i += 2;
            }
            Some('{') => match find_closing_brace(&chars, i + 2) {
                Some(end) => {
                    let inner: String = chars[i + 2..end].iter().collect();
                    let name = expand_with(&inner, lookup);
                    let written = format!("${{{name}}}");
                    if let Some(value) = lookup(&name, &written) {
                        out.push_str(&value);
                    }
                    i = end + 1;
                }
                None => {
                    out.extend(&chars[i..]);
                    break;
                }
            },
            Some(c) if is_name_char(*c) => {
                let (name, next) = read_name(&chars, i + 1);
                let written: String = chars[i..next].iter().collect();
                if let Some(value) = lookup(&name, &written) {
                    out.push_str(&value);
                }
                i = next;
            }
            _ => {
                out.push('$');
                i += 1;
            }
        }
    }

    out
}

pub(crate) fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Read a bare variable name starting at `start`; returns (name, next index).
pub(crate) fn read_name(chars: &[char], start: usize) -> (String, usize) {
    let mut end = start;
    while end < chars.len() && is_name_char(chars[end]) {
        end += 1;
    }
    (chars[start..end].iter().collect(), end)
}

/// Index of the `}` closing a `${` whose body starts at `start`, honouring
/// nested `${...}` groups.
pub(crate) fn find_closing_brace(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '$' if chars.get(i + 1) == Some(&'{') => {
                depth += 1;
                i += 2;
                continue;
            }
            '}' if depth == 0 => return Some(i),
            '}' => depth -= 1,
            _ => {}
        }
        i += 1;
    }
    None
}
