//! Stable, collision-free names for scene ids and output files

use hashbrown::HashSet;

/// Reduce a source name to `[a-z0-9_-]`.
///
/// Converts names like "  Body Paint.001 " to "body_paint_001". Runs of
/// replaced characters collapse to one underscore; leading and trailing
/// underscores are dropped. Returns an empty string if nothing survives.
pub fn sanitize_name(name: &str) -> String {
    let sanitized = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect::<String>();

    let mut result = String::with_capacity(sanitized.len());
    let mut prev_was_underscore = false;
    for c in sanitized.chars() {
        if c == '_' {
            if !prev_was_underscore {
                result.push(c);
            }
            prev_was_underscore = true;
        } else {
            result.push(c);
            prev_was_underscore = false;
        }
    }

    result.trim_matches('_').to_string()
}

/// Hands out unique names within one namespace.
///
/// The first request for a base name gets it verbatim, later ones get
/// `_1`, `_2`, ... Results depend only on the order of requests.
#[derive(Debug, Default)]
pub struct IdAllocator {
    taken: HashSet<String>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a name that later requests must avoid
    pub fn reserve(&mut self, name: &str) {
        self.taken.insert(name.to_string());
    }

    /// Unique id for `name`, or for `fallback` when `name` sanitizes to nothing
    pub fn allocate(&mut self, name: &str, fallback: &str) -> String {
        let mut base = sanitize_name(name);
        if base.is_empty() {
            base = sanitize_name(fallback);
        }
        if self.taken.insert(base.clone()) {
            return base;
        }
        (1..)
            .map(|n| format!("{}_{}", base, n))
            .find(|candidate| self.taken.insert(candidate.clone()))
            .unwrap_or(base)
    }
}
