//! Search limits and snippet options.

/// Limit applied when a caller passes `0`.
pub const DEFAULT_LIMIT: usize = 1000;

/// Hard ceiling applied regardless of caller input. Prevents unbounded
/// result materialization.
pub const MAX_LIMIT: usize = 10_000;

pub(crate) fn clamp_limit(limit: usize) -> usize {
    if limit == 0 {
        DEFAULT_LIMIT
    } else {
        limit.min(MAX_LIMIT)
    }
}

/// Options for the per-query highlighted excerpt attached to each search hit.
#[derive(Debug, Clone)]
pub struct SnippetOptions {
    /// Marker inserted before a matched token.
    pub start: String,
    /// Marker inserted after a matched token.
    pub end: String,
    /// Approximate token window size, clamped to `[1, 64]`.
    pub tokens: u32,
}

impl Default for SnippetOptions {
    fn default() -> Self {
        Self {
            start: r#"<span class="text-red-500">"#.to_string(),
            end: "</span>".to_string(),
            tokens: 10,
        }
    }
}

impl SnippetOptions {
    pub(crate) fn clamped_tokens(&self) -> i64 {
        i64::from(self.tokens.clamp(1, 64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_limit_uses_default() {
        assert_eq!(clamp_limit(0), DEFAULT_LIMIT);
    }

    #[test]
    fn limits_are_capped() {
        assert_eq!(clamp_limit(5), 5);
        assert_eq!(clamp_limit(1_000_000), MAX_LIMIT);
    }

    #[test]
    fn snippet_tokens_are_clamped() {
        let mut opts = SnippetOptions::default();
        assert_eq!(opts.clamped_tokens(), 10);

        opts.tokens = 0;
        assert_eq!(opts.clamped_tokens(), 1);

        opts.tokens = 500;
        assert_eq!(opts.clamped_tokens(), 64);
    }
}
