//! Provider classification from the request path.
//!
//! Classification is path-first: `/v1/messages` is Anthropic, every other
//! `/v1/` path is OpenAI, `/api/` is Ollama, and everything else is
//! passthrough. Headers play no role; the `anthropic-version` header an
//! Anthropic client sends merely confirms what the path already decided.

use crate::config::Config;
use crate::model::Provider;

/// Classify a request by its (session-stripped) path.
pub fn classify(path: &str) -> Provider {
    if path.starts_with("/v1/messages") {
        return Provider::Anthropic;
    }
    if path.starts_with("/v1/") {
        return Provider::OpenAI;
    }
    if path.starts_with("/api/") {
        return Provider::Ollama;
    }
    Provider::Passthrough
}

/// Upstream base URL for a classified provider. Passthrough traffic goes to
/// the Ollama upstream, which also serves bare paths like `HEAD /` and
/// `GET /api/tags` for local agents.
pub fn upstream_base<'a>(provider: Provider, config: &'a Config) -> &'a str {
    match provider {
        Provider::OpenAI => &config.openai_url,
        Provider::Anthropic => &config.anthropic_url,
        Provider::Ollama | Provider::Passthrough => &config.ollama_url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_path_is_anthropic() {
        assert_eq!(classify("/v1/messages"), Provider::Anthropic);
        assert_eq!(
            classify("/v1/messages/count_tokens"),
            Provider::Anthropic
        );
    }

    #[test]
    fn test_v1_paths_are_openai() {
        assert_eq!(classify("/v1/chat/completions"), Provider::OpenAI);
        assert_eq!(classify("/v1/embeddings"), Provider::OpenAI);
        // Legacy Anthropic endpoints under /v1/ still classify by path alone
        assert_eq!(classify("/v1/complete"), Provider::OpenAI);
    }

    #[test]
    fn test_api_paths_are_ollama() {
        assert_eq!(classify("/api/generate"), Provider::Ollama);
        assert_eq!(classify("/api/chat"), Provider::Ollama);
        assert_eq!(classify("/api/tags"), Provider::Ollama);
    }

    #[test]
    fn test_everything_else_is_passthrough() {
        assert_eq!(classify("/foo"), Provider::Passthrough);
        assert_eq!(classify("/"), Provider::Passthrough);
        assert_eq!(classify("/v2/whatever"), Provider::Passthrough);
    }

    #[test]
    fn test_upstream_base_selection() {
        let config = Config::default();
        assert_eq!(
            upstream_base(Provider::OpenAI, &config),
            "https://api.openai.com"
        );
        assert_eq!(
            upstream_base(Provider::Anthropic, &config),
            "https://api.anthropic.com"
        );
        assert_eq!(
            upstream_base(Provider::Ollama, &config),
            "http://localhost:11434"
        );
        assert_eq!(
            upstream_base(Provider::Passthrough, &config),
            "http://localhost:11434"
        );
    }
}
