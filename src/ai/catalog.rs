//! Static model catalog: provider-family classification, capability flags and
//! fallback chains. Everything here is a pure function of the model id.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderFamily {
    OpenAi,
    OpenRouter,
    Gemini,
    Anthropic,
    Perplexity,
}

impl fmt::Display for ProviderFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderFamily::OpenAi => "openai",
            ProviderFamily::OpenRouter => "openrouter",
            ProviderFamily::Gemini => "gemini",
            ProviderFamily::Anthropic => "anthropic",
            ProviderFamily::Perplexity => "perplexity",
        };
        f.write_str(name)
    }
}

const GEMINI_MODELS: &[&str] = &[
    "gemini-2.5-pro",
    "gemini-2.5-flash",
    "gemini-2.5-flash-lite",
    "gemini-3-pro-preview",
];

const OPENROUTER_PREFIXES: &[&str] = &["deepseek/", "google/", "tngtech/", "qwen/", "z-ai/"];
const OPENROUTER_SUFFIX: &str = ":free";

fn is_gemini(model: &str) -> bool {
    GEMINI_MODELS.contains(&model)
}

fn is_openrouter(model: &str) -> bool {
    !model.is_empty()
        && (model.contains('/')
            || model.ends_with(OPENROUTER_SUFFIX)
            || OPENROUTER_PREFIXES.iter().any(|p| model.starts_with(p)))
}

fn is_anthropic(model: &str) -> bool {
    model.starts_with("claude-")
}

fn is_perplexity(model: &str) -> bool {
    model.starts_with("sonar")
}

/// Classification rules, evaluated in priority order. The Gemini rule matches
/// an exact set and must run before the generic OpenRouter slash rule; the
/// order of the remaining prefix rules mirrors the routing precedence.
const RULES: &[(fn(&str) -> bool, ProviderFamily)] = &[
    (is_gemini, ProviderFamily::Gemini),
    (is_openrouter, ProviderFamily::OpenRouter),
    (is_anthropic, ProviderFamily::Anthropic),
    (is_perplexity, ProviderFamily::Perplexity),
];

/// Map a model id to its provider family. Total: anything unmatched is
/// treated as OpenAI-compatible.
pub fn classify(model: &str) -> ProviderFamily {
    for (pred, family) in RULES {
        if pred(model) {
            return *family;
        }
    }
    ProviderFamily::OpenAi
}

/// Whether image/PDF attachments may be inlined into the request.
pub fn supports_vision(model: &str) -> bool {
    model.starts_with("gpt-4o")
        || model.starts_with('o')
        || model.starts_with("gpt-5")
        || is_gemini(model)
}

/// Whether the model is allowed to trigger the secondary image-generation
/// call after a text completion.
pub fn supports_image_generation(model: &str) -> bool {
    model.starts_with("gpt-4") || model.starts_with("gpt-5")
}

/// Reasoning-tier OpenAI models reject the `temperature` parameter.
pub fn uses_completion_token_params(model: &str) -> bool {
    model.starts_with('o') || model.starts_with("gpt-5")
}

/// o1-mini rejects system messages entirely.
pub fn accepts_system_message(model: &str) -> bool {
    model != "o1-mini"
}

/// Gemini models without quota on the current key are served by 2.5-flash.
pub fn resolve_gemini_model(model: &str) -> &str {
    match model {
        "gemini-2.5-pro" | "gemini-3-pro-preview" => "gemini-2.5-flash",
        other => other,
    }
}

/// Ordered list of model ids to try, primary first. The chain stops at the
/// first model that returns non-empty content.
pub fn fallback_chain(model: &str) -> Vec<String> {
    let mut chain = vec![model.to_string()];
    match model {
        "claude-opus-4-5" => {
            chain.push("claude-sonnet-4-5".into());
            chain.push("claude-haiku-4-5".into());
        }
        "sonar-reasoning-pro" | "sonar-deep-research" => {
            chain.push("sonar-reasoning".into());
            chain.push("sonar".into());
        }
        "sonar-reasoning" => chain.push("sonar".into()),
        _ => {}
    }
    chain
}

/// Models available on the Básico plan.
pub const BASIC_PLAN_MODELS: &[&str] = &[
    "gpt-4o",
    "deepseek/deepseek-r1-0528:free",
    "sonar",
    "sonar-reasoning",
    "sonar-deep-research",
    "claude-haiku-4-5",
    "gemini-2.5-flash-lite",
];

/// Whether a model is available on the Básico plan. Claude haiku snapshots
/// (date-suffixed ids) count as the base model.
pub fn allowed_for_basic_plan(model: &str) -> bool {
    let m = model.trim().to_lowercase();
    if m.is_empty() {
        return false;
    }
    m == "gpt-4o"
        || m == "deepseek/deepseek-r1-0528:free"
        || matches!(m.as_str(), "sonar" | "sonar-reasoning" | "sonar-deep-research")
        || m.starts_with("claude-haiku-4-5")
        || m == "gemini-2.5-flash-lite"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_covers_every_family() {
        assert_eq!(classify("gemini-2.5-flash"), ProviderFamily::Gemini);
        assert_eq!(classify("gemini-3-pro-preview"), ProviderFamily::Gemini);
        assert_eq!(classify("deepseek/deepseek-r1-0528:free"), ProviderFamily::OpenRouter);
        assert_eq!(classify("qwen/qwen3-32b"), ProviderFamily::OpenRouter);
        assert_eq!(classify("some-model:free"), ProviderFamily::OpenRouter);
        assert_eq!(classify("claude-opus-4-5"), ProviderFamily::Anthropic);
        assert_eq!(classify("sonar-reasoning-pro"), ProviderFamily::Perplexity);
        assert_eq!(classify("gpt-4o"), ProviderFamily::OpenAi);
        assert_eq!(classify("o1-mini"), ProviderFamily::OpenAi);
        assert_eq!(classify("gpt-3.5-turbo"), ProviderFamily::OpenAi);
    }

    #[test]
    fn gemini_exact_set_wins_over_slash_rule() {
        // "google/gemini-..." has a slash and is OpenRouter, while the bare
        // id from the fixed set is Gemini. Order of the rules matters.
        assert_eq!(classify("google/gemini-2.0-flash-exp:free"), ProviderFamily::OpenRouter);
        assert_eq!(classify("gemini-2.5-pro"), ProviderFamily::Gemini);
    }

    #[test]
    fn unknown_models_default_to_openai() {
        assert_eq!(classify("totally-unknown-model"), ProviderFamily::OpenAi);
        assert_eq!(classify("x"), ProviderFamily::OpenAi);
    }

    #[test]
    fn vision_and_image_flags() {
        assert!(supports_vision("gpt-4o"));
        assert!(supports_vision("o1-mini"));
        assert!(supports_vision("gpt-5-turbo"));
        assert!(supports_vision("gemini-2.5-flash"));
        assert!(!supports_vision("claude-haiku-4-5"));
        assert!(!supports_vision("sonar"));

        assert!(supports_image_generation("gpt-4o"));
        assert!(supports_image_generation("gpt-5"));
        assert!(!supports_image_generation("o1-mini"));
        assert!(!supports_image_generation("gemini-2.5-flash"));
    }

    #[test]
    fn reasoning_models_skip_temperature() {
        assert!(uses_completion_token_params("o1-mini"));
        assert!(uses_completion_token_params("gpt-5"));
        assert!(!uses_completion_token_params("gpt-4o"));
        assert!(!accepts_system_message("o1-mini"));
        assert!(accepts_system_message("gpt-4o"));
    }

    #[test]
    fn fallback_chains() {
        assert_eq!(
            fallback_chain("claude-opus-4-5"),
            vec!["claude-opus-4-5", "claude-sonnet-4-5", "claude-haiku-4-5"]
        );
        assert_eq!(
            fallback_chain("sonar-reasoning-pro"),
            vec!["sonar-reasoning-pro", "sonar-reasoning", "sonar"]
        );
        assert_eq!(fallback_chain("sonar-reasoning"), vec!["sonar-reasoning", "sonar"]);
        assert_eq!(
            fallback_chain("sonar-deep-research"),
            vec!["sonar-deep-research", "sonar-reasoning", "sonar"]
        );
        assert_eq!(fallback_chain("gpt-4o"), vec!["gpt-4o"]);
        assert_eq!(fallback_chain("claude-sonnet-4-5"), vec!["claude-sonnet-4-5"]);
    }

    #[test]
    fn gemini_quota_fallback() {
        assert_eq!(resolve_gemini_model("gemini-2.5-pro"), "gemini-2.5-flash");
        assert_eq!(resolve_gemini_model("gemini-3-pro-preview"), "gemini-2.5-flash");
        assert_eq!(resolve_gemini_model("gemini-2.5-flash-lite"), "gemini-2.5-flash-lite");
    }

    #[test]
    fn basic_plan_allow_list() {
        for m in BASIC_PLAN_MODELS {
            assert!(allowed_for_basic_plan(m), "{m} should be allowed");
        }
        // snapshot ids count as the base haiku model
        assert!(allowed_for_basic_plan("claude-haiku-4-5-20251001"));
        assert!(!allowed_for_basic_plan("claude-opus-4-5"));
        assert!(!allowed_for_basic_plan("gpt-5"));
        assert!(!allowed_for_basic_plan(""));
    }
}
