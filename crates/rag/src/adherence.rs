use std::collections::HashSet;

/// Heuristic context-adherence score in [0, 1]: how much of the answer's
/// content is traceable to the retrieved chunks. Pure function of its
/// inputs; 0.0 means no overlap, 1.0 means every answer token and token
/// pair also appears in the context.
pub fn score(answer: &str, context_chunks: &[String]) -> f32 {
    let answer_tokens = tokenize(answer);
    if answer_tokens.is_empty() || context_chunks.is_empty() {
        return 0.0;
    }
    let mut context_tokens: HashSet<String> = HashSet::new();
    let mut context_bigrams: HashSet<(String, String)> = HashSet::new();
    for chunk in context_chunks {
        let tokens = tokenize(chunk);
        for pair in tokens.windows(2) {
            context_bigrams.insert((pair[0].clone(), pair[1].clone()));
        }
        context_tokens.extend(tokens);
    }
    if context_tokens.is_empty() {
        return 0.0;
    }

    let unigram_hits = answer_tokens
        .iter()
        .filter(|token| context_tokens.contains(*token))
        .count();
    let unigram_ratio = unigram_hits as f32 / answer_tokens.len() as f32;

    if answer_tokens.len() < 2 {
        return clamp_unit(unigram_ratio);
    }
    let answer_bigrams: Vec<(String, String)> = answer_tokens
        .windows(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect();
    let bigram_hits = answer_bigrams
        .iter()
        .filter(|bigram| context_bigrams.contains(*bigram))
        .count();
    let bigram_ratio = bigram_hits as f32 / answer_bigrams.len() as f32;

    clamp_unit(0.5 * unigram_ratio + 0.5 * bigram_ratio)
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
        .collect()
}

fn clamp_unit(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_context_scores_zero() {
        assert_eq!(score("the tire pressure is 32 PSI", &[]), 0.0);
    }

    #[test]
    fn empty_answer_scores_zero() {
        assert_eq!(score("", &chunks(&["some context"])), 0.0);
        assert_eq!(score("  \n ", &chunks(&["some context"])), 0.0);
    }

    #[test]
    fn verbatim_answer_scores_one() {
        let context = chunks(&["Tire pressure should be 32 PSI when the tires are cold."]);
        let s = score("tire pressure should be 32 psi", &context);
        assert!((s - 1.0).abs() < 1e-6);
    }

    #[test]
    fn unrelated_answer_scores_zero() {
        let context = chunks(&["Chain slack must be 20 to 30 mm."]);
        assert_eq!(score("bake at 220 degrees for forty minutes", &context), 0.0);
    }

    #[test]
    fn partially_grounded_answer_scores_between() {
        let context = chunks(&["Tire pressure should be 32 PSI."]);
        let s = score(
            "tire pressure is 32 psi according to ancient venusian folklore",
            &context,
        );
        assert!(s > 0.0 && s < 1.0, "score was {s}");
    }

    #[test]
    fn score_is_deterministic() {
        let context = chunks(&["Check the engine oil level with the bike upright."]);
        let answer = "check the oil level with the bike upright";
        assert_eq!(score(answer, &context), score(answer, &context));
    }

    #[test]
    fn single_token_answer_uses_unigrams_only() {
        let context = chunks(&["torque to 25 Nm"]);
        assert!((score("25", &context) - 1.0).abs() < 1e-6);
        assert_eq!(score("96", &context), 0.0);
    }
}
